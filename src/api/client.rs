//! HTTP client for the Kubo RPC API (`POST /api/v0/<command>`).
//!
//! Every command takes its positional arguments as repeated `arg` query
//! parameters. Non-2xx responses carry a JSON [`ApiError`] body.

use reqwest::{multipart, Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::types::{
    FileAdded, HasHash, HasPath, Key, KeyList, Link, LsResponse, ObjectChange, ObjectDiff,
    ObjectStat,
};
use super::DagClient;
use crate::error::{ApiError, Result};

/// RPC client bound to one IPFS endpoint.
pub struct IpfsClient {
    client: Client,
    base_url: String,
}

impl IpfsClient {
    /// Create a client for the given endpoint URL (e.g. `http://localhost:5001`).
    pub fn new(endpoint: &str) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn url(&self, command: &str) -> String {
        format!("{}/api/v0/{}", self.base_url, command)
    }

    /// Send a command and fail on any non-2xx status.
    async fn call(&self, command: &str, params: &[(&str, &str)]) -> Result<Response> {
        log::debug!("IPFS call {} {:?}", command, params);
        let resp = self
            .client
            .post(self.url(command))
            .query(params)
            .send()
            .await?;
        check_status(resp).await
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        command: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let resp = self.call(command, params).await?;
        Ok(resp.json::<T>().await?)
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(decode_error(status, &body).into())
}

/// Decode an error body, keeping the status line when it is not JSON.
fn decode_error(status: StatusCode, body: &str) -> ApiError {
    serde_json::from_str::<ApiError>(body).unwrap_or_else(|_| ApiError {
        message: format!("{} {}", status, body.trim()),
        code: i64::from(status.as_u16()),
        kind: "error".to_string(),
    })
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

impl DagClient for IpfsClient {
    /// An empty `add` request is answered 404 by read only gateways and
    /// 400 (missing file argument) by writable nodes.
    async fn is_read_only(&self) -> Result<bool> {
        let resp = self.client.post(self.url("add")).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(true),
            StatusCode::BAD_REQUEST => Ok(false),
            s if s.is_success() => Ok(false),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(decode_error(s, &body).into())
            }
        }
    }

    async fn add(&self, data: Vec<u8>, name: &str) -> Result<String> {
        let part = multipart::Part::bytes(data).file_name(name.to_string());
        let form = multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(self.url("add"))
            .query(&[("pin", "false")])
            .multipart(form)
            .send()
            .await?;
        let added: FileAdded = check_status(resp).await?.json().await?;
        log::debug!("Added '{}' as {}", added.name, added.hash);
        Ok(added.hash)
    }

    async fn ls(&self, path: &str) -> Result<Vec<Link>> {
        let result: LsResponse = self.call_json("ls", &[("arg", path)]).await?;
        // Only one path was requested, so only the first object matters.
        Ok(result
            .objects
            .into_iter()
            .next()
            .and_then(|o| o.links)
            .unwrap_or_default())
    }

    async fn cat(&self, path: &str, offset: Option<u64>, length: Option<u64>) -> Result<Vec<u8>> {
        let offset = offset.map(|o| o.to_string());
        let length = length.map(|l| l.to_string());
        let mut params = vec![("arg", path)];
        if let Some(ref o) = offset {
            params.push(("offset", o.as_str()));
        }
        if let Some(ref l) = length {
            params.push(("length", l.as_str()));
        }
        let resp = self.call("cat", &params).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn object_stat(&self, path: &str) -> Result<ObjectStat> {
        self.call_json("object/stat", &[("arg", path)]).await
    }

    async fn object_patch_add_link(&self, root: &str, path: &str, target: &str) -> Result<String> {
        let result: HasHash = self
            .call_json(
                "object/patch/add-link",
                &[("arg", root), ("arg", path), ("arg", target), ("create", "true")],
            )
            .await?;
        Ok(result.hash)
    }

    async fn object_patch_rm_link(&self, root: &str, path: &str) -> Result<String> {
        let result: HasHash = self
            .call_json("object/patch/rm-link", &[("arg", root), ("arg", path)])
            .await?;
        Ok(result.hash)
    }

    async fn object_new_dir(&self) -> Result<String> {
        let result: HasHash = self.call_json("object/new", &[("arg", "unixfs-dir")]).await?;
        Ok(result.hash)
    }

    async fn object_diff(&self, from: &str, to: &str) -> Result<Vec<ObjectChange>> {
        let result: ObjectDiff = self
            .call_json("object/diff", &[("arg", from), ("arg", to)])
            .await?;
        Ok(result.changes.unwrap_or_default())
    }

    async fn files_stat(&self, path: &str) -> Result<String> {
        let result: HasHash = self.call_json("files/stat", &[("arg", path)]).await?;
        Ok(result.hash)
    }

    async fn files_cp(&self, from: &str, to: &str) -> Result<()> {
        self.call("files/cp", &[("arg", from), ("arg", to)]).await?;
        Ok(())
    }

    async fn files_rm(&self, path: &str) -> Result<()> {
        self.call("files/rm", &[("arg", path), ("recursive", "true")])
            .await?;
        Ok(())
    }

    async fn name_resolve(&self, ipns_path: &str) -> Result<String> {
        let result: HasPath = self.call_json("name/resolve", &[("arg", ipns_path)]).await?;
        Ok(result.path)
    }

    async fn name_publish(&self, hash: &str, key: &str) -> Result<()> {
        self.call("name/publish", &[("arg", hash), ("key", key)])
            .await?;
        Ok(())
    }

    async fn key_list(&self) -> Result<Vec<Key>> {
        let result: KeyList = self.call_json("key/list", &[]).await?;
        Ok(result.keys)
    }

    async fn pin_add(&self, hash: &str, recursive: bool) -> Result<()> {
        self.call(
            "pin/add",
            &[("arg", hash), ("recursive", bool_param(recursive))],
        )
        .await?;
        Ok(())
    }

    async fn pin_rm(&self, hash: &str) -> Result<()> {
        self.call("pin/rm", &[("arg", hash)]).await?;
        Ok(())
    }
}
