//! Request and response types for the IPFS RPC API.
//!
//! Kubo answers with PascalCase JSON field names.

use serde::Deserialize;

/// Response carrying a single content hash (add, object/new, patch, files/stat).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HasHash {
    pub hash: String,
}

/// Response from /api/v0/add.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileAdded {
    pub name: String,
    pub hash: String,
    #[serde(default)]
    pub size: String,
}

/// Kind of a directory entry as reported by /api/v0/ls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "i32")]
pub enum EntryKind {
    Dir,
    File,
}

impl From<i32> for EntryKind {
    /// UnixFS type codes: 1 is a directory, 5 a HAMT-sharded directory.
    fn from(code: i32) -> Self {
        match code {
            1 | 5 => EntryKind::Dir,
            _ => EntryKind::File,
        }
    }
}

/// One link of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Link {
    pub name: String,
    pub hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "Type")]
    pub kind: EntryKind,
}

/// Response from /api/v0/ls.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsResponse {
    #[serde(default)]
    pub objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsObject {
    pub hash: String,
    #[serde(default)]
    pub links: Option<Vec<Link>>,
}

/// Response from /api/v0/object/stat.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectStat {
    pub hash: String,
    #[serde(default)]
    pub num_links: u64,
    #[serde(default)]
    pub block_size: u64,
    #[serde(default)]
    pub links_size: u64,
    #[serde(default)]
    pub data_size: u64,
    #[serde(default)]
    pub cumulative_size: u64,
}

/// IPLD link `{"/": "<cid>"}` used in diff output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CidLink {
    #[serde(rename = "/")]
    pub cid: String,
}

impl CidLink {
    pub fn new(cid: impl Into<String>) -> Self {
        Self { cid: cid.into() }
    }
}

/// One path-level change between two DAG snapshots.
///
/// `before` is absent for additions, `after` is absent for removals.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectChange {
    #[serde(rename = "Type", default)]
    pub kind: i32,
    pub path: String,
    #[serde(default)]
    pub before: Option<CidLink>,
    #[serde(default)]
    pub after: Option<CidLink>,
}

/// Response from /api/v0/object/diff.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectDiff {
    #[serde(default)]
    pub changes: Option<Vec<ObjectChange>>,
}

/// Response from /api/v0/name/resolve.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HasPath {
    pub path: String,
}

/// A key owned by the endpoint, usable for IPNS publishing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Key {
    pub name: String,
    pub id: String,
}

/// Response from /api/v0/key/list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyList {
    #[serde(default)]
    pub keys: Vec<Key>,
}
