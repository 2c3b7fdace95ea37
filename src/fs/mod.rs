//! Filesystem operations on top of a shared root.
//!
//! Readers snapshot the root hash under the shared lock and issue their
//! network calls against that snapshot. Writers hold the exclusive lock for
//! the whole patch sequence, thread intermediate hashes locally and store
//! the final hash once, so a failed or abandoned operation never leaves a
//! partial hash behind.


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::api::types::{EntryKind, ObjectStat};
use crate::api::DagClient;
use crate::error::{Error, Result};
use crate::options::{Options, PUBLIC_GATEWAY};
use crate::root::{RootRegistry, RootState};
use crate::size;

/// A file that has been stat'd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Path relative to the handle's root.
    pub remote: String,
    /// Logical file size, recovered from the DAG cumulative size.
    pub size: u64,
    pub hash: String,
}

impl Object {
    fn from_stat(remote: String, stat: &ObjectStat) -> Self {
        Self {
            remote,
            size: size::file_size(stat),
            hash: stat.hash.clone(),
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Dir(String),
    Object(Object),
}

impl Entry {
    pub fn remote(&self) -> &str {
        match self {
            Entry::Dir(remote) => remote,
            Entry::Object(object) => &object.remote,
        }
    }
}

/// Part of a file to read. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// From `offset` to the end of the file.
    From(u64),
    Span { start: u64, end: u64 },
    /// The last `n` bytes.
    Last(u64),
}

impl ByteRange {
    /// `cat` offset and length for a file of `size` bytes.
    fn to_offset_length(self, size: u64) -> (Option<u64>, Option<u64>) {
        match self {
            ByteRange::From(offset) => (Some(offset), None),
            ByteRange::Span { start, end } if end >= start => (Some(start), Some(end - start + 1)),
            ByteRange::Span { start, .. } => (Some(start), None),
            ByteRange::Last(n) => (Some(size.saturating_sub(n)), None),
        }
    }
}

/// Join path segments, dropping empty and `.` segments and resolving `..`.
///
/// The result never starts or ends with `/`.
pub fn join_path(base: &str, rest: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(rest.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Split a relative path into (parent, name).
fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

/// `<hash>/<relative>`, or the bare hash for the root itself.
fn absolute_path(hash: &str, relative: &str) -> String {
    if relative.is_empty() {
        hash.to_string()
    } else {
        format!("{}/{}", hash, relative)
    }
}

/// A filesystem view of a shared root, optionally scoped to a sub-directory.
pub struct IpfsFs<C: DagClient> {
    state: Arc<RootState<C>>,
    /// Sub-root relative to the DAG root, without leading or trailing `/`.
    root: String,
    root_is_file: bool,
    empty_dir_hash: OnceCell<String>,
    timeout: Option<Duration>,
}

impl<C: DagClient> IpfsFs<C> {
    /// Open a handle on the shared root for `options`.
    ///
    /// When `root` names an existing file, the handle is rooted at its parent
    /// directory and [`IpfsFs::root_is_file`] reports it.
    pub async fn new(
        registry: &RootRegistry<C>,
        options: &Options,
        client: Arc<C>,
        root: &str,
    ) -> Result<Self> {
        let state = registry.root(options, client).await?;
        Self::with_state(state, root).await
    }

    /// Open a handle on an existing root state.
    pub async fn with_state(state: Arc<RootState<C>>, root: &str) -> Result<Self> {
        let root = join_path("", root);
        let mut fs = Self {
            state,
            root: String::new(),
            root_is_file: false,
            empty_dir_hash: OnceCell::new(),
            timeout: None,
        };
        if root.is_empty() {
            return Ok(fs);
        }

        let (parent, name) = split_parent(&root);
        fs.root = parent.to_string();
        match fs.new_object(name).await {
            Ok(_) => {
                log::debug!("Root '{}' is a file, using parent '{}'", root, parent);
                fs.root_is_file = true;
            }
            Err(Error::NotFound(_)) | Err(Error::NotAFile(_)) => fs.root = root,
            Err(e) => return Err(e),
        }
        Ok(fs)
    }

    /// Bound every subsequent operation to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn state(&self) -> &Arc<RootState<C>> {
        &self.state
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Whether the root given at open time was a file.
    pub fn root_is_file(&self) -> bool {
        self.root_is_file
    }

    pub fn is_read_only(&self) -> bool {
        self.state.is_read_only()
    }

    fn client(&self) -> &C {
        self.state.client().as_ref()
    }

    fn relative_path(&self, remote: &str) -> String {
        join_path(&self.root, remote)
    }

    async fn bounded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => operation.await,
        }
    }

    async fn empty_dir_hash(&self) -> Result<&str> {
        let hash = self
            .empty_dir_hash
            .get_or_try_init(|| self.client().object_new_dir())
            .await?;
        Ok(hash.as_str())
    }

    // ── Readers ──────────────────────────────────────────────────────────

    /// List the directory `dir` ("" for the handle's root).
    pub async fn list(&self, dir: &str) -> Result<Vec<Entry>> {
        self.bounded(self.list_inner(dir)).await
    }

    async fn list_inner(&self, dir: &str) -> Result<Vec<Entry>> {
        let root_hash = self.state.hash().await;
        let links = self
            .client()
            .ls(&absolute_path(&root_hash, &self.relative_path(dir)))
            .await
            .map_err(|e| {
                if e.is_remote() {
                    Error::DirNotFound(dir.to_string())
                } else {
                    e
                }
            })?;

        let mut entries = Vec::with_capacity(links.len());
        for link in links {
            let remote = join_path(dir, &link.name);
            match link.kind {
                EntryKind::Dir => entries.push(Entry::Dir(remote)),
                EntryKind::File => {
                    let stat = self
                        .client()
                        .object_stat(&absolute_path(&root_hash, &self.relative_path(&remote)))
                        .await?;
                    entries.push(Entry::Object(Object::from_stat(remote, &stat)));
                }
            }
        }
        Ok(entries)
    }

    /// Stat the file at `remote`.
    ///
    /// Fails with `NotFound` when nothing is there and `NotAFile` when the
    /// path is a directory.
    pub async fn new_object(&self, remote: &str) -> Result<Object> {
        self.bounded(self.new_object_inner(remote)).await
    }

    async fn new_object_inner(&self, remote: &str) -> Result<Object> {
        let root_hash = self.state.hash().await;
        let relative = self.relative_path(remote);
        let stat = self
            .client()
            .object_stat(&absolute_path(&root_hash, &relative))
            .await
            .map_err(|e| {
                if e.is_remote() {
                    Error::NotFound(remote.to_string())
                } else {
                    e
                }
            })?;

        if relative.is_empty() {
            return Err(Error::NotAFile(remote.to_string()));
        }
        let (parent, name) = split_parent(&relative);
        let is_file = self
            .client()
            .ls(&absolute_path(&root_hash, parent))
            .await?
            .iter()
            .find(|link| link.name == name)
            .map(|link| link.kind == EntryKind::File)
            .unwrap_or(false);
        if !is_file {
            return Err(Error::NotAFile(remote.to_string()));
        }

        Ok(Object::from_stat(remote.to_string(), &stat))
    }

    /// Read the content of `object`, or the part of it selected by `range`.
    pub async fn open(&self, object: &Object, range: Option<ByteRange>) -> Result<Vec<u8>> {
        self.bounded(async {
            let root_hash = self.state.hash().await;
            let (offset, length) = match range {
                Some(range) => range.to_offset_length(object.size),
                None => (None, None),
            };
            self.client()
                .cat(
                    &absolute_path(&root_hash, &self.relative_path(&object.remote)),
                    offset,
                    length,
                )
                .await
        })
        .await
    }

    /// Public gateway URL of `remote`, after checking that it exists.
    ///
    /// IPNS roots link through their name so the link follows later updates.
    pub async fn public_link(&self, remote: &str) -> Result<String> {
        self.bounded(async {
            let root_hash = self.state.hash().await;
            let relative = self.relative_path(remote);

            self.client()
                .object_stat(&absolute_path(&root_hash, &relative))
                .await
                .map_err(|e| {
                    if e.is_remote() {
                        Error::NotFound(remote.to_string())
                    } else {
                        e
                    }
                })?;

            let base = match self.state.ipns_path() {
                Some(ipns_path) => ipns_path.trim_end_matches('/').to_string(),
                None => format!("/ipfs/{}", root_hash),
            };
            let mut url = format!("{}{}", PUBLIC_GATEWAY, base);
            for segment in relative.split('/').filter(|s| !s.is_empty()) {
                url.push('/');
                url.push_str(&urlencoding::encode(segment));
            }
            Ok(url)
        })
        .await
    }

    // ── Writers ──────────────────────────────────────────────────────────

    /// Store `data` at `remote`, replacing any existing entry.
    pub async fn put(&self, remote: &str, data: Vec<u8>) -> Result<Object> {
        self.state.check_writable()?;
        self.bounded(async {
            let relative = self.relative_path(remote);
            let (_, name) = split_parent(&relative);
            let file_hash = self.client().add(data, name).await?;

            {
                let mut root = self.state.lock().await?;
                let new_hash = self
                    .client()
                    .object_patch_add_link(root.hash(), &relative, &file_hash)
                    .await?;
                root.set_hash(new_hash);
            }
            log::debug!("Added '{}' as {}", relative, file_hash);

            self.new_object_inner(remote).await
        })
        .await
    }

    /// Create the directory `dir`; nothing happens if the path exists.
    pub async fn mkdir(&self, dir: &str) -> Result<()> {
        self.state.check_writable()?;
        self.bounded(async {
            let empty_dir = self.empty_dir_hash().await?;
            let relative = self.relative_path(dir);

            let mut root = self.state.lock().await?;
            if self
                .client()
                .object_stat(&absolute_path(root.hash(), &relative))
                .await
                .is_ok()
            {
                return Ok(());
            }
            let new_hash = self
                .client()
                .object_patch_add_link(root.hash(), &relative, empty_dir)
                .await?;
            root.set_hash(new_hash);
            Ok(())
        })
        .await
    }

    /// Remove the empty directory `dir`.
    pub async fn rmdir(&self, dir: &str) -> Result<()> {
        self.state.check_writable()?;
        self.bounded(async {
            let relative = self.relative_path(dir);

            let mut root = self.state.lock().await?;
            let stat = self
                .client()
                .object_stat(&absolute_path(root.hash(), &relative))
                .await
                .map_err(|e| {
                    if e.is_remote() {
                        Error::DirNotFound(dir.to_string())
                    } else {
                        e
                    }
                })?;
            if stat.num_links > 0 {
                return Err(Error::DirNotEmpty(dir.to_string()));
            }
            let new_hash = self
                .client()
                .object_patch_rm_link(root.hash(), &relative)
                .await?;
            root.set_hash(new_hash);
            Ok(())
        })
        .await
    }

    /// Link `src` at `remote` too.
    pub async fn copy(&self, src: &Object, remote: &str) -> Result<Object> {
        self.state.check_writable()?;
        self.bounded(self.copy_inner(src, remote)).await
    }

    async fn copy_inner(&self, src: &Object, remote: &str) -> Result<Object> {
        {
            let mut root = self.state.lock().await?;
            let new_hash = self
                .client()
                .object_patch_add_link(root.hash(), &self.relative_path(remote), &src.hash)
                .await?;
            root.set_hash(new_hash);
        }
        self.new_object_inner(remote).await
    }

    /// Copy `src` to `remote`, then remove it.
    ///
    /// Not atomic: if the removal fails the object is left at both paths.
    pub async fn move_object(&self, src: &Object, remote: &str) -> Result<Object> {
        self.state.check_writable()?;
        self.bounded(async {
            let object = self.copy_inner(src, remote).await?;
            self.remove_inner(src).await?;
            Ok(object)
        })
        .await
    }

    pub async fn remove(&self, object: &Object) -> Result<()> {
        self.state.check_writable()?;
        self.bounded(self.remove_inner(object)).await
    }

    async fn remove_inner(&self, object: &Object) -> Result<()> {
        let mut root = self.state.lock().await?;
        let new_hash = self
            .client()
            .object_patch_rm_link(root.hash(), &self.relative_path(&object.remote))
            .await
            .map_err(|e| {
                if e.is_remote() {
                    Error::NotFound(object.remote.clone())
                } else {
                    e
                }
            })?;
        root.set_hash(new_hash);
        Ok(())
    }

    /// Move the directory `src_remote` to `dst_remote`, which must not exist.
    pub async fn dir_move(&self, src_remote: &str, dst_remote: &str) -> Result<()> {
        self.state.check_writable()?;
        self.bounded(async {
            let src_relative = self.relative_path(src_remote);
            let dst_relative = self.relative_path(dst_remote);

            let mut root = self.state.lock().await?;
            if self
                .client()
                .object_stat(&absolute_path(root.hash(), &dst_relative))
                .await
                .is_ok()
            {
                return Err(Error::DirExists(dst_remote.to_string()));
            }

            let src_stat = self
                .client()
                .object_stat(&absolute_path(root.hash(), &src_relative))
                .await
                .map_err(|e| {
                    if e.is_remote() {
                        Error::DirNotFound(src_remote.to_string())
                    } else {
                        e
                    }
                })?;

            let copied = self
                .client()
                .object_patch_add_link(root.hash(), &dst_relative, &src_stat.hash)
                .await?;
            let moved = self
                .client()
                .object_patch_rm_link(&copied, &src_relative)
                .await?;
            root.set_hash(moved);
            Ok(())
        })
        .await
    }

    /// Move the content of every directory in `dirs[1..]` into `dirs[0]` and
    /// remove them.
    pub async fn merge_dirs(&self, dirs: &[&str]) -> Result<()> {
        self.state.check_writable()?;
        let Some((first, rest)) = dirs.split_first() else {
            return Ok(());
        };
        self.bounded(async {
            let target = self.relative_path(first);

            let mut root = self.state.lock().await?;
            let mut working_hash = root.hash().to_string();
            for dir in rest {
                let relative = self.relative_path(dir);
                let links = self
                    .client()
                    .ls(&absolute_path(&working_hash, &relative))
                    .await?;
                for link in links {
                    working_hash = self
                        .client()
                        .object_patch_add_link(
                            &working_hash,
                            &join_path(&target, &link.name),
                            &link.hash,
                        )
                        .await?;
                }
                working_hash = self
                    .client()
                    .object_patch_rm_link(&working_hash, &relative)
                    .await?;
            }
            root.set_hash(working_hash);
            Ok(())
        })
        .await
    }

    /// Delete `dir` and everything under it.
    ///
    /// Purging the top of the DAG replaces the whole tree with an empty
    /// directory.
    pub async fn purge(&self, dir: &str) -> Result<()> {
        self.state.check_writable()?;
        self.bounded(async {
            let relative = self.relative_path(dir);
            if relative.is_empty() {
                let empty_dir = self.empty_dir_hash().await?.to_string();
                self.state.lock().await?.set_hash(empty_dir);
                return Ok(());
            }

            let mut root = self.state.lock().await?;
            let new_hash = self
                .client()
                .object_patch_rm_link(root.hash(), &relative)
                .await
                .map_err(|e| {
                    if e.is_not_found() {
                        Error::DirNotFound(dir.to_string())
                    } else {
                        e
                    }
                })?;
            root.set_hash(new_hash);
            Ok(())
        })
        .await
    }
}
