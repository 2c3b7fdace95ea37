//! In-memory DAG used by the unit tests.
//!
//! Nodes are content addressed (SHA-256 of a canonical encoding), so two
//! trees with the same content always have the same hash, the way a real
//! IPFS node behaves. MFS, IPNS records, owned keys and pins are simulated
//! alongside, and every remote write is recorded in a call log.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::api::types::{CidLink, EntryKind, Key, Link, ObjectChange, ObjectStat};
use crate::api::DagClient;
use crate::error::{ApiError, Error, Result};
use crate::size::MAX_CHUNK_SIZE;

// ── UnixFS size model ────────────────────────────────────────────────────────

fn varint_len(n: u64) -> u64 {
    let mut buf = unsigned_varint::encode::u64_buffer();
    unsigned_varint::encode::u64(n, &mut buf).len() as u64
}

/// Length of a length-delimited protobuf field: tag + varint length + payload.
fn field_len(payload: u64) -> u64 {
    1 + varint_len(payload) + payload
}

/// Serialized size of a dag-pb leaf holding `n` bytes of file data.
fn leaf_node_size(n: u64) -> u64 {
    // UnixFS Data: Type (2 bytes) + filesize (tag + varint) + data field.
    let mut unixfs = 2 + 1 + varint_len(n);
    if n > 0 {
        unixfs += field_len(n);
    }
    field_len(unixfs)
}

/// Serialized size of the dag-pb root linking to `chunks` (CIDv0 links).
fn root_node_size(chunks: &[u64], n: u64) -> u64 {
    let links: u64 = chunks
        .iter()
        .map(|&c| {
            // Hash (34 byte multihash) + empty Name + Tsize
            let body = (2 + 34) + 2 + 1 + varint_len(leaf_node_size(c));
            field_len(body)
        })
        .sum();
    let blocksizes: u64 = chunks.iter().map(|&c| 1 + varint_len(c)).sum();
    let unixfs = 2 + 1 + varint_len(n) + blocksizes;
    links + field_len(unixfs)
}

/// Object stat the default chunker would produce for a file of `n` bytes.
pub fn unixfs_file_stat(n: u64) -> ObjectStat {
    let (block_size, cumulative_size, num_links) = if n <= MAX_CHUNK_SIZE {
        let leaf = leaf_node_size(n);
        (leaf, leaf, 0)
    } else {
        let mut chunks = vec![MAX_CHUNK_SIZE; (n / MAX_CHUNK_SIZE) as usize];
        if n % MAX_CHUNK_SIZE > 0 {
            chunks.push(n % MAX_CHUNK_SIZE);
        }
        let block = root_node_size(&chunks, n);
        let leaves: u64 = chunks.iter().map(|&c| leaf_node_size(c)).sum();
        (block, block + leaves, chunks.len() as u64)
    };
    ObjectStat {
        hash: String::new(),
        num_links,
        block_size,
        links_size: 0,
        data_size: 0,
        cumulative_size,
    }
}

// ── Mock DAG ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File(Vec<u8>),
    Dir(BTreeMap<String, String>),
}

impl Node {
    fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Node::File(data) => {
                hasher.update(b"file\0");
                hasher.update(data);
            }
            Node::Dir(links) => {
                hasher.update(b"dir\0");
                for (name, hash) in links {
                    hasher.update(name.as_bytes());
                    hasher.update(b"\0");
                    hasher.update(hash.as_bytes());
                    hasher.update(b"\0");
                }
            }
        }
        format!("Qm{}", &hex::encode(hasher.finalize())[..44])
    }
}

/// A remote call as recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Add(String),
    PatchAddLink {
        root: String,
        path: String,
        target: String,
        result: String,
    },
    PatchRmLink {
        root: String,
        path: String,
        result: String,
    },
    FilesCp(String, String),
    FilesRm(String),
    NamePublish(String, String),
    PinAdd(String),
    PinRm(String),
}

impl Call {
    /// Calls that modify MFS, IPNS or pins.
    pub fn is_store_write(&self) -> bool {
        matches!(
            self,
            Call::FilesCp(..) | Call::FilesRm(_) | Call::NamePublish(..) | Call::PinAdd(_) | Call::PinRm(_)
        )
    }
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    mfs_root: String,
    ipns: HashMap<String, String>,
    keys: Vec<Key>,
    pins: BTreeSet<String>,
    read_only: bool,
    failures: HashMap<&'static str, String>,
    calls: Vec<Call>,
}

pub struct MockDag {
    inner: Mutex<Inner>,
}

fn remote_err(message: impl Into<String>) -> Error {
    Error::Api(ApiError::new(message))
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl Inner {
    fn put(&mut self, node: Node) -> String {
        let hash = node.hash();
        self.nodes.entry(hash.clone()).or_insert(node);
        hash
    }

    fn empty_dir(&mut self) -> String {
        self.put(Node::Dir(BTreeMap::new()))
    }

    fn node(&self, hash: &str) -> Result<&Node> {
        self.nodes
            .get(hash)
            .ok_or_else(|| remote_err(format!("merkledag: not found ({})", hash)))
    }

    fn fail_if_armed(&self, op: &'static str) -> Result<()> {
        match self.failures.get(op) {
            Some(message) => Err(remote_err(message.clone())),
            None => Ok(()),
        }
    }

    /// Resolve `<hash>/a/b` (optionally prefixed with `/ipfs/`) to a node hash.
    fn resolve(&self, path: &str) -> Result<String> {
        let mut parts = segments(path);
        if parts.first() == Some(&"ipfs") {
            parts.remove(0);
        }
        let (root, rest) = parts
            .split_first()
            .ok_or_else(|| remote_err("invalid path"))?;
        self.walk(root, rest)
    }

    fn walk(&self, root: &str, rest: &[&str]) -> Result<String> {
        let mut current = root.to_string();
        for name in rest {
            match self.node(&current)? {
                Node::Dir(links) => {
                    current = links
                        .get(*name)
                        .cloned()
                        .ok_or_else(|| remote_err(format!("no link named \"{}\" under {}", name, current)))?;
                }
                Node::File(_) => return Err(remote_err(format!("{} is not a directory", current))),
            }
        }
        self.node(&current)?;
        Ok(current)
    }

    fn add_link(&mut self, root: &str, path: &[&str], target: &str, create: bool) -> Result<String> {
        let mut links = match self.node(root)? {
            Node::Dir(links) => links.clone(),
            Node::File(_) => return Err(remote_err(format!("{} is not a directory", root))),
        };
        let (name, rest) = path
            .split_first()
            .ok_or_else(|| remote_err("empty link path"))?;
        if rest.is_empty() {
            links.insert(name.to_string(), target.to_string());
        } else {
            let child = match links.get(*name) {
                Some(child) => child.clone(),
                None if create => self.empty_dir(),
                None => return Err(remote_err(format!("no link named \"{}\" under {}", name, root))),
            };
            let new_child = self.add_link(&child, rest, target, create)?;
            links.insert(name.to_string(), new_child);
        }
        Ok(self.put(Node::Dir(links)))
    }

    fn rm_link(&mut self, root: &str, path: &[&str]) -> Result<String> {
        let mut links = match self.node(root)? {
            Node::Dir(links) => links.clone(),
            Node::File(_) => return Err(remote_err(format!("{} is not a directory", root))),
        };
        let (name, rest) = path
            .split_first()
            .ok_or_else(|| remote_err("empty link path"))?;
        let child = links
            .get(*name)
            .cloned()
            .ok_or_else(|| remote_err("merkledag: not found"))?;
        if rest.is_empty() {
            links.remove(*name);
        } else {
            let new_child = self.rm_link(&child, rest)?;
            links.insert(name.to_string(), new_child);
        }
        Ok(self.put(Node::Dir(links)))
    }

    fn diff(&self, prefix: &str, from: &str, to: &str, out: &mut Vec<ObjectChange>) -> Result<()> {
        if from == to {
            return Ok(());
        }
        match (self.node(from)?, self.node(to)?) {
            (Node::Dir(a), Node::Dir(b)) => {
                let names: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
                for name in names {
                    let path = if prefix.is_empty() {
                        name.clone()
                    } else {
                        format!("{}/{}", prefix, name)
                    };
                    match (a.get(name), b.get(name)) {
                        (Some(x), Some(y)) => self.diff(&path, x, y, out)?,
                        (Some(x), None) => out.push(ObjectChange {
                            kind: 1,
                            path,
                            before: Some(CidLink::new(x.clone())),
                            after: None,
                        }),
                        (None, Some(y)) => out.push(ObjectChange {
                            kind: 0,
                            path,
                            before: None,
                            after: Some(CidLink::new(y.clone())),
                        }),
                        (None, None) => {}
                    }
                }
            }
            _ => out.push(ObjectChange {
                kind: 2,
                path: prefix.to_string(),
                before: Some(CidLink::new(from)),
                after: Some(CidLink::new(to)),
            }),
        }
        Ok(())
    }

    fn stat(&self, hash: &str) -> Result<ObjectStat> {
        let stat = match self.node(hash)? {
            Node::File(data) => unixfs_file_stat(data.len() as u64),
            Node::Dir(links) => ObjectStat {
                hash: String::new(),
                num_links: links.len() as u64,
                block_size: 4,
                links_size: 0,
                data_size: 2,
                cumulative_size: 4,
            },
        };
        Ok(ObjectStat {
            hash: hash.to_string(),
            ..stat
        })
    }
}

impl MockDag {
    /// A writable endpoint with an empty MFS root.
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.mfs_root = inner.empty_dir();
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn read_only() -> Self {
        let mock = Self::new();
        mock.inner.lock().unwrap().read_only = true;
        mock
    }

    /// Store `files` (path, content) in a fresh tree and return its root hash.
    pub fn seed_tree(&self, files: &[(&str, &[u8])]) -> String {
        let mut inner = self.inner.lock().unwrap();
        let mut root = inner.empty_dir();
        for (path, data) in files {
            let parts = segments(path);
            if path.ends_with('/') {
                let dir = inner.empty_dir();
                root = inner.add_link(&root, &parts, &dir, true).unwrap();
            } else {
                let file = inner.put(Node::File(data.to_vec()));
                root = inner.add_link(&root, &parts, &file, true).unwrap();
            }
        }
        root
    }

    pub fn empty_dir_hash(&self) -> String {
        self.inner.lock().unwrap().empty_dir()
    }

    pub fn set_mfs_root(&self, hash: &str) {
        self.inner.lock().unwrap().mfs_root = hash.to_string();
    }

    pub fn mfs_root(&self) -> String {
        self.inner.lock().unwrap().mfs_root.clone()
    }

    /// Register a key owned by the endpoint.
    pub fn add_key(&self, name: &str, id: &str) {
        self.inner.lock().unwrap().keys.push(Key {
            name: name.to_string(),
            id: id.to_string(),
        });
    }

    /// Point `/ipns/<name>` at `hash`.
    pub fn set_ipns(&self, name: &str, hash: &str) {
        self.inner
            .lock()
            .unwrap()
            .ipns
            .insert(name.to_string(), hash.to_string());
    }

    pub fn ipns_target(&self, name: &str) -> Option<String> {
        self.inner.lock().unwrap().ipns.get(name).cloned()
    }

    pub fn pin(&self, hash: &str) {
        self.inner.lock().unwrap().pins.insert(hash.to_string());
    }

    pub fn is_pinned(&self, hash: &str) -> bool {
        self.inner.lock().unwrap().pins.contains(hash)
    }

    /// Make every call to `op` fail with `message` until [`MockDag::heal`].
    pub fn fail(&self, op: &'static str, message: &str) {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert(op, message.to_string());
    }

    pub fn heal(&self, op: &'static str) {
        self.inner.lock().unwrap().failures.remove(op);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    /// Content of the file at `<root>/<path>`, if any.
    pub fn read(&self, root: &str, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let hash = inner.walk(root, &segments(path)).ok()?;
        match inner.nodes.get(&hash)? {
            Node::File(data) => Some(data.clone()),
            Node::Dir(_) => None,
        }
    }

    pub fn exists(&self, root: &str, path: &str) -> bool {
        self.inner.lock().unwrap().walk(root, &segments(path)).is_ok()
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

impl DagClient for MockDag {
    async fn is_read_only(&self) -> Result<bool> {
        Ok(self.inner.lock().unwrap().read_only)
    }

    async fn add(&self, data: Vec<u8>, name: &str) -> Result<String> {
        tokio::task::yield_now().await;
        let hash = {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_if_armed("add")?;
            inner.put(Node::File(data))
        };
        self.record(Call::Add(name.to_string()));
        Ok(hash)
    }

    async fn ls(&self, path: &str) -> Result<Vec<Link>> {
        let inner = self.inner.lock().unwrap();
        inner.fail_if_armed("ls")?;
        let hash = inner.resolve(path)?;
        match inner.node(&hash)? {
            Node::Dir(links) => Ok(links
                .iter()
                .map(|(name, hash)| {
                    let (kind, size) = match inner.nodes.get(hash) {
                        Some(Node::File(data)) => (EntryKind::File, data.len() as u64),
                        _ => (EntryKind::Dir, 0),
                    };
                    Link {
                        name: name.clone(),
                        hash: hash.clone(),
                        size,
                        kind,
                    }
                })
                .collect()),
            Node::File(_) => Ok(Vec::new()),
        }
    }

    async fn cat(&self, path: &str, offset: Option<u64>, length: Option<u64>) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let hash = inner.resolve(path)?;
        match inner.node(&hash)? {
            Node::File(data) => {
                let start = (offset.unwrap_or(0) as usize).min(data.len());
                let end = match length {
                    Some(l) => (start + l as usize).min(data.len()),
                    None => data.len(),
                };
                Ok(data[start..end].to_vec())
            }
            Node::Dir(_) => Err(remote_err("this dag node is a directory")),
        }
    }

    async fn object_stat(&self, path: &str) -> Result<ObjectStat> {
        let inner = self.inner.lock().unwrap();
        inner.fail_if_armed("object/stat")?;
        let hash = inner.resolve(path)?;
        inner.stat(&hash)
    }

    async fn object_patch_add_link(&self, root: &str, path: &str, target: &str) -> Result<String> {
        tokio::task::yield_now().await;
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_if_armed("object/patch/add-link")?;
            inner.node(target)?;
            inner.add_link(root, &segments(path), target, true)?
        };
        self.record(Call::PatchAddLink {
            root: root.to_string(),
            path: path.to_string(),
            target: target.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }

    async fn object_patch_rm_link(&self, root: &str, path: &str) -> Result<String> {
        tokio::task::yield_now().await;
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_if_armed("object/patch/rm-link")?;
            inner.rm_link(root, &segments(path))?
        };
        self.record(Call::PatchRmLink {
            root: root.to_string(),
            path: path.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }

    async fn object_new_dir(&self) -> Result<String> {
        Ok(self.inner.lock().unwrap().empty_dir())
    }

    async fn object_diff(&self, from: &str, to: &str) -> Result<Vec<ObjectChange>> {
        let inner = self.inner.lock().unwrap();
        let mut changes = Vec::new();
        inner.diff("", from, to, &mut changes)?;
        Ok(changes)
    }

    async fn files_stat(&self, path: &str) -> Result<String> {
        let inner = self.inner.lock().unwrap();
        inner.fail_if_armed("files/stat")?;
        let root = inner.mfs_root.clone();
        inner.walk(&root, &segments(path))
    }

    /// Like `ipfs files cp`: the parent must exist and the target must not.
    async fn files_cp(&self, from: &str, to: &str) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_if_armed("files/cp")?;
            let source = inner.resolve(from)?;
            let parts = segments(to);
            let root = inner.mfs_root.clone();
            if let Some((_, parent)) = parts.split_last() {
                inner.walk(&root, parent)?;
            }
            if inner.walk(&root, &parts).is_ok() {
                return Err(remote_err("directory already has entry by that name"));
            }
            inner.mfs_root = inner.add_link(&root, &parts, &source, false)?;
        }
        self.record(Call::FilesCp(from.to_string(), to.to_string()));
        Ok(())
    }

    async fn files_rm(&self, path: &str) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_if_armed("files/rm")?;
            let root = inner.mfs_root.clone();
            inner.mfs_root = inner.rm_link(&root, &segments(path))?;
        }
        self.record(Call::FilesRm(path.to_string()));
        Ok(())
    }

    async fn name_resolve(&self, ipns_path: &str) -> Result<String> {
        let inner = self.inner.lock().unwrap();
        inner.fail_if_armed("name/resolve")?;
        let name = ipns_path.trim_start_matches("/ipns/");
        inner
            .ipns
            .get(name)
            .map(|hash| format!("/ipfs/{}", hash))
            .ok_or_else(|| remote_err(format!("could not resolve name '{}'", ipns_path)))
    }

    async fn name_publish(&self, hash: &str, key: &str) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_if_armed("name/publish")?;
            let id = inner
                .keys
                .iter()
                .find(|k| k.name == key)
                .map(|k| k.id.clone())
                .ok_or_else(|| remote_err(format!("no key named {}", key)))?;
            inner.ipns.insert(id, hash.to_string());
        }
        self.record(Call::NamePublish(hash.to_string(), key.to_string()));
        Ok(())
    }

    async fn key_list(&self) -> Result<Vec<Key>> {
        Ok(self.inner.lock().unwrap().keys.clone())
    }

    async fn pin_add(&self, hash: &str, _recursive: bool) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_if_armed("pin/add")?;
            inner.node(hash)?;
            inner.pins.insert(hash.to_string());
        }
        self.record(Call::PinAdd(hash.to_string()));
        Ok(())
    }

    async fn pin_rm(&self, hash: &str) -> Result<()> {
        let result = {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_if_armed("pin/rm")?;
            if inner.pins.remove(hash) {
                Ok(())
            } else {
                Err(remote_err("not pinned or pinned indirectly"))
            }
        };
        self.record(Call::PinRm(hash.to_string()));
        result
    }
}
