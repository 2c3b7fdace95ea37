//! IPFS RPC client.
//!
//! [`DagClient`] is the set of remote operations the root state machine and
//! the filesystem operations depend on. [`client::IpfsClient`] implements it
//! over the Kubo HTTP RPC API; tests substitute an in-memory DAG.

pub mod client;
pub mod types;

use std::future::Future;

use crate::error::Result;
use types::{Key, Link, ObjectChange, ObjectStat};

pub use client::IpfsClient;

/// Remote DAG, MFS, IPNS and pinning operations against one endpoint.
///
/// Paths passed to `ls`, `cat` and `object_stat` are `<root-hash>/<relative path>`.
pub trait DagClient: Send + Sync + 'static {
    /// Capability check: whether the endpoint refuses writes.
    fn is_read_only(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Add file content (unpinned), returning its hash.
    fn add(&self, data: Vec<u8>, name: &str) -> impl Future<Output = Result<String>> + Send;

    fn ls(&self, path: &str) -> impl Future<Output = Result<Vec<Link>>> + Send;

    /// Read file bytes, optionally from `offset` and for at most `length` bytes.
    fn cat(
        &self,
        path: &str,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn object_stat(&self, path: &str) -> impl Future<Output = Result<ObjectStat>> + Send;

    /// Add (or replace) the link at `path` under `root`, creating intermediate
    /// directories. Returns the new root hash.
    fn object_patch_add_link(
        &self,
        root: &str,
        path: &str,
        target: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Remove the link at `path` under `root`. Returns the new root hash.
    fn object_patch_rm_link(
        &self,
        root: &str,
        path: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Hash of a new empty UnixFS directory.
    fn object_new_dir(&self) -> impl Future<Output = Result<String>> + Send;

    /// Path-indexed changes turning `from` into `to`.
    fn object_diff(
        &self,
        from: &str,
        to: &str,
    ) -> impl Future<Output = Result<Vec<ObjectChange>>> + Send;

    /// Hash of the MFS node at `path`.
    fn files_stat(&self, path: &str) -> impl Future<Output = Result<String>> + Send;

    /// Copy an `/ipfs/<hash>` path into MFS.
    fn files_cp(&self, from: &str, to: &str) -> impl Future<Output = Result<()>> + Send;

    /// Recursively remove an MFS path.
    fn files_rm(&self, path: &str) -> impl Future<Output = Result<()>> + Send;

    /// Resolve an `/ipns/...` path to an `/ipfs/<hash>` path.
    fn name_resolve(&self, ipns_path: &str) -> impl Future<Output = Result<String>> + Send;

    fn name_publish(&self, hash: &str, key: &str) -> impl Future<Output = Result<()>> + Send;

    fn key_list(&self) -> impl Future<Output = Result<Vec<Key>>> + Send;

    fn pin_add(&self, hash: &str, recursive: bool) -> impl Future<Output = Result<()>> + Send;

    /// Unpin `hash`. Fails with a "not pinned" remote error if it was not pinned.
    fn pin_rm(&self, hash: &str) -> impl Future<Output = Result<()>> + Send;
}
