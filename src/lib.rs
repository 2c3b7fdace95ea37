//! A mutable IPFS DAG exposed as a filesystem.
//!
//! Every write produces a new DAG root hash through link patches. The
//! current hash lives in memory, shared by every handle opened with the same
//! [`Options`], and is periodically persisted to the endpoint's MFS or to an
//! owned IPNS name, with the persisted hash kept pinned.

pub mod api;
pub mod error;
pub mod fs;
pub mod options;
pub mod root;
pub mod size;

#[cfg(test)]
mod mock;

pub use api::{DagClient, IpfsClient};
pub use error::{Error, Result};
pub use fs::{ByteRange, Entry, IpfsFs, Object};
pub use options::Options;
pub use root::{RootRegistry, RootState};
