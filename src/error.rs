//! Error types shared by the DAG client, the root state machine and the
//! filesystem operations.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error payload decoded from a non-2xx IPFS RPC response.
///
/// Kubo answers failed calls with `{"Message": ..., "Code": ..., "Type": "error"}`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Code", default)]
    pub code: i64,
    #[serde(rename = "Type", default)]
    pub kind: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 0,
            kind: "error".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid IPFS path '{0}'")]
    InvalidRoot(String),

    #[error("read only public IPFS gateway can't use MFS, use an IPFS path or IPNS path as root")]
    MfsUnavailable,

    #[error("IPFS path '{0}' is read only")]
    ReadOnly(String),

    #[error("object not found: '{0}'")]
    NotFound(String),

    #[error("directory not found: '{0}'")]
    DirNotFound(String),

    #[error("not a file: '{0}'")]
    NotAFile(String),

    #[error("directory not empty: '{0}'")]
    DirNotEmpty(String),

    #[error("directory already exists: '{0}'")]
    DirExists(String),

    /// The MFS tree or IPNS record changed outside this process in a way
    /// that overlaps local changes.
    #[error("concurrent modification of the IPFS {store}, consistency not guaranteed: {detail}")]
    Conflict { store: &'static str, detail: String },

    #[error("{context}: {source}")]
    Pin {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{context}: {source}")]
    Persist {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("could not resolve IPNS path '{path}': {source}")]
    Resolve {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn pin(context: impl Into<String>, source: Error) -> Self {
        Error::Pin {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn persist(context: impl Into<String>, source: Error) -> Self {
        Error::Persist {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn resolve(path: &str, source: Error) -> Self {
        Error::Resolve {
            path: path.to_string(),
            source: Box::new(source),
        }
    }

    /// Whether the remote end rejected the call (as opposed to a transport failure).
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Api(_))
    }

    /// Whether a `pin/rm` failure only says the hash was not pinned.
    pub fn is_not_pinned(&self) -> bool {
        match self {
            Error::Api(e) => e.message.contains("not pinned"),
            _ => false,
        }
    }

    /// Whether the remote reported a missing link or node.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) | Error::DirNotFound(_) => true,
            Error::Api(e) => e.message.contains("not found"),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Persist { source, .. } => source.is_conflict(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
