//! Error taxonomy. `DfsError` carries the semantic error kinds across the
//! wire as response payloads; `RpcError` is the transport-level failure
//! surface of the stub/skeleton layer and never crosses the wire itself.

use crate::path::PathError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic filesystem errors. Serializable so a server-side failure travels
/// back to the caller as the response payload and is re-raised there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum DfsError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("remote call failed: {0}")]
    Remote(String),
}

impl DfsError {
    pub fn not_found(path: impl std::fmt::Display) -> Self {
        DfsError::FileNotFound(path.to_string())
    }
}

impl From<std::io::Error> for DfsError {
    fn from(err: std::io::Error) -> Self {
        DfsError::Io(err.to_string())
    }
}

impl From<PathError> for DfsError {
    fn from(err: PathError) -> Self {
        DfsError::InvalidArgument(err.to_string())
    }
}

/// Transport failures in the RPC substrate.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),

    #[error("protocol: {0}")]
    Protocol(String),
}

impl From<RpcError> for DfsError {
    fn from(err: RpcError) -> Self {
        DfsError::Remote(err.to_string())
    }
}
