//! Error handling.

use thiserror::Error;

/// A specialized [`Result`](std::result::Result) type for simrpc.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for simrpc.
///
/// Only local failures show up here. Network-level failures collapse to a
/// plain `false` from [`ClientEnd::call`](crate::ClientEnd::call).
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to encode or decode a payload.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Failed to parse or print a topology document.
    #[error("invalid topology: {0}")]
    Topology(#[from] serde_json::Error),

    /// Failed to parse a network config.
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    /// Failed to print a network config.
    #[error("failed to print config: {0}")]
    ConfigPrint(#[from] toml::ser::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A qualified method name without a `Service.Method` separator.
    #[error("malformed method name: {0:?}")]
    MalformedName(String),
}
