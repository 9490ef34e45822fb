use thiserror::Error;

use crate::runtime::BoxError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// Text crossing the boundary was not a single well-formed JSON value.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// A wire line could not be decoded into an envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// Sandbox identifiers must be non-empty.
    #[error("sandbox id must not be empty")]
    EmptySandboxId,

    /// The runtime factory failed to construct a background runtime.
    #[error("failed to start background runtime: {0}")]
    Start(#[source] BoxError),

    /// The background runtime rejected a delivery.
    #[error("background runtime error: {0}")]
    Runtime(#[source] BoxError),

    /// Serializing a record to JSON failed.
    #[error("serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Thread names are passed to the OS and must not contain NUL bytes.
    #[error("invalid background thread name {0:?}")]
    InvalidThreadName(String),

    /// Thread or async runtime creation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
