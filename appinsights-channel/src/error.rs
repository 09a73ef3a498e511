//! Errors surfaced by the telemetry channel.
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

use crate::http::HttpError;

/// A specialized `Result` type for channel operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors returned while queueing or transmitting telemetry.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The in-memory queue is full and the item was dropped.
    #[error("telemetry queue is full, item dropped")]
    QueueFull,

    /// The channel was shut down before the call.
    #[error("telemetry channel is already shut down")]
    AlreadyShutdown,

    /// The background transmitter did not answer in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A batch could not be encoded.
    #[error("failed to serialize telemetry: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compressing a batch or spawning the transmitter failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The request could not be completed.
    #[error("request to the ingestion endpoint failed: {0}")]
    RequestFailed(#[source] HttpError),

    /// The ingestion endpoint answered with a non-success status.
    #[error("ingestion endpoint rejected the batch with status {status}: {body}")]
    Rejected {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },

    /// Any other failure inside the channel.
    #[error("{0}")]
    InternalFailure(String),
}

impl<T> From<PoisonError<T>> for TransportError {
    fn from(err: PoisonError<T>) -> Self {
        TransportError::InternalFailure(format!("Mutex poisoned: {}", err))
    }
}
