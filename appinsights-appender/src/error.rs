use appinsights_channel::TransportError;
use thiserror::Error;

/// A specialized `Result` type for hook operations.
pub type HookResult<T> = Result<T, Error>;

/// Errors returned by [`AppInsightsHook`](crate::AppInsightsHook).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A required setting is missing or invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The entry could not be turned into a telemetry item.
    #[error("failed to build telemetry from entry: {0}")]
    Build(String),

    /// The telemetry client did not accept the item.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
