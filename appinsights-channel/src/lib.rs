//! A batching telemetry channel for [Azure Application Insights].
//!
//! The channel turns [`TraceTelemetry`] items into ingestion [`Envelope`]s and ships them to the
//! `/v2/track` endpoint from a dedicated background thread. Items are buffered in a bounded
//! queue and sent as gzip-compressed, newline-delimited JSON whenever a batch fills up or the
//! batch interval elapses.
//!
//! [Azure Application Insights]: https://learn.microsoft.com/azure/azure-monitor/app/app-insights-overview
//!
//! # Getting started
//!
//! ```no_run
//! use appinsights_channel::{AppInsightsClient, SeverityLevel, TelemetryClient, TelemetryConfig, TraceTelemetry};
//!
//! let config = TelemetryConfig::new("00000000-0000-0000-0000-000000000000");
//! let client = AppInsightsClient::new(config).unwrap();
//!
//! let mut trace = TraceTelemetry::new("cache warmed", SeverityLevel::Information);
//! trace.properties.insert("entries".into(), "512".into());
//! client.track(trace).unwrap();
//!
//! client.shutdown().unwrap();
//! ```
//!
//! # Crate Feature Flags
//!
//! * `reqwest-blocking-client`: sends telemetry with a blocking [`reqwest`] client. Enabled by
//!   default.
//! * `internal-logs`: emits the channel's own diagnostics through `tracing`. Enabled by default.
//! * `testing`: exposes [`InMemoryTelemetryClient`] for use in tests.
//!
//! [`reqwest`]: https://docs.rs/reqwest
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

mod client;
pub mod config;
pub mod contracts;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "testing"))]
mod in_memory;
#[macro_use]
mod internal_logging;
#[cfg(test)]
mod test_utils;
mod transmitter;

pub use client::AppInsightsClient;
pub use config::TelemetryConfig;
pub use contracts::{Envelope, SeverityLevel, TraceTelemetry};
pub use error::{TransportError, TransportResult};
#[cfg(any(test, feature = "testing"))]
pub use in_memory::InMemoryTelemetryClient;

use std::fmt::Debug;
use std::sync::Arc;

/// Accepts trace telemetry for delivery to Application Insights.
///
/// Implementations must be safe to call concurrently from any number of threads.
pub trait TelemetryClient: Send + Sync + Debug {
    /// Submits one trace for delivery.
    ///
    /// Delivery is asynchronous: success only means the item was accepted.
    fn track(&self, trace: TraceTelemetry) -> TransportResult<()>;

    /// Delivers everything submitted so far.
    fn flush(&self) -> TransportResult<()> {
        Ok(())
    }
}

impl<T: TelemetryClient + ?Sized> TelemetryClient for Arc<T> {
    fn track(&self, trace: TraceTelemetry) -> TransportResult<()> {
        (**self).track(trace)
    }

    fn flush(&self) -> TransportResult<()> {
        (**self).flush()
    }
}

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
