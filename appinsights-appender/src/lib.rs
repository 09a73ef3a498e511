//! Sends log entries to [Azure Application Insights] as trace telemetry.
//!
//! The [`AppInsightsHook`] receives structured [`Entry`] values, turns their fields into
//! string properties, maps their level onto the Application Insights severity scale, and hands
//! the result to a telemetry client from [`appinsights_channel`] for batched delivery.
//!
//! [Azure Application Insights]: https://learn.microsoft.com/azure/azure-monitor/app/app-insights-overview
//!
//! # Field pipeline
//!
//! Every entry carries its message under the `"message"` field. Other fields are kept unless
//! they were registered with [`AppInsightsHook::add_ignore`]. A filter registered with
//! [`AppInsightsHook::add_filter`] replaces the value of its field. Every other value is
//! normalized by [`format_value`]: structured values first, then errors, then values with a
//! text form. The properties `source_level` and `source_timestamp` are always added.
//!
//! ```
//! use appinsights_appender::{AppInsightsHook, Entry, Hook, Level, Value};
//! use appinsights_channel::InMemoryTelemetryClient;
//!
//! let client = InMemoryTelemetryClient::default();
//! let mut hook = AppInsightsHook::with_client(client.clone());
//! hook.add_ignore("price");
//! hook.add_filter("secret", |_| Value::from("REDACTED"));
//!
//! let mut entry = Entry::new(Level::Info, "entry_message")
//!     .with_field("name", "apple")
//!     .with_field("price", 105)
//!     .with_field("secret", "hunter2");
//! hook.fire(&mut entry).unwrap();
//!
//! let trace = &client.get_tracked_traces().unwrap()[0];
//! assert_eq!(trace.properties["message"], "entry_message");
//! assert_eq!(trace.properties["secret"], "REDACTED");
//! assert!(!trace.properties.contains_key("price"));
//! ```
//!
//! # Logging framework bridges
//!
//! * [`AppInsightsLogBridge`] implements [`log::Log`] (feature `log`, enabled by default).
//! * [`AppInsightsTracingBridge`] implements `tracing_subscriber::Layer` (feature `tracing`).
//!
//! # Crate Feature Flags
//!
//! * `log`: the `log` bridge. Enabled by default.
//! * `tracing`: the `tracing` bridge.
//! * `internal-logs`: emits the hook's own diagnostics through `tracing`. Enabled by default.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

mod config;
mod dispatch;
mod entry;
mod error;
pub mod format;
mod hook;
#[cfg(feature = "log")]
mod log_bridge;
mod severity;
#[cfg(feature = "tracing")]
mod tracing_bridge;
pub mod value;

pub use config::Config;
pub use dispatch::DispatchStats;
pub use entry::{Entry, Level, MESSAGE_KEY};
pub use error::{Error, HookResult};
pub use format::{format_value, normalize, render, FieldPipeline, Filter};
pub use hook::{
    build_trace, AppInsightsHook, Hook, DEFAULT_LEVELS, SOURCE_LEVEL_KEY, SOURCE_TIMESTAMP_KEY,
};
#[cfg(feature = "log")]
pub use log_bridge::AppInsightsLogBridge;
pub use severity::map_severity;
#[cfg(feature = "tracing")]
pub use tracing_bridge::AppInsightsTracingBridge;
pub use value::{CapturedError, FieldValue, ToJson, Value};
