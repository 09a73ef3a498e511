use std::cmp::{max, min};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Ingestion endpoint override.
pub const APPINSIGHTS_ENDPOINT_URL: &str = "APPINSIGHTS_ENDPOINT_URL";
/// Default ingestion endpoint.
pub const APPINSIGHTS_ENDPOINT_URL_DEFAULT: &str = "https://dc.services.visualstudio.com/v2/track";
/// Maximum number of envelopes sent in one request.
pub const APPINSIGHTS_MAX_BATCH_SIZE: &str = "APPINSIGHTS_MAX_BATCH_SIZE";
/// Default maximum batch size.
pub const APPINSIGHTS_MAX_BATCH_SIZE_DEFAULT: usize = 1_024;
/// Maximum delay, in milliseconds, before queued telemetry is sent.
pub const APPINSIGHTS_MAX_BATCH_INTERVAL: &str = "APPINSIGHTS_MAX_BATCH_INTERVAL";
/// Default maximum batch interval.
pub const APPINSIGHTS_MAX_BATCH_INTERVAL_DEFAULT: Duration = Duration::from_secs(10);
/// Maximum number of envelopes buffered in memory.
pub const APPINSIGHTS_MAX_QUEUE_SIZE: &str = "APPINSIGHTS_MAX_QUEUE_SIZE";
/// Default maximum queue size.
pub const APPINSIGHTS_MAX_QUEUE_SIZE_DEFAULT: usize = 8_192;

/// Configuration of an [`AppInsightsClient`](crate::AppInsightsClient).
///
/// Defaults are overridden by the following environment variables when set:
/// * `APPINSIGHTS_ENDPOINT_URL`
/// * `APPINSIGHTS_MAX_BATCH_SIZE`
/// * `APPINSIGHTS_MAX_BATCH_INTERVAL`
/// * `APPINSIGHTS_MAX_QUEUE_SIZE`
///
/// Note: Programmatic configuration overrides any value set via the environment variable.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryConfig {
    pub(crate) instrumentation_key: String,
    pub(crate) endpoint_url: String,
    pub(crate) max_batch_size: usize,
    pub(crate) max_batch_interval: Duration,
    pub(crate) max_queue_size: usize,
    pub(crate) role_name: Option<String>,
}

impl TelemetryConfig {
    /// Creates a configuration for the given instrumentation key with default values.
    pub fn new(instrumentation_key: impl Into<String>) -> Self {
        TelemetryConfig {
            instrumentation_key: instrumentation_key.into(),
            endpoint_url: APPINSIGHTS_ENDPOINT_URL_DEFAULT.to_string(),
            max_batch_size: APPINSIGHTS_MAX_BATCH_SIZE_DEFAULT,
            max_batch_interval: APPINSIGHTS_MAX_BATCH_INTERVAL_DEFAULT,
            max_queue_size: APPINSIGHTS_MAX_QUEUE_SIZE_DEFAULT,
            role_name: None,
        }
        .init_from_env_vars()
    }

    /// Set the ingestion endpoint.
    ///
    /// Corresponding environment variable: `APPINSIGHTS_ENDPOINT_URL`.
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = endpoint_url.into();
        self
    }

    /// Set how many envelopes can be sent in one call to the collector.
    /// The default value is 1024.
    ///
    /// Corresponding environment variable: `APPINSIGHTS_MAX_BATCH_SIZE`.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set the maximum delay before queued telemetry is sent.
    /// The default value is 10 seconds.
    ///
    /// Corresponding environment variable: `APPINSIGHTS_MAX_BATCH_INTERVAL`.
    pub fn with_max_batch_interval(mut self, max_batch_interval: Duration) -> Self {
        self.max_batch_interval = max_batch_interval;
        self
    }

    /// Set the maximum number of envelopes buffered before new ones are dropped.
    /// The default value is 8192.
    ///
    /// Corresponding environment variable: `APPINSIGHTS_MAX_QUEUE_SIZE`.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the cloud role reported with every envelope.
    pub fn with_role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    /// The instrumentation key telemetry is addressed to.
    pub fn instrumentation_key(&self) -> &str {
        &self.instrumentation_key
    }

    /// The ingestion endpoint.
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// The effective batch size: at least one and never more than the queue size.
    pub fn max_batch_size(&self) -> usize {
        max(1, min(self.max_batch_size, self.max_queue_size))
    }

    /// The maximum delay before queued telemetry is sent.
    pub fn max_batch_interval(&self) -> Duration {
        self.max_batch_interval
    }

    /// The effective queue size, at least one.
    pub fn max_queue_size(&self) -> usize {
        max(1, self.max_queue_size)
    }

    /// The configured cloud role, if any.
    pub fn role_name(&self) -> Option<&str> {
        self.role_name.as_deref()
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Ok(endpoint_url) = env::var(APPINSIGHTS_ENDPOINT_URL) {
            if !endpoint_url.is_empty() {
                self.endpoint_url = endpoint_url;
            }
        }

        if let Some(max_batch_size) = env::var(APPINSIGHTS_MAX_BATCH_SIZE)
            .ok()
            .and_then(|batch_size| usize::from_str(&batch_size).ok())
        {
            self.max_batch_size = max_batch_size;
        }

        if let Some(max_batch_interval) = env::var(APPINSIGHTS_MAX_BATCH_INTERVAL)
            .ok()
            .and_then(|interval| u64::from_str(&interval).ok())
        {
            self.max_batch_interval = Duration::from_millis(max_batch_interval);
        }

        if let Some(max_queue_size) = env::var(APPINSIGHTS_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| usize::from_str(&queue_size).ok())
        {
            self.max_queue_size = max_queue_size;
        }

        self
    }
}
