use appinsights_channel::TelemetryConfig;
use std::time::Duration;

/// Settings for [`AppInsightsHook::new`](crate::AppInsightsHook::new).
///
/// Only the instrumentation key is required. A zero batch size, a zero interval, or an empty
/// endpoint keeps the telemetry client's default, which itself honors the `APPINSIGHTS_*`
/// environment variables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// Instrumentation key of the Application Insights resource.
    pub instrumentation_key: String,
    /// Maximum number of items sent in one request.
    pub max_batch_size: usize,
    /// Maximum delay before queued items are sent.
    pub max_batch_interval: Duration,
    /// Ingestion endpoint.
    pub endpoint_url: String,
}

impl Config {
    /// Creates a configuration for `instrumentation_key` that keeps every default.
    pub fn new(instrumentation_key: impl Into<String>) -> Self {
        Config {
            instrumentation_key: instrumentation_key.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of items sent in one request.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set the maximum delay before queued items are sent.
    pub fn with_max_batch_interval(mut self, max_batch_interval: Duration) -> Self {
        self.max_batch_interval = max_batch_interval;
        self
    }

    /// Set the ingestion endpoint.
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = endpoint_url.into();
        self
    }

    pub(crate) fn to_telemetry_config(&self) -> TelemetryConfig {
        let mut config = TelemetryConfig::new(self.instrumentation_key.clone());
        if self.max_batch_size != 0 {
            config = config.with_max_batch_size(self.max_batch_size);
        }
        if !self.max_batch_interval.is_zero() {
            config = config.with_max_batch_interval(self.max_batch_interval);
        }
        if !self.endpoint_url.is_empty() {
            config = config.with_endpoint_url(self.endpoint_url.clone());
        }
        config
    }
}
