use crate::config::TelemetryConfig;
use crate::contracts::{Envelope, TraceTelemetry, TAG_CLOUD_ROLE, TAG_SDK_VERSION};
use crate::error::TransportResult;
use crate::http::HttpClient;
use crate::transmitter::Transmitter;
use crate::{ai_debug, TelemetryClient};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A [`TelemetryClient`] that batches telemetry and sends it to the Application Insights
/// ingestion endpoint from a dedicated background thread.
///
/// `track` never blocks on the network: items are queued and sent when a batch fills up or the
/// batch interval elapses. Call [`flush`](TelemetryClient::flush) to send queued items now, and
/// [`shutdown`](AppInsightsClient::shutdown) before the process exits. Dropping the client shuts
/// it down.
///
/// # Example
/// ```no_run
/// use appinsights_channel::{AppInsightsClient, SeverityLevel, TelemetryClient, TelemetryConfig, TraceTelemetry};
/// use std::time::Duration;
///
/// let config = TelemetryConfig::new("00000000-0000-0000-0000-000000000000")
///     .with_role_name("my_client")
///     .with_max_batch_interval(Duration::from_secs(2));
/// let client = AppInsightsClient::new(config).unwrap();
///
/// client.track(TraceTelemetry::new("hello", SeverityLevel::Information)).unwrap();
/// client.shutdown().unwrap();
/// ```
pub struct AppInsightsClient {
    config: TelemetryConfig,
    tags: BTreeMap<String, String>,
    transmitter: Transmitter,
}

impl AppInsightsClient {
    /// Creates a client sending with the default HTTP client.
    pub fn new(config: TelemetryConfig) -> TransportResult<Self> {
        Self::build(config, None)
    }

    /// Creates a client sending through the given HTTP client.
    pub fn with_http_client(
        config: TelemetryConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> TransportResult<Self> {
        Self::build(config, Some(http_client))
    }

    fn build(
        config: TelemetryConfig,
        http_client: Option<Arc<dyn HttpClient>>,
    ) -> TransportResult<Self> {
        let mut tags = BTreeMap::new();
        tags.insert(
            TAG_SDK_VERSION.to_string(),
            concat!("rust:", env!("CARGO_PKG_VERSION")).to_string(),
        );
        if let Some(role_name) = config.role_name() {
            tags.insert(TAG_CLOUD_ROLE.to_string(), role_name.to_string());
        }

        let transmitter = Transmitter::new(&config, http_client)?;
        ai_debug!(
            name: "AppInsightsClient.Built",
            endpoint = config.endpoint_url().to_string(),
        );

        Ok(AppInsightsClient {
            config,
            tags,
            transmitter,
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Sends everything queued and stops the background thread.
    ///
    /// Subsequent calls to `track` fail with
    /// [`TransportError::AlreadyShutdown`](crate::TransportError::AlreadyShutdown).
    pub fn shutdown(&self) -> TransportResult<()> {
        self.transmitter.shutdown()
    }
}

impl TelemetryClient for AppInsightsClient {
    fn track(&self, mut trace: TraceTelemetry) -> TransportResult<()> {
        trace.sanitize();
        let envelope = Envelope::from_trace(trace, self.config.instrumentation_key(), &self.tags);
        self.transmitter.enqueue(envelope)
    }

    fn flush(&self) -> TransportResult<()> {
        self.transmitter.flush()
    }
}

impl fmt::Debug for AppInsightsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppInsightsClient")
            .field("endpoint_url", &self.config.endpoint_url())
            .field("tags", &self.tags)
            .field("transmitter", &self.transmitter)
            .finish()
    }
}

impl Drop for AppInsightsClient {
    fn drop(&mut self) {
        // Already shut down explicitly in the common case.
        let _ = self.transmitter.shutdown();
    }
}
