use crate::contracts::TraceTelemetry;
use crate::error::TransportResult;
use crate::TelemetryClient;
use std::sync::{Arc, Mutex};

/// A telemetry client that stores tracked traces in memory.
///
/// This client is useful for testing and debugging purposes. Clones share the same storage, so
/// a clone can be kept for assertions after the original is handed to a hook.
///
/// # Example
/// ```
/// use appinsights_channel::{InMemoryTelemetryClient, SeverityLevel, TelemetryClient, TraceTelemetry};
///
/// let client = InMemoryTelemetryClient::default();
/// client.track(TraceTelemetry::new("hello", SeverityLevel::Information)).unwrap();
///
/// let traces = client.get_tracked_traces().unwrap();
/// assert_eq!(traces[0].message, "hello");
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryTelemetryClient {
    traces: Arc<Mutex<Vec<TraceTelemetry>>>,
}

impl InMemoryTelemetryClient {
    /// Returns every trace tracked so far.
    pub fn get_tracked_traces(&self) -> TransportResult<Vec<TraceTelemetry>> {
        let traces = self.traces.lock()?;
        Ok(traces.clone())
    }

    /// Clears the stored traces.
    pub fn reset(&self) {
        let _ = self.traces.lock().map(|mut traces| traces.clear());
    }
}

impl TelemetryClient for InMemoryTelemetryClient {
    fn track(&self, trace: TraceTelemetry) -> TransportResult<()> {
        self.traces.lock()?.push(trace);
        Ok(())
    }
}
