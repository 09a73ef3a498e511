//! # Transmitter
//!
//! The transmitter owns the background thread that turns queued [`Envelope`]s into HTTP
//! requests against the ingestion endpoint.
//!
//! ```ascii
//!   +--------------------------+   +-------------------+   +---------------------+
//!   |                          |   |                   |   |                     |
//!   | AppInsightsClient.track()+---> Transmitter queue +---> POST /v2/track (gz) |
//!   +--------------------------+   +-------------------+   +---------------------+
//! ```
//!
//! A batch is sent when the queue holds `max_batch_size` envelopes, when `max_batch_interval`
//! has elapsed since the previous send, on flush, and on shutdown. Each batch is a
//! newline-delimited list of JSON envelopes, gzip-compressed.
use crate::config::TelemetryConfig;
use crate::contracts::Envelope;
use crate::error::{TransportError, TransportResult};
use crate::http::{Bytes, HttpClient};
use crate::{ai_debug, ai_error, ai_warn};
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{ACCEPT, CONTENT_ENCODING, CONTENT_TYPE};
use http::Method;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const CONTENT_TYPE_JSON_STREAM: &str = "application/x-json-stream";

/// Control messages sent from the application threads to the transmitter thread.
#[derive(Debug)]
enum TransmitterMessage {
    /// Sent only when the number of queued envelopes reached `max_batch_size`.
    Export(Arc<AtomicBool>),
    /// Send everything queued so far.
    Flush(SyncSender<TransportResult<()>>),
    /// Send everything queued so far, then stop the thread.
    Shutdown(SyncSender<TransportResult<()>>),
}

pub(crate) struct Transmitter {
    envelopes_sender: SyncSender<Envelope>,
    message_sender: SyncSender<TransmitterMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    export_message_sent: Arc<AtomicBool>,
    current_batch_size: Arc<AtomicUsize>,
    max_batch_size: usize,
    max_queue_size: usize,
    dropped_count: AtomicUsize,
    is_shutdown: AtomicBool,
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("max_batch_size", &self.max_batch_size)
            .field("max_queue_size", &self.max_queue_size)
            .field("is_shutdown", &self.is_shutdown)
            .finish()
    }
}

impl Transmitter {
    pub(crate) fn new(
        config: &TelemetryConfig,
        http_client: Option<Arc<dyn HttpClient>>,
    ) -> TransportResult<Self> {
        let max_queue_size = config.max_queue_size();
        let max_batch_size = config.max_batch_size();
        let (envelopes_sender, envelopes_receiver) = mpsc::sync_channel::<Envelope>(max_queue_size);
        let (message_sender, message_receiver) = mpsc::sync_channel::<TransmitterMessage>(64);
        let current_batch_size = Arc::new(AtomicUsize::new(0));

        let mut worker = Worker {
            envelopes_receiver,
            endpoint_url: config.endpoint_url().to_string(),
            http_client,
            batch: Vec::with_capacity(max_batch_size),
            max_batch_size,
            current_batch_size: current_batch_size.clone(),
            last_export_time: Instant::now(),
        };
        let max_batch_interval = config.max_batch_interval();

        let handle = thread::Builder::new()
            .name("AppInsights.Channel.Transmitter".to_string())
            .spawn(move || {
                ai_debug!(
                    name: "Transmitter.ThreadStarted",
                    interval_in_millisecs = max_batch_interval.as_millis(),
                    max_batch_size = max_batch_size,
                    max_queue_size = max_queue_size,
                );
                if worker.http_client.is_none() {
                    worker.http_client = default_http_client();
                }

                loop {
                    let remaining_time = max_batch_interval
                        .checked_sub(worker.last_export_time.elapsed())
                        .unwrap_or(max_batch_interval);

                    match message_receiver.recv_timeout(remaining_time) {
                        Ok(TransmitterMessage::Export(export_message_sent)) => {
                            export_message_sent.store(false, Ordering::Relaxed);
                            ai_debug!(name: "Transmitter.ExportingDueToBatchSize");
                            let _ = worker.export_queued();
                        }
                        Ok(TransmitterMessage::Flush(sender)) => {
                            ai_debug!(name: "Transmitter.ExportingDueToFlush");
                            let _ = sender.send(worker.export_queued());
                        }
                        Ok(TransmitterMessage::Shutdown(sender)) => {
                            ai_debug!(name: "Transmitter.ExportingDueToShutdown");
                            let _ = sender.send(worker.export_queued());
                            ai_debug!(name: "Transmitter.ThreadExiting", reason = "ShutdownRequested");
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            ai_debug!(name: "Transmitter.ExportingDueToTimer");
                            let _ = worker.export_queued();
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            ai_debug!(name: "Transmitter.ThreadExiting", reason = "MessageSenderDisconnected");
                            break;
                        }
                    }
                }
                ai_debug!(name: "Transmitter.ThreadStopped");
            })?;

        Ok(Transmitter {
            envelopes_sender,
            message_sender,
            handle: Mutex::new(Some(handle)),
            export_message_sent: Arc::new(AtomicBool::new(false)),
            current_batch_size,
            max_batch_size,
            max_queue_size,
            dropped_count: AtomicUsize::new(0),
            is_shutdown: AtomicBool::new(false),
        })
    }

    /// Queues an envelope without blocking.
    pub(crate) fn enqueue(&self, envelope: Envelope) -> TransportResult<()> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TransportError::AlreadyShutdown);
        }

        match self.envelopes_sender.try_send(envelope) {
            Ok(()) => {
                if self
                    .current_batch_size
                    .fetch_add(1, Ordering::Relaxed)
                    .saturating_add(1)
                    >= self.max_batch_size
                    // Only one export request is kept in flight; the flag is reset by the
                    // worker once it has picked the request up.
                    && !self.export_message_sent.swap(true, Ordering::Relaxed)
                    && self
                        .message_sender
                        .try_send(TransmitterMessage::Export(
                            self.export_message_sent.clone(),
                        ))
                        .is_err()
                {
                    self.export_message_sent.store(false, Ordering::Relaxed);
                }
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                if self.dropped_count.fetch_add(1, Ordering::Relaxed) == 0 {
                    ai_warn!(name: "Transmitter.EnvelopeDroppingStarted",
                        message = "Telemetry queue is full. Further drops are counted and reported at shutdown.");
                }
                Err(TransportError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                ai_warn!(
                    name: "Transmitter.Enqueue.AfterShutdown",
                    message = "Telemetry is being tracked after the transmitter stopped. It will not be sent."
                );
                Err(TransportError::AlreadyShutdown)
            }
        }
    }

    /// Sends everything queued so far and waits for the outcome.
    pub(crate) fn flush(&self) -> TransportResult<()> {
        let (sender, receiver) = mpsc::sync_channel(1);
        match self.message_sender.try_send(TransmitterMessage::Flush(sender)) {
            Ok(()) => receiver.recv_timeout(FLUSH_TIMEOUT).map_err(|err| {
                if err == RecvTimeoutError::Timeout {
                    TransportError::Timeout(FLUSH_TIMEOUT)
                } else {
                    TransportError::InternalFailure(format!("{}", err))
                }
            })?,
            Err(TrySendError::Full(_)) => Err(TransportError::InternalFailure(
                "Flush cannot be performed as the control channel is full.".into(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::AlreadyShutdown),
        }
    }

    /// Sends everything queued so far and stops the background thread.
    pub(crate) fn shutdown(&self) -> TransportResult<()> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TransportError::AlreadyShutdown);
        }

        let dropped = self.dropped_count.load(Ordering::Relaxed);
        if dropped > 0 {
            ai_warn!(
                name: "Transmitter.EnvelopesDropped",
                dropped_count = dropped,
                max_queue_size = self.max_queue_size,
                message = "Envelopes were dropped due to a full queue. Consider increasing the queue size or decreasing the batch interval."
            );
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        match self.message_sender.try_send(TransmitterMessage::Shutdown(sender)) {
            Ok(()) => {
                let result = receiver.recv_timeout(SHUTDOWN_TIMEOUT).map_err(|err| match err {
                    RecvTimeoutError::Timeout => {
                        ai_error!(name: "Transmitter.Shutdown.Timeout");
                        TransportError::Timeout(SHUTDOWN_TIMEOUT)
                    }
                    RecvTimeoutError::Disconnected => {
                        TransportError::InternalFailure(format!("{}", err))
                    }
                })?;
                if let Some(handle) = self.handle.lock()?.take() {
                    handle.join().map_err(|_| {
                        TransportError::InternalFailure("transmitter thread panicked".into())
                    })?;
                }
                result
            }
            Err(TrySendError::Full(_)) => Err(TransportError::InternalFailure(
                "Shutdown cannot be performed as the control channel is full.".into(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::AlreadyShutdown),
        }
    }
}

struct Worker {
    envelopes_receiver: mpsc::Receiver<Envelope>,
    endpoint_url: String,
    http_client: Option<Arc<dyn HttpClient>>,
    batch: Vec<Envelope>,
    max_batch_size: usize,
    current_batch_size: Arc<AtomicUsize>,
    last_export_time: Instant,
}

/// Subtracts `count` exported envelopes from the pending counter without going below zero. The
/// worker can drain an envelope before its enqueuer has counted it.
fn release_batch_slots(current_batch_size: &AtomicUsize, count: usize) {
    let _ = current_batch_size.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(count))
    });
}

impl Worker {
    /// Sends every envelope that was queued when the call started, in batches of at most
    /// `max_batch_size`. Returns the outcome of the last batch that failed, if any.
    fn export_queued(&mut self) -> TransportResult<()> {
        self.last_export_time = Instant::now();
        let target = self.current_batch_size.load(Ordering::Relaxed);
        let mut result = Ok(());
        let mut total_exported = 0;

        while total_exported < target {
            while let Ok(envelope) = self.envelopes_receiver.try_recv() {
                self.batch.push(envelope);
                if self.batch.len() == self.max_batch_size {
                    break;
                }
            }
            if self.batch.is_empty() {
                break;
            }

            let count = self.batch.len();
            total_exported += count;
            if let Err(err) = self.send_batch() {
                ai_error!(name: "Transmitter.ExportError", error = format!("{}", err));
                result = Err(err);
            }
            self.batch.clear();
            release_batch_slots(&self.current_batch_size, count);
        }
        result
    }

    fn send_batch(&self) -> TransportResult<()> {
        let client = self.http_client.as_ref().ok_or_else(|| {
            TransportError::InternalFailure("no HTTP client configured for the transmitter".into())
        })?;

        let body = encode_batch(&self.batch)?;
        let request = http::Request::builder()
            .method(Method::POST)
            .uri(&self.endpoint_url)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON_STREAM)
            .header(CONTENT_ENCODING, "gzip")
            .header(ACCEPT, "application/json")
            .body(Bytes::from(body))
            .map_err(|e| TransportError::RequestFailed(Box::new(e)))?;

        ai_debug!(name: "Transmitter.SendingBatch", batch_size = self.batch.len());
        let response = futures_executor::block_on(client.send_bytes(request))
            .map_err(TransportError::RequestFailed)?;

        if !response.status().is_success() {
            return Err(TransportError::Rejected {
                status: response.status().as_u16(),
                body: String::from_utf8_lossy(response.body()).into_owned(),
            });
        }
        Ok(())
    }
}

/// Encodes envelopes as gzip-compressed, newline-delimited JSON.
pub(crate) fn encode_batch(envelopes: &[Envelope]) -> TransportResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for envelope in envelopes {
        serde_json::to_writer(&mut encoder, envelope)?;
        encoder.write_all(b"\n")?;
    }
    Ok(encoder.finish()?)
}

#[cfg(feature = "reqwest-blocking-client")]
fn default_http_client() -> Option<Arc<dyn HttpClient>> {
    // Built on the transmitter thread: the blocking client must not be created or dropped from
    // within an async runtime.
    Some(Arc::new(reqwest::blocking::Client::new()))
}

#[cfg(not(feature = "reqwest-blocking-client"))]
fn default_http_client() -> Option<Arc<dyn HttpClient>> {
    ai_warn!(
        name: "Transmitter.NoHttpClient",
        message = "No HTTP client configured and the `reqwest-blocking-client` feature is disabled. Telemetry will not be sent."
    );
    None
}
