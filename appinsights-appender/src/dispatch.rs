//! # Async dispatch
//!
//! In async mode the hook hands every entry to a single background thread and returns at
//! once. The thread builds the telemetry item and tracks it. Outcomes are never reported back
//! to the caller: dropped entries (full queue), failed sends and panics are counted in
//! [`DispatchStats`] and logged.
use crate::entry::Entry;
use crate::error::{Error, HookResult};
use crate::format::FieldPipeline;
use crate::hook::build_trace;
use appinsights_channel::{ai_debug, ai_error, ai_warn, TelemetryClient, TransportError};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub(crate) const QUEUE_SIZE: usize = 2_048;
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Counters of entries the async dispatcher could not deliver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Entries dropped because the dispatch queue was full.
    pub dropped: usize,
    /// Entries whose build or send failed, panics included.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    dropped: AtomicUsize,
    failed: AtomicUsize,
}

enum Job {
    Fire {
        entry: Entry,
        pipeline: Arc<FieldPipeline>,
    },
    Flush(SyncSender<()>),
}

#[derive(Debug)]
pub(crate) struct AsyncDispatcher {
    sender: Option<SyncSender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl AsyncDispatcher {
    pub(crate) fn new<C>(client: Arc<C>) -> io::Result<Self>
    where
        C: TelemetryClient + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel::<Job>(QUEUE_SIZE);
        let counters = Arc::new(Counters::default());
        let worker_counters = counters.clone();

        let handle = thread::Builder::new()
            .name("AppInsights.Hook.AsyncDispatcher".to_string())
            .spawn(move || {
                ai_debug!(name: "AsyncDispatcher.ThreadStarted", queue_size = QUEUE_SIZE);
                for job in receiver {
                    match job {
                        Job::Fire {
                            mut entry,
                            pipeline,
                        } => {
                            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                                let trace = build_trace(&pipeline, &mut entry)?;
                                client.track(trace).map_err(Error::from)
                            }));
                            match outcome {
                                Ok(Ok(())) => {}
                                Ok(Err(err)) => {
                                    worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                                    ai_warn!(
                                        name: "AsyncDispatcher.FireFailed",
                                        error = format!("{}", err),
                                    );
                                }
                                Err(_) => {
                                    worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                                    ai_error!(name: "AsyncDispatcher.FirePanicked");
                                }
                            }
                        }
                        Job::Flush(reply) => {
                            let _ = reply.send(());
                        }
                    }
                }
                ai_debug!(name: "AsyncDispatcher.ThreadStopped");
            })?;

        Ok(AsyncDispatcher {
            sender: Some(sender),
            handle: Some(handle),
            counters,
        })
    }

    /// Queues an entry without blocking.
    pub(crate) fn dispatch(&self, entry: Entry, pipeline: Arc<FieldPipeline>) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(Job::Fire { entry, pipeline }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if self.counters.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    ai_warn!(
                        name: "AsyncDispatcher.EntryDroppingStarted",
                        message = "Async dispatch queue is full. Further drops are counted in the dispatch stats."
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Waits until every entry queued before the call has been handed to the client.
    ///
    /// Queueing the flush marker and waiting for the worker share one [`FLUSH_TIMEOUT`].
    pub(crate) fn flush(&self) -> HookResult<()> {
        let Some(sender) = &self.sender else {
            return Ok(());
        };
        let deadline = Instant::now() + FLUSH_TIMEOUT;
        let (reply_sender, reply_receiver) = mpsc::sync_channel(1);
        let mut job = Job::Flush(reply_sender);
        loop {
            match sender.try_send(job) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        ai_warn!(name: "AsyncDispatcher.FlushTimedOut", stage = "enqueue");
                        return Err(TransportError::Timeout(FLUSH_TIMEOUT).into());
                    }
                    job = returned;
                    thread::sleep(FLUSH_RETRY_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(TransportError::AlreadyShutdown.into());
                }
            }
        }
        reply_receiver
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .map_err(|_| TransportError::Timeout(FLUSH_TIMEOUT))?;
        Ok(())
    }

    pub(crate) fn stats(&self) -> DispatchStats {
        DispatchStats {
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for AsyncDispatcher {
    fn drop(&mut self) {
        // Disconnecting the queue lets the worker drain it and exit.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Level;
    use appinsights_channel::{InMemoryTelemetryClient, TraceTelemetry, TransportResult};
    use std::sync::Mutex;

    /// Blocks every `track` call until the gate is dropped.
    #[derive(Debug)]
    struct GatedClient {
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl TelemetryClient for GatedClient {
        fn track(&self, _trace: TraceTelemetry) -> TransportResult<()> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(())
        }
    }

    #[derive(Debug)]
    struct RejectingClient;

    impl TelemetryClient for RejectingClient {
        fn track(&self, _trace: TraceTelemetry) -> TransportResult<()> {
            Err(TransportError::QueueFull)
        }
    }

    #[derive(Debug)]
    struct PanickingClient;

    impl TelemetryClient for PanickingClient {
        fn track(&self, _trace: TraceTelemetry) -> TransportResult<()> {
            panic!("client exploded");
        }
    }

    fn pipeline() -> Arc<FieldPipeline> {
        Arc::new(FieldPipeline::new())
    }

    #[test]
    fn dispatched_entries_reach_the_client() {
        let client = InMemoryTelemetryClient::default();
        let dispatcher = AsyncDispatcher::new(Arc::new(client.clone())).unwrap();

        for i in 0..10 {
            dispatcher.dispatch(Entry::new(Level::Info, format!("entry {i}")), pipeline());
        }
        dispatcher.flush().unwrap();

        assert_eq!(client.get_tracked_traces().unwrap().len(), 10);
        assert_eq!(dispatcher.stats(), DispatchStats::default());
    }

    #[test]
    fn drop_drains_the_queue() {
        let client = InMemoryTelemetryClient::default();
        let dispatcher = AsyncDispatcher::new(Arc::new(client.clone())).unwrap();

        dispatcher.dispatch(Entry::new(Level::Info, "last words"), pipeline());
        drop(dispatcher);

        assert_eq!(client.get_tracked_traces().unwrap().len(), 1);
    }

    #[test]
    fn full_queue_drops_entries() {
        let (gate_sender, gate_receiver) = mpsc::channel();
        let client = GatedClient {
            gate: Mutex::new(gate_receiver),
        };
        let dispatcher = AsyncDispatcher::new(Arc::new(client)).unwrap();

        for _ in 0..QUEUE_SIZE + 10 {
            dispatcher.dispatch(Entry::new(Level::Info, "spam"), pipeline());
        }
        assert!(dispatcher.stats().dropped >= 9);

        drop(gate_sender);
    }

    #[test]
    fn flush_times_out_when_the_queue_stays_full() {
        let (gate_sender, gate_receiver) = mpsc::channel();
        let client = GatedClient {
            gate: Mutex::new(gate_receiver),
        };
        let dispatcher = AsyncDispatcher::new(Arc::new(client)).unwrap();
        for _ in 0..QUEUE_SIZE + 5 {
            dispatcher.dispatch(Entry::new(Level::Info, "spam"), pipeline());
        }

        let started = Instant::now();
        let result = dispatcher.flush();
        let elapsed = started.elapsed();

        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::Timeout(_)))
        ));
        assert!(elapsed >= FLUSH_TIMEOUT);
        assert!(elapsed < FLUSH_TIMEOUT + Duration::from_secs(2));

        drop(gate_sender);
    }

    #[test]
    fn failed_sends_are_counted() {
        let dispatcher = AsyncDispatcher::new(Arc::new(RejectingClient)).unwrap();

        dispatcher.dispatch(Entry::new(Level::Error, "nope"), pipeline());
        dispatcher.dispatch(Entry::new(Level::Error, "nope"), pipeline());
        dispatcher.flush().unwrap();

        assert_eq!(dispatcher.stats().failed, 2);
    }

    #[test]
    fn panics_are_contained_and_counted() {
        let dispatcher = AsyncDispatcher::new(Arc::new(PanickingClient)).unwrap();

        dispatcher.dispatch(Entry::new(Level::Error, "boom"), pipeline());
        dispatcher.flush().unwrap();
        dispatcher.dispatch(Entry::new(Level::Error, "boom again"), pipeline());
        dispatcher.flush().unwrap();

        assert_eq!(dispatcher.stats().failed, 2);
    }
}
