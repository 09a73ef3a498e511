use crate::config::Config;
use crate::dispatch::{AsyncDispatcher, DispatchStats};
use crate::entry::{Entry, Level};
use crate::error::{Error, HookResult};
use crate::format::FieldPipeline;
use crate::severity::map_severity;
use crate::value::Value;
use appinsights_channel::{
    ai_debug, AppInsightsClient, TelemetryClient, TelemetryConfig, TraceTelemetry, TransportError,
};
use chrono::SecondsFormat;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Levels a new hook fires for.
pub const DEFAULT_LEVELS: [Level; 5] = [
    Level::Panic,
    Level::Fatal,
    Level::Error,
    Level::Warn,
    Level::Info,
];

/// Property holding the text form of the entry level.
pub const SOURCE_LEVEL_KEY: &str = "source_level";
/// Property holding the RFC 3339 entry time.
pub const SOURCE_TIMESTAMP_KEY: &str = "source_timestamp";

/// The contract between a logging framework and a sink of its entries.
///
/// The framework calls [`fire`](Hook::fire) once for every entry whose level is listed in
/// [`levels`](Hook::levels).
pub trait Hook: Send + Sync {
    /// Levels this hook wants to receive.
    fn levels(&self) -> &[Level];

    /// Handles one entry.
    fn fire(&self, entry: &mut Entry) -> HookResult<()>;

    /// Delivers anything the hook buffered.
    fn flush(&self) -> HookResult<()> {
        Ok(())
    }
}

/// A [`Hook`] that sends entries to Application Insights as trace telemetry.
///
/// Configure the hook completely (levels, ignored fields, filters, async mode) before handing
/// it to a logging framework. The setters take `&mut self`, so a shared hook cannot be
/// reconfigured.
///
/// # Example
/// ```no_run
/// use appinsights_appender::{AppInsightsHook, Config, Entry, Hook, Level, Value};
///
/// let mut hook = AppInsightsHook::new("checkout", Config::new("00000000-0000-0000-0000-000000000000")).unwrap();
/// hook.add_ignore("password");
/// hook.add_filter("card_number", |_| Value::from("REDACTED"));
///
/// let mut entry = Entry::new(Level::Warn, "payment retried").with_field("attempt", 2);
/// hook.fire(&mut entry).unwrap();
/// hook.flush().unwrap();
/// ```
pub struct AppInsightsHook<C: TelemetryClient + 'static = AppInsightsClient> {
    client: Arc<C>,
    levels: Vec<Level>,
    pipeline: Arc<FieldPipeline>,
    dispatcher: Option<AsyncDispatcher>,
}

impl AppInsightsHook<AppInsightsClient> {
    /// Creates a hook reporting as the cloud role `name`.
    ///
    /// Fails with [`Error::Config`] when `name` or the instrumentation key is empty.
    pub fn new(name: &str, config: Config) -> HookResult<Self> {
        if name.is_empty() {
            return Err(Error::Config(
                "client name is required and missing from configuration".into(),
            ));
        }
        if config.instrumentation_key.is_empty() {
            return Err(Error::Config(
                "instrumentation key is required and missing from configuration".into(),
            ));
        }

        let telemetry_config = config.to_telemetry_config().with_role_name(name);
        Ok(Self::with_client(AppInsightsClient::new(telemetry_config)?))
    }

    /// Creates a hook from a complete client configuration.
    ///
    /// Fails with [`Error::Config`] when the instrumentation key is empty.
    pub fn from_telemetry_config(config: TelemetryConfig) -> HookResult<Self> {
        if config.instrumentation_key().is_empty() {
            return Err(Error::Config(
                "instrumentation key is required and missing from configuration".into(),
            ));
        }
        Ok(Self::with_client(AppInsightsClient::new(config)?))
    }
}

impl<C: TelemetryClient + 'static> AppInsightsHook<C> {
    /// Creates a synchronous hook sending through `client`, with [`DEFAULT_LEVELS`] and no
    /// field rules.
    pub fn with_client(client: C) -> Self {
        AppInsightsHook {
            client: Arc::new(client),
            levels: DEFAULT_LEVELS.to_vec(),
            pipeline: Arc::new(FieldPipeline::new()),
            dispatcher: None,
        }
    }

    /// The telemetry client entries are sent to.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Replaces the levels this hook fires for.
    pub fn set_levels(&mut self, levels: impl Into<Vec<Level>>) {
        self.levels = levels.into();
    }

    /// Switches between synchronous and fire-and-forget dispatch.
    ///
    /// In async mode [`fire`](Hook::fire) always succeeds and failures only show up in
    /// [`async_stats`](Self::async_stats). Switching back to sync mode waits for the entries
    /// already queued.
    pub fn set_async(&mut self, enabled: bool) -> HookResult<()> {
        match (enabled, self.dispatcher.is_some()) {
            (true, false) => {
                let dispatcher =
                    AsyncDispatcher::new(self.client.clone()).map_err(TransportError::from)?;
                self.dispatcher = Some(dispatcher);
                ai_debug!(name: "AppInsightsHook.AsyncEnabled");
            }
            (false, true) => {
                self.dispatcher = None;
                ai_debug!(name: "AppInsightsHook.AsyncDisabled");
            }
            _ => {}
        }
        Ok(())
    }

    /// Whether entries are dispatched asynchronously.
    pub fn is_async(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Drops the field `name` from every payload.
    pub fn add_ignore(&mut self, name: impl Into<String>) {
        Arc::make_mut(&mut self.pipeline).add_ignore(name);
    }

    /// Replaces the value of the field `name` by the result of `filter`.
    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.pipeline).add_filter(name, filter);
    }

    /// The ignore and filter rules in use.
    pub fn pipeline(&self) -> &FieldPipeline {
        &self.pipeline
    }

    /// Delivery failures of async dispatch. All zero in sync mode.
    pub fn async_stats(&self) -> DispatchStats {
        self.dispatcher
            .as_ref()
            .map(AsyncDispatcher::stats)
            .unwrap_or_default()
    }
}

impl<C: TelemetryClient + 'static> Hook for AppInsightsHook<C> {
    fn levels(&self) -> &[Level] {
        &self.levels
    }

    fn fire(&self, entry: &mut Entry) -> HookResult<()> {
        entry.ensure_message();
        match &self.dispatcher {
            Some(dispatcher) => {
                dispatcher.dispatch(entry.clone(), self.pipeline.clone());
                Ok(())
            }
            None => {
                let trace = build_trace(&self.pipeline, entry)?;
                self.client.track(trace)?;
                Ok(())
            }
        }
    }

    fn flush(&self) -> HookResult<()> {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.flush()?;
        }
        self.client.flush()?;
        Ok(())
    }
}

impl<C: TelemetryClient + 'static> fmt::Debug for AppInsightsHook<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppInsightsHook")
            .field("client", &self.client)
            .field("levels", &self.levels)
            .field("pipeline", &self.pipeline)
            .field("async", &self.is_async())
            .finish()
    }
}

/// Builds the trace telemetry for `entry`.
///
/// The properties are the normalized fields plus [`SOURCE_LEVEL_KEY`] and
/// [`SOURCE_TIMESTAMP_KEY`], which replace fields of the same name. A panic raised by a filter
/// or a field value is returned as [`Error::Build`].
pub fn build_trace(pipeline: &FieldPipeline, entry: &mut Entry) -> HookResult<TraceTelemetry> {
    let properties = panic::catch_unwind(AssertUnwindSafe(|| pipeline.normalize(entry)))
        .map_err(|payload| Error::Build(panic_message(payload.as_ref())))?;

    let mut trace = TraceTelemetry::new(entry.message.clone(), map_severity(entry.level));
    trace.timestamp = entry.time;
    trace.properties = properties;
    trace
        .properties
        .insert(SOURCE_LEVEL_KEY.to_string(), entry.level.to_string());
    trace.properties.insert(
        SOURCE_TIMESTAMP_KEY.to_string(),
        entry.time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    );
    Ok(trace)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked while formatting fields: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked while formatting fields: {}", message)
    } else {
        "panicked while formatting fields".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appinsights_channel::{InMemoryTelemetryClient, SeverityLevel, TransportResult};
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use std::time::Duration;

    #[derive(Debug)]
    struct RejectingClient;

    impl TelemetryClient for RejectingClient {
        fn track(&self, _trace: TraceTelemetry) -> TransportResult<()> {
            Err(TransportError::AlreadyShutdown)
        }
    }

    fn in_memory_hook() -> (AppInsightsHook<InMemoryTelemetryClient>, InMemoryTelemetryClient) {
        let client = InMemoryTelemetryClient::default();
        (AppInsightsHook::with_client(client.clone()), client)
    }

    #[rstest]
    #[case("", "ikey")]
    #[case("name", "")]
    #[case("", "")]
    fn new_requires_name_and_key(#[case] name: &str, #[case] key: &str) {
        let result = AppInsightsHook::new(name, Config::new(key));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn from_telemetry_config_requires_key() {
        let result = AppInsightsHook::from_telemetry_config(TelemetryConfig::new(""));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn new_applies_name_and_overrides() {
        let config = Config::new("NotEmpty")
            .with_max_batch_size(1)
            .with_max_batch_interval(Duration::from_millis(10))
            .with_endpoint_url("http://localhost:1/v2/track");
        let hook = AppInsightsHook::new("TestClient", config).unwrap();

        let client_config = hook.client().config();
        assert_eq!(client_config.role_name(), Some("TestClient"));
        assert_eq!(client_config.max_batch_size(), 1);
        assert_eq!(client_config.max_batch_interval(), Duration::from_millis(10));
        assert_eq!(client_config.endpoint_url(), "http://localhost:1/v2/track");
        assert_eq!(hook.levels(), &DEFAULT_LEVELS[..]);
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![Level::Warn])]
    #[case(vec![Level::Warn, Level::Debug])]
    #[case(vec![Level::Warn, Level::Debug, Level::Error])]
    fn set_levels_replaces_levels(#[case] levels: Vec<Level>) {
        let (mut hook, _) = in_memory_hook();
        hook.set_levels(levels.clone());
        assert_eq!(hook.levels(), levels.as_slice());
    }

    #[test]
    fn add_ignore_and_filter_accumulate() {
        let (mut hook, _) = in_memory_hook();
        for (i, name) in ["foo", "bar", "baz"].into_iter().enumerate() {
            hook.add_ignore(name);
            hook.add_filter(name, |_| Value::Null);
            assert_eq!(hook.pipeline().ignored().len(), i + 1);
            assert_eq!(hook.pipeline().filters().len(), i + 1);
        }
        assert!(hook.pipeline().ignored().contains("bar"));
    }

    #[test]
    fn build_trace_sets_severity_time_and_source_properties() {
        let time = Utc.with_ymd_and_hms(2018, 1, 25, 12, 13, 42).unwrap();
        let mut entry = Entry::new(Level::Error, "I see dead people!")
            .with_time(time)
            .with_field("tag", "fieldTag")
            .with_field("source_level", "overwritten");

        let trace = build_trace(&FieldPipeline::new(), &mut entry).unwrap();

        assert_eq!(trace.message, "I see dead people!");
        assert_eq!(trace.severity_level, SeverityLevel::Error);
        assert_eq!(trace.timestamp, time);
        assert_eq!(trace.properties["message"], "I see dead people!");
        assert_eq!(trace.properties["tag"], "fieldTag");
        assert_eq!(trace.properties[SOURCE_LEVEL_KEY], "error");
        assert_eq!(trace.properties[SOURCE_TIMESTAMP_KEY], "2018-01-25T12:13:42Z");
    }

    #[test]
    fn sync_fire_tracks_entry() {
        let (mut hook, client) = in_memory_hook();
        hook.add_ignore("price");
        hook.add_filter("secret", |_| Value::from("REDACTED"));

        let mut entry = Entry::new(Level::Warn, "entry_message")
            .with_field("name", "apple")
            .with_field("price", 105)
            .with_field("secret", "hunter2");
        hook.fire(&mut entry).unwrap();

        let traces = client.get_tracked_traces().unwrap();
        assert_eq!(traces.len(), 1);
        let properties = &traces[0].properties;
        assert_eq!(traces[0].severity_level, SeverityLevel::Warning);
        assert_eq!(properties["message"], "entry_message");
        assert_eq!(properties["name"], "apple");
        assert_eq!(properties["secret"], "REDACTED");
        assert_eq!(properties[SOURCE_LEVEL_KEY], "warning");
        assert!(!properties.contains_key("price"));
        assert!(entry.fields.contains_key("message"));
    }

    #[test]
    fn sync_fire_surfaces_transport_errors() {
        let hook = AppInsightsHook::with_client(RejectingClient);
        let result = hook.fire(&mut Entry::new(Level::Error, "lost"));
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::AlreadyShutdown))
        ));
    }

    #[test]
    fn sync_fire_reports_panicking_filter_as_build_error() {
        let (mut hook, client) = in_memory_hook();
        hook.add_filter("bad", |_| panic!("filter exploded"));

        let mut entry = Entry::new(Level::Error, "oops").with_field("bad", 1);
        match hook.fire(&mut entry) {
            Err(Error::Build(message)) => assert!(message.contains("filter exploded")),
            other => panic!("unexpected fire result: {:?}", other),
        }
        assert!(client.get_tracked_traces().unwrap().is_empty());
    }

    #[test]
    fn async_fire_succeeds_and_delivers_on_flush() {
        let (mut hook, client) = in_memory_hook();
        hook.set_async(true).unwrap();
        assert!(hook.is_async());

        for i in 0..5 {
            let mut entry = Entry::new(Level::Info, format!("async {i}"));
            assert!(hook.fire(&mut entry).is_ok());
            assert!(entry.fields.contains_key("message"));
        }
        hook.flush().unwrap();

        assert_eq!(client.get_tracked_traces().unwrap().len(), 5);
        assert_eq!(hook.async_stats(), DispatchStats::default());
    }

    #[test]
    fn async_fire_swallows_failures() {
        let mut hook = AppInsightsHook::with_client(RejectingClient);
        hook.set_async(true).unwrap();
        hook.add_filter("bad", |_| panic!("filter exploded"));

        assert!(hook.fire(&mut Entry::new(Level::Error, "lost")).is_ok());
        assert!(hook
            .fire(&mut Entry::new(Level::Error, "lost").with_field("bad", 1))
            .is_ok());
        hook.flush().unwrap();

        assert_eq!(hook.async_stats().failed, 2);
    }

    #[test]
    fn async_entries_use_rules_at_fire_time() {
        let (mut hook, client) = in_memory_hook();
        hook.set_async(true).unwrap();

        hook.fire(&mut Entry::new(Level::Info, "first").with_field("secret", "a"))
            .unwrap();
        hook.add_filter("secret", |_| Value::from("REDACTED"));
        hook.fire(&mut Entry::new(Level::Info, "second").with_field("secret", "b"))
            .unwrap();
        hook.flush().unwrap();

        let mut traces = client.get_tracked_traces().unwrap();
        traces.sort_by(|a, b| a.message.cmp(&b.message));
        assert_eq!(traces[0].properties["secret"], "a");
        assert_eq!(traces[1].properties["secret"], "REDACTED");
    }

    #[test]
    fn disabling_async_drains_queue() {
        let (mut hook, client) = in_memory_hook();
        hook.set_async(true).unwrap();
        hook.fire(&mut Entry::new(Level::Info, "queued")).unwrap();

        hook.set_async(false).unwrap();

        assert!(!hook.is_async());
        assert_eq!(client.get_tracked_traces().unwrap().len(), 1);
    }
}
