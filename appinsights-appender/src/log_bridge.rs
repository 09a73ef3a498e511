use crate::entry::{Entry, Level};
use crate::hook::Hook;
use crate::value::{CapturedError, Value};
use appinsights_channel::ai_warn;
use log::kv::{self, VisitSource};
use log::{Metadata, Record};
use std::collections::HashMap;

/// A [`log::Log`] implementation forwarding records to a [`Hook`].
///
/// Records are forwarded when their level is one of the hook's levels. Structured key-values
/// become entry fields.
///
/// ```no_run
/// use appinsights_appender::{AppInsightsHook, AppInsightsLogBridge, Config};
///
/// let hook = AppInsightsHook::new("my_service", Config::new("00000000-0000-0000-0000-000000000000")).unwrap();
/// log::set_boxed_logger(Box::new(AppInsightsLogBridge::new(hook))).unwrap();
/// log::set_max_level(log::LevelFilter::Info);
///
/// log::warn!(attempt = 3; "upstream timed out");
/// log::logger().flush();
/// ```
#[derive(Debug)]
pub struct AppInsightsLogBridge<H: Hook> {
    hook: H,
}

impl<H: Hook> AppInsightsLogBridge<H> {
    /// Wraps `hook`.
    pub fn new(hook: H) -> Self {
        AppInsightsLogBridge { hook }
    }

    /// The wrapped hook.
    pub fn hook(&self) -> &H {
        &self.hook
    }
}

impl<H: Hook> log::Log for AppInsightsLogBridge<H> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.hook.levels().contains(&map_log_level(metadata.level()))
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut entry = Entry::new(map_log_level(record.level()), record.args().to_string());
        let mut visitor = KeyValueVisitor {
            fields: &mut entry.fields,
        };
        let _ = record.key_values().visit(&mut visitor);

        if let Err(err) = self.hook.fire(&mut entry) {
            ai_warn!(name: "LogBridge.FireFailed", error = format!("{}", err));
        }
    }

    fn flush(&self) {
        if let Err(err) = self.hook.flush() {
            ai_warn!(name: "LogBridge.FlushFailed", error = format!("{}", err));
        }
    }
}

const fn map_log_level(level: log::Level) -> Level {
    match level {
        log::Level::Error => Level::Error,
        log::Level::Warn => Level::Warn,
        log::Level::Info => Level::Info,
        log::Level::Debug => Level::Debug,
        log::Level::Trace => Level::Trace,
    }
}

struct KeyValueVisitor<'a> {
    fields: &'a mut HashMap<String, Value>,
}

impl<'kvs> VisitSource<'kvs> for KeyValueVisitor<'_> {
    fn visit_pair(&mut self, key: kv::Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        self.fields
            .insert(key.as_str().to_string(), convert_value(&value));
        Ok(())
    }
}

fn convert_value(value: &kv::Value<'_>) -> Value {
    if let Some(error) = value.to_borrowed_error() {
        Value::error(CapturedError::new(error))
    } else if let Some(value) = value.to_i64() {
        Value::I64(value)
    } else if let Some(value) = value.to_u64() {
        Value::U64(value)
    } else if let Some(value) = value.to_bool() {
        Value::Bool(value)
    } else if let Some(value) = value.to_f64() {
        Value::F64(value)
    } else {
        Value::from(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::AppInsightsHook;
    use appinsights_channel::InMemoryTelemetryClient;
    use log::Log;
    use std::io;

    fn bridge() -> (
        AppInsightsLogBridge<AppInsightsHook<InMemoryTelemetryClient>>,
        InMemoryTelemetryClient,
    ) {
        let client = InMemoryTelemetryClient::default();
        let bridge = AppInsightsLogBridge::new(AppInsightsHook::with_client(client.clone()));
        (bridge, client)
    }

    #[test]
    fn enabled_follows_hook_levels() {
        let (bridge, _) = bridge();
        let metadata = |level| Metadata::builder().level(level).build();

        assert!(bridge.enabled(&metadata(log::Level::Error)));
        assert!(bridge.enabled(&metadata(log::Level::Info)));
        assert!(!bridge.enabled(&metadata(log::Level::Debug)));
    }

    #[test]
    fn records_become_entries_with_fields() {
        let (bridge, client) = bridge();
        let failure = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let kvs = vec![
            ("name", kv::Value::from("apple")),
            ("price", kv::Value::from(105)),
            ("ripe", kv::Value::from(true)),
            ("error", kv::Value::from_dyn_error(&failure)),
        ];

        bridge.log(
            &Record::builder()
                .level(log::Level::Error)
                .args(format_args!("entry_message"))
                .key_values(&kvs)
                .build(),
        );

        let traces = client.get_tracked_traces().unwrap();
        assert_eq!(traces.len(), 1);
        let properties = &traces[0].properties;
        assert_eq!(traces[0].message, "entry_message");
        assert_eq!(properties["message"], "entry_message");
        assert_eq!(properties["name"], "apple");
        assert_eq!(properties["price"], "105");
        assert_eq!(properties["ripe"], "true");
        assert_eq!(properties["error"], "connection reset");
        assert_eq!(properties["source_level"], "error");
    }

    #[test]
    fn disabled_records_are_skipped() {
        let (bridge, client) = bridge();

        bridge.log(
            &Record::builder()
                .level(log::Level::Debug)
                .args(format_args!("too chatty"))
                .build(),
        );

        assert!(client.get_tracked_traces().unwrap().is_empty());
    }
}
