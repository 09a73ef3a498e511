use crate::entry::{Entry, Level, MESSAGE_KEY};
use crate::hook::Hook;
use crate::value::{CapturedError, Value};
use appinsights_channel::ai_warn;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Targets of this workspace's own diagnostics. Forwarding them would feed the pipeline with
/// its own output.
const SKIPPED_CRATES: [&str; 4] = [
    "appinsights-channel",
    "appinsights-appender",
    "appinsights_channel",
    "appinsights_appender",
];

/// Whether `target` is one of [`SKIPPED_CRATES`] or a module path inside one.
fn is_own_target(target: &str) -> bool {
    SKIPPED_CRATES.iter().any(|krate| {
        target
            .strip_prefix(krate)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// A [`Layer`] forwarding `tracing` events to a [`Hook`].
///
/// The `message` field of an event becomes the entry message. Every other field becomes an
/// entry field.
///
/// ```no_run
/// use appinsights_appender::{AppInsightsHook, AppInsightsTracingBridge, Config};
/// use tracing_subscriber::prelude::*;
///
/// let hook = AppInsightsHook::new("my_service", Config::new("00000000-0000-0000-0000-000000000000")).unwrap();
/// tracing_subscriber::registry()
///     .with(AppInsightsTracingBridge::new(hook))
///     .init();
///
/// tracing::error!(order_id = 42, "payment declined");
/// ```
#[derive(Debug)]
pub struct AppInsightsTracingBridge<H: Hook> {
    hook: H,
}

impl<H: Hook> AppInsightsTracingBridge<H> {
    /// Wraps `hook`.
    pub fn new(hook: H) -> Self {
        AppInsightsTracingBridge { hook }
    }

    /// The wrapped hook.
    pub fn hook(&self) -> &H {
        &self.hook
    }
}

impl<S, H> Layer<S> for AppInsightsTracingBridge<H>
where
    S: Subscriber,
    H: Hook + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if is_own_target(meta.target()) {
            return;
        }

        let level = map_tracing_level(meta.level());
        if !self.hook.levels().contains(&level) {
            return;
        }

        let mut entry = Entry::new(level, String::new());
        event.record(&mut EventVisitor { entry: &mut entry });

        if let Err(err) = self.hook.fire(&mut entry) {
            ai_warn!(name: "TracingBridge.FireFailed", error = format!("{}", err));
        }
    }
}

const fn map_tracing_level(level: &tracing_core::Level) -> Level {
    match *level {
        tracing_core::Level::TRACE => Level::Trace,
        tracing_core::Level::DEBUG => Level::Debug,
        tracing_core::Level::INFO => Level::Info,
        tracing_core::Level::WARN => Level::Warn,
        tracing_core::Level::ERROR => Level::Error,
    }
}

struct EventVisitor<'a> {
    entry: &'a mut Entry,
}

impl EventVisitor<'_> {
    fn insert(&mut self, field: &Field, value: Value) {
        self.entry.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for EventVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::F64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::U64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == MESSAGE_KEY {
            self.entry.message = value.to_string();
        } else {
            self.insert(field, Value::from(value.to_string()));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::error(CapturedError::new(value)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == MESSAGE_KEY {
            self.entry.message = format!("{value:?}");
        } else {
            self.insert(field, Value::from(format!("{value:?}")));
        }
    }
}
