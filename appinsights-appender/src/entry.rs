use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Field under which the entry message is published.
pub const MESSAGE_KEY: &str = "message";

/// Severity of a log entry, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Finer-grained than `Debug`.
    Trace,
    /// Debugging information.
    Debug,
    /// General operational entries.
    Info,
    /// Non-critical entries that deserve attention.
    Warn,
    /// Entries for failures that should be looked at.
    Error,
    /// The application is about to terminate.
    Fatal,
    /// The highest severity, logged right before panicking.
    Panic,
}

impl Level {
    /// Every level, from least to most severe.
    pub const ALL: [Level; 7] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
        Level::Panic,
    ];

    /// Lowercase text form, as published in `source_level`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured log record handed to a [`Hook`](crate::Hook).
#[derive(Clone, Debug)]
pub struct Entry {
    /// Severity of the record.
    pub level: Level,
    /// Formatted message.
    pub message: String,
    /// Time the record was created.
    pub time: DateTime<Utc>,
    /// Additional named fields.
    pub fields: HashMap<String, Value>,
}

impl Entry {
    /// Creates an entry stamped with the current time and no fields.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Entry {
            level,
            message: message.into(),
            time: Utc::now(),
            fields: HashMap::new(),
        }
    }

    /// Adds or replaces a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Overrides the entry time.
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Inserts the entry message under [`MESSAGE_KEY`] unless a field of that name exists.
    pub fn ensure_message(&mut self) {
        if !self.fields.contains_key(MESSAGE_KEY) {
            self.fields
                .insert(MESSAGE_KEY.to_string(), Value::from(self.message.clone()));
        }
    }
}
