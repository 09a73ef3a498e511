//! # Field pipeline
//!
//! Turns the fields of an [`Entry`] into the string properties of a telemetry item.
//!
//! For every field, in no particular order:
//! 1. fields in the ignore set are dropped;
//! 2. fields with a registered [`Filter`] are replaced by the filter's result, as is;
//! 3. every other field goes through [`format_value`].
//!
//! The resulting value is converted to text with [`render`].
use crate::entry::Entry;
use crate::value::Value;
use appinsights_channel::ai_warn;
use chrono::SecondsFormat;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A per-field transform replacing the default normalization.
pub type Filter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Ignore and filter rules applied to entry fields.
#[derive(Clone, Default)]
pub struct FieldPipeline {
    ignore: HashSet<String>,
    filters: HashMap<String, Filter>,
}

impl FieldPipeline {
    /// Creates a pipeline without any rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the field `name` from every payload.
    pub fn add_ignore(&mut self, name: impl Into<String>) {
        self.ignore.insert(name.into());
    }

    /// Replaces the value of the field `name` by the result of `filter`.
    ///
    /// Registering a filter for a name again replaces the previous one.
    pub fn add_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    /// Names of ignored fields.
    pub fn ignored(&self) -> &HashSet<String> {
        &self.ignore
    }

    /// Registered filters by field name.
    pub fn filters(&self) -> &HashMap<String, Filter> {
        &self.filters
    }

    /// Applies the rules to `entry`. See [`normalize`].
    pub fn normalize(&self, entry: &mut Entry) -> HashMap<String, String> {
        normalize(entry, &self.ignore, &self.filters)
    }
}

impl fmt::Debug for FieldPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<&String> = self.filters.keys().collect();
        filters.sort();
        f.debug_struct("FieldPipeline")
            .field("ignore", &self.ignore)
            .field("filters", &filters)
            .finish()
    }
}

/// Produces the string properties of `entry`.
///
/// The entry message is added under `"message"` first unless the entry already has such a
/// field. The output holds one property per field that is not ignored. This never fails:
/// values of unsupported types are rendered through their `Debug` form.
pub fn normalize(
    entry: &mut Entry,
    ignore: &HashSet<String>,
    filters: &HashMap<String, Filter>,
) -> HashMap<String, String> {
    entry.ensure_message();

    let mut properties = HashMap::with_capacity(entry.fields.len());
    for (name, value) in &entry.fields {
        if ignore.contains(name) {
            continue;
        }
        let candidate = match filters.get(name) {
            Some(filter) => filter(value),
            None => format_value(value),
        };
        properties.insert(name.clone(), render(&candidate));
    }
    properties
}

/// The default normalization of a field value.
///
/// The first matching capability wins:
/// 1. structured values are returned unchanged;
/// 2. errors become their message;
/// 3. values with a text form become that text;
/// 4. anything else is returned unchanged.
pub fn format_value(value: &Value) -> Value {
    let Value::Any(any) = value else {
        return value.clone();
    };

    if any.as_structured().is_some() {
        value.clone()
    } else if let Some(error) = any.as_error() {
        Value::from(error.to_string())
    } else if let Some(text) = any.to_text() {
        Value::from(text)
    } else {
        value.clone()
    }
}

/// Converts a value to the text published as a property.
///
/// Structured values are written as compact JSON, except that a top-level JSON string is
/// written without quotes.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(value) => value.to_string(),
        Value::I64(value) => value.to_string(),
        Value::U64(value) => value.to_string(),
        Value::F64(value) => value.to_string(),
        Value::String(value) => value.to_string(),
        Value::Time(time) => time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        Value::Any(any) => {
            if let Some(structured) = any.as_structured() {
                match structured.to_json() {
                    Ok(serde_json::Value::String(text)) => text,
                    Ok(json) => json.to_string(),
                    Err(err) => {
                        ai_warn!(
                            name: "FieldPipeline.SerializationFailed",
                            error = format!("{}", err),
                            value = format!("{:?}", any),
                        );
                        format!("{:?}", any)
                    }
                }
            } else if let Some(error) = any.as_error() {
                error.to_string()
            } else if let Some(text) = any.to_text() {
                text
            } else {
                format!("{:?}", any)
            }
        }
    }
}
