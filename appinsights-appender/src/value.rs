//! Field values carried by an [`Entry`](crate::Entry).
//!
//! Primitives map to dedicated [`Value`] variants. Anything else is wrapped into
//! [`Value::Any`] together with the capabilities the field pipeline inspects: a structured
//! (serde) form, an error, or a human-readable text form.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Object-safe access to a value's JSON form.
pub trait ToJson {
    /// Serializes the value into a JSON tree.
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T: Serialize + ?Sized> ToJson for T {
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// A field value of arbitrary type.
///
/// Every probe defaults to `None`. The field pipeline checks them in declaration order and the
/// first one present decides how the value is normalized.
pub trait FieldValue: fmt::Debug + Send + Sync {
    /// The value's structured form, if it has one.
    fn as_structured(&self) -> Option<&dyn ToJson> {
        None
    }

    /// The value as an error, if it represents a failure.
    fn as_error(&self) -> Option<&(dyn Error + 'static)> {
        None
    }

    /// A human-readable text form, if the value has one.
    fn to_text(&self) -> Option<String> {
        None
    }
}

/// The value of an entry field.
#[derive(Clone, Debug)]
pub enum Value {
    /// No value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    I64(i64),
    /// An unsigned integer.
    U64(u64),
    /// A floating point number.
    F64(f64),
    /// A string.
    String(Cow<'static, str>),
    /// A point in time. Rendered as RFC 3339, the same as its JSON form.
    Time(DateTime<Utc>),
    /// Any other value.
    Any(Arc<dyn FieldValue>),
}

impl Value {
    /// Wraps a serializable value.
    pub fn serde<T>(value: T) -> Self
    where
        T: Serialize + fmt::Debug + Send + Sync + 'static,
    {
        Value::Any(Arc::new(Structured(value)))
    }

    /// Wraps an error.
    pub fn error<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Value::Any(Arc::new(ErrorValue(error)))
    }

    /// Wraps a value with a human-readable text form.
    pub fn display<T>(value: T) -> Self
    where
        T: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Value::Any(Arc::new(Text(value)))
    }

    /// Wraps a value that only has a debug representation.
    pub fn debug<T>(value: T) -> Self
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        Value::Any(Arc::new(Opaque(value)))
    }

    /// Wraps a custom [`FieldValue`].
    pub fn any<T: FieldValue + 'static>(value: T) -> Self {
        Value::Any(Arc::new(value))
    }
}

struct Structured<T>(T);

impl<T: fmt::Debug> fmt::Debug for Structured<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> FieldValue for Structured<T>
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn as_structured(&self) -> Option<&dyn ToJson> {
        Some(&self.0)
    }
}

struct ErrorValue<E>(E);

impl<E: fmt::Debug> fmt::Debug for ErrorValue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<E> FieldValue for ErrorValue<E>
where
    E: Error + Send + Sync + 'static,
{
    fn as_error(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

struct Text<T>(T);

impl<T: fmt::Debug> fmt::Debug for Text<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> FieldValue for Text<T>
where
    T: fmt::Display + fmt::Debug + Send + Sync,
{
    fn to_text(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

struct Opaque<T>(T);

impl<T: fmt::Debug> fmt::Debug for Opaque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: fmt::Debug + Send + Sync> FieldValue for Opaque<T> {}

/// An error captured by message, for errors only available by reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedError {
    message: String,
}

impl CapturedError {
    /// Captures the message of `error`.
    pub fn new(error: &(dyn Error + 'static)) -> Self {
        CapturedError {
            message: error.to_string(),
        }
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for CapturedError {}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($source:ty),+) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Value::$variant(<$target>::from(value))
                }
            }
        )+
    };
}

impl_from_int!(I64, i64, i8, i16, i32, i64);
impl_from_int!(U64, u64, u8, u16, u32, u64);
impl_from_int!(F64, f64, f32, f64);

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::U64(value as u64)
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::String(Cow::Borrowed(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Cow::Owned(value))
    }
}

impl From<Cow<'static, str>> for Value {
    fn from(value: Cow<'static, str>) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Time(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn primitives_convert_to_their_variants() {
        assert!(matches!(Value::from(true), Value::Bool(true)));
        assert!(matches!(Value::from(-3_i32), Value::I64(-3)));
        assert!(matches!(Value::from(105_u16), Value::U64(105)));
        assert!(matches!(Value::from(12_usize), Value::U64(12)));
        assert!(matches!(Value::from(None::<i64>), Value::Null));
        assert!(matches!(Value::from("red"), Value::String(Cow::Borrowed("red"))));
    }

    #[test]
    fn wrappers_expose_one_capability_each() {
        let structured = Value::serde(vec![1, 2]);
        let error = Value::error(io::Error::other("boom"));
        let text = Value::display(std::net::Ipv4Addr::LOCALHOST);
        let opaque = Value::debug(Some(5));

        let probe = |value: &Value| match value {
            Value::Any(any) => (
                any.as_structured().is_some(),
                any.as_error().is_some(),
                any.to_text().is_some(),
            ),
            other => panic!("expected Any, got {:?}", other),
        };

        assert_eq!(probe(&structured), (true, false, false));
        assert_eq!(probe(&error), (false, true, false));
        assert_eq!(probe(&text), (false, false, true));
        assert_eq!(probe(&opaque), (false, false, false));
    }

    #[test]
    fn captured_error_keeps_the_message() {
        let source = io::Error::new(io::ErrorKind::NotFound, "missing file");
        let captured = CapturedError::new(&source);
        assert_eq!(captured.to_string(), "missing file");
    }
}
