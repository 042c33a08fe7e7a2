use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Structured fields attached to an [`Entry`](crate::Entry).
///
/// A `BTreeMap` keeps keys sorted, so rendering the same set of fields
/// always produces the same output.
pub type Fields = BTreeMap<String, Value>;

/// A single field value.
///
/// The set of variants is closed so the formatter can handle every case
/// without runtime type inspection. Anything that isn't one of the
/// primitive kinds ends up in [`Value::Other`] as its string form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    /// Emitted verbatim, without quoting or escaping.
    Raw(String),
    /// Generic stringification of some other value.
    Other(String),
}

impl Value {
    /// A value printed as-is, e.g. pre-rendered JSON.
    pub fn raw(s: impl Into<String>) -> Self {
        Value::Raw(s.into())
    }

    /// Store the `Display` form of `v`.
    pub fn display(v: impl fmt::Display) -> Self {
        Value::Other(v.to_string())
    }

    /// Store the `Debug` form of `v`.
    pub fn debug(v: impl fmt::Debug) -> Self {
        Value::Other(format!("{:?}", v))
    }

    /// Render the value the way it appears inside a `{k=v}` field list.
    ///
    /// Numbers and booleans are unquoted, strings and bytes are quoted and
    /// escaped, raw and other values are written verbatim. Bytes that
    /// aren't valid UTF-8 are written as `\xNN` escapes.
    pub fn render(&self, out: &mut String) {
        use fmt::Write;
        // Writing into a String never fails.
        let _ = match self {
            Value::Int(n) => write!(out, "{}", n),
            Value::Uint(n) => write!(out, "{}", n),
            Value::Float(f) => write!(out, "{}", f),
            Value::Bool(b) => write!(out, "{}", b),
            Value::Str(s) => write!(out, "{:?}", s),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(out, "{:?}", s),
                Err(_) => write!(out, "\"{}\"", b.escape_ascii()),
            },
            Value::Raw(s) | Value::Other(s) => write!(out, "{}", s),
        };
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::new();
        self.render(&mut s);
        f.write_str(&s)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Uint(n) => serializer.serialize_u64(*n),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(f) => serializer.serialize_str(&f.to_string()),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Str(s) | Value::Raw(s) | Value::Other(s) => serializer.serialize_str(s),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => serializer.serialize_str(s),
                Err(_) => serializer.serialize_str(&b.escape_ascii().to_string()),
            },
        }
    }
}

macro_rules! from_int {
    ($variant:ident, $target:ty: $($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v as $target)
            }
        })*
    };
}

from_int!(Int, i64: i8, i16, i32, i64, isize);
from_int!(Uint, u64: u8, u16, u32, u64, usize);
from_int!(Float, f64: f32, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            other => Value::Other(other.to_string()),
        }
    }
}

/// Build a [`Fields`] map inline.
///
/// ```
/// let f = chainlog::fields! { "user" => "alice", "attempts" => 3 };
/// assert_eq!(f.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => { $crate::Fields::new() };
    ($($k:expr => $v:expr),+ $(,)?) => {{
        let mut f = $crate::Fields::new();
        $(f.insert(::std::string::String::from($k), $crate::Value::from($v));)+
        f
    }};
}
