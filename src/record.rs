use crate::entry::Entry;
use crate::value::Fields;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Severity of an entry. `Info` is the zero value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Info,
    Error,
    Debug,
    Trace,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Error => "ERROR",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owned, serializable snapshot of a dispatched [`Entry`].
///
/// Used by the JSON formatter, and handy for outputs that need to keep
/// an entry around after the call returns.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub modules: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fields: Fields,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<String>,
}

impl From<&Entry> for Record {
    fn from(entry: &Entry) -> Self {
        Record {
            timestamp: entry.time(),
            level: entry.level(),
            modules: entry.modules().to_vec(),
            message: entry.message().map(str::to_string),
            error: entry.err().map(|e| e.to_string()),
            fields: entry.data().clone(),
            traces: entry.traces().to_vec(),
        }
    }
}
