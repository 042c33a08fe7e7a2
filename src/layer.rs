use crate::config::Config;
use crate::entry::Entry;
use crate::record::Level;
use crate::value::{Fields, Value};
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns `tracing` events into entries.
///
/// The event target becomes the module, the `message` field the message
/// and all other fields become entry fields. `ERROR` events are logged as
/// errors, `WARN` and `INFO` printed, and `DEBUG`/`TRACE` events only
/// appear when their target is in debug mode.
#[derive(Clone, Default)]
pub struct EntryLayer {
    config: Option<Arc<Config>>,
}

impl EntryLayer {
    /// A layer dispatching through the process-wide configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Arc<Config>) -> Self {
        EntryLayer { config: Some(config) }
    }

    fn root(&self) -> Entry {
        match &self.config {
            Some(c) => Entry::with_config(Arc::clone(c)),
            None => Entry::new(),
        }
    }
}

impl<S> Layer<S> for EntryLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let meta = event.metadata();
        let level = match *meta.level() {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN | tracing::Level::INFO => Level::Info,
            tracing::Level::DEBUG => Level::Debug,
            _ => Level::Trace,
        };

        let mut entry = self.root().module(meta.target());
        if !fields.is_empty() {
            entry = entry.fields(fields);
        }
        entry.emit(level, message.unwrap_or_default());
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Fields,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::debug(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{MemoryOutput, Output};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn with_layer(debug: &str, f: impl FnOnce()) -> String {
        let out = Arc::new(MemoryOutput::new());
        let config = Config::new()
            .with_outputs(vec![out.clone() as Arc<dyn Output>])
            .with_fmt_time("")
            .unwrap()
            .with_capture_stack(false)
            .with_debug(debug)
            .shared();
        let subscriber = Registry::default().with(EntryLayer::with_config(config));
        tracing::subscriber::with_default(subscriber, f);
        out.contents()
    }

    #[test]
    fn events_become_entries() {
        let out = with_layer("", || {
            tracing::info!(target: "auth", user_id = 42, reason = "invalid password", "login {}", "failed");
            tracing::error!(target: "auth", "locked out");
        });
        assert_eq!(
            out,
            "auth: INFO: login failed {reason=\"invalid password\" user_id=42}\nauth: ERROR: locked out\n"
        );
    }

    #[test]
    fn debug_events_are_gated() {
        let quiet = with_layer("", || {
            tracing::debug!(target: "db", "query");
            tracing::trace!(target: "db", "row");
        });
        assert_eq!(quiet, "");

        let loud = with_layer("db", || {
            tracing::debug!(target: "db", "query");
            tracing::trace!(target: "db", "row");
        });
        assert_eq!(loud, "db: DEBUG: query\ndb: TRACE: row\n");
    }
}
