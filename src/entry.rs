use crate::config::{self, Config};
use crate::error::{LogError, MessageError};
use crate::record::Level;
use crate::stack::Stack;
use crate::value::{Fields, Value};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// A log entry under construction.
///
/// Entries are values: every chaining method borrows `self` and returns a
/// new `Entry`, leaving the receiver as it was. Containers are shared
/// between the two and only copied when one side changes them, so a base
/// entry can be kept around and reused freely, including across threads.
///
/// ```
/// use chainlog::fields;
///
/// let log = chainlog::module("http").fields(fields! { "peer" => "10.0.0.1" });
/// log.print("accepted connection");
/// log.debugf(format_args!("{} bytes buffered", 512)); // only if "http" is debugged
/// ```
#[derive(Clone, Default)]
pub struct Entry {
    config: Option<Arc<Config>>,
    message: Option<String>,
    error: Option<LogError>,
    level: Level,
    modules: Arc<Vec<String>>,
    fields: Arc<Fields>,
    debug_modules: Arc<Vec<String>>,
    traces: Arc<Vec<String>>,
    since: Option<Instant>,
    since_log: Arc<Fields>,
    time: Option<DateTime<Utc>>,
    context: Option<Arc<dyn Any + Send + Sync>>,
}

impl Entry {
    /// An empty entry using the process-wide configuration.
    pub fn new() -> Self {
        Entry {
            since: Some(config::global().tick()),
            ..Default::default()
        }
    }

    /// An empty entry bound to `config` instead of the process-wide one.
    pub fn with_config(config: Arc<Config>) -> Self {
        Entry {
            since: Some(config.tick()),
            config: Some(config),
            ..Default::default()
        }
    }

    /// The configuration this entry dispatches through.
    pub fn config(&self) -> Arc<Config> {
        match &self.config {
            Some(c) => Arc::clone(c),
            None => config::global(),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn err(&self) -> Option<&LogError> {
        self.error.as_ref()
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn data(&self) -> &Fields {
        &self.fields
    }

    pub fn debug_modules(&self) -> &[String] {
        &self.debug_modules
    }

    /// Pre-formatted trace lines buffered on this chain.
    pub fn traces(&self) -> &[String] {
        &self.traces
    }

    /// Timings recorded with [`Entry::since`].
    pub fn since_log(&self) -> &Fields {
        &self.since_log
    }

    /// When the entry was dispatched; the current time if it hasn't been.
    pub fn time(&self) -> DateTime<Utc> {
        self.time.unwrap_or_else(|| self.config().now())
    }

    /// The value attached with [`Entry::context`], if it is a `T`.
    pub fn ctx<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|c| c.downcast_ref())
    }

    /// Add a module to the module path and restart the `since` timer.
    pub fn module(&self, name: impl Into<String>) -> Entry {
        let mut e = self.clone();
        Arc::make_mut(&mut e.modules).push(name.into());
        e.since = Some(self.config().tick());
        e
    }

    /// Merge `fields` into this entry; later keys overwrite earlier ones.
    pub fn fields(&self, fields: Fields) -> Entry {
        let mut e = self.clone();
        if e.fields.is_empty() {
            e.fields = Arc::new(fields);
        } else {
            Arc::make_mut(&mut e.fields).extend(fields);
        }
        e
    }

    pub fn field(&self, key: impl Into<String>, value: impl Into<Value>) -> Entry {
        let mut e = self.clone();
        Arc::make_mut(&mut e.fields).insert(key.into(), value.into());
        e
    }

    /// Enable debug output for `modules`, on this chain only.
    ///
    /// Repeated calls append to the list.
    pub fn set_debug<I, S>(&self, modules: I) -> Entry
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut e = self.clone();
        Arc::make_mut(&mut e.debug_modules).extend(modules.into_iter().map(Into::into));
        e
    }

    /// Attach an arbitrary value for custom outputs; the crate itself
    /// ignores it.
    pub fn context<T: Any + Send + Sync>(&self, ctx: T) -> Entry {
        let mut e = self.clone();
        e.context = Some(Arc::new(ctx));
        e
    }

    /// Record the caller's location as a `location` field.
    #[track_caller]
    pub fn fields_location(&self) -> Entry {
        let loc = Location::caller();
        let file = Path::new(loc.file())
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| loc.file().to_string());
        self.field("location", format!("{}:{}", file, loc.line()))
    }

    /// Whether debug and trace output is enabled for this entry.
    ///
    /// True when any module in the path is listed in the configuration's
    /// debug list or this chain's own list, or when either list contains
    /// `"all"`. An entry without modules is never in debug mode.
    pub fn has_debug(&self) -> bool {
        self.has_debug_in(&self.config())
    }

    fn has_debug_in(&self, config: &Config) -> bool {
        let listed = |d: &String| d == "all" || self.modules.contains(d);
        !self.modules.is_empty()
            && (config.debug.iter().any(listed) || self.debug_modules.iter().any(listed))
    }

    /// Print an informational message.
    pub fn print(&self, msg: impl fmt::Display) {
        self.dispatch(Level::Info, Some(msg.to_string()), None);
    }

    pub fn printf(&self, args: fmt::Arguments<'_>) {
        self.dispatch(Level::Info, Some(fmt::format(args)), None);
    }

    /// Log an error.
    pub fn error<E>(&self, err: E)
    where
        E: StdError + Send + Sync + 'static,
    {
        self.error_with(LogError::new(err));
    }

    pub fn errorf(&self, args: fmt::Arguments<'_>) {
        self.error_with(LogError::new(MessageError(fmt::format(args))));
    }

    /// Log an already-wrapped error, keeping any stack it carries.
    pub fn error_with(&self, err: LogError) {
        let config = self.config();
        let err = if config.capture_stack && !err.has_stack() {
            err.with_stack(Stack::capture())
        } else {
            err
        };
        self.dispatch_in(&config, Level::Error, None, Some(err));
    }

    /// Print a debug message if this entry is in debug mode; a no-op
    /// otherwise.
    pub fn debug(&self, msg: impl fmt::Display) {
        let config = self.config();
        if self.has_debug_in(&config) {
            self.dispatch_in(&config, Level::Debug, Some(msg.to_string()), None);
        }
    }

    /// Like [`Entry::debug`]; the arguments are only formatted when the
    /// message is printed.
    pub fn debugf(&self, args: fmt::Arguments<'_>) {
        let config = self.config();
        if self.has_debug_in(&config) {
            self.dispatch_in(&config, Level::Debug, Some(fmt::format(args)), None);
        }
    }

    /// Add a trace message.
    ///
    /// In debug mode it is printed right away. Otherwise it is formatted
    /// and buffered on the returned entry, and printed just before the
    /// error line if the chain later logs an error.
    pub fn trace(&self, msg: impl fmt::Display) -> Entry {
        self.trace_message(msg.to_string())
    }

    pub fn tracef(&self, args: fmt::Arguments<'_>) -> Entry {
        self.trace_message(fmt::format(args))
    }

    fn trace_message(&self, msg: String) -> Entry {
        let config = self.config();
        let mut e = self.clone();
        e.level = Level::Trace;
        e.message = Some(msg);
        e.error = None;
        e.time = Some(config.now());

        if self.has_debug_in(&config) {
            config.run_outputs(&e);
            return self.clone();
        }

        let line = config.format(&e);
        let mut out = self.clone();
        Arc::make_mut(&mut out.traces).push(line);
        out
    }

    /// Drop all buffered trace messages.
    pub fn reset_trace(&self) -> Entry {
        let mut e = self.clone();
        e.traces = Arc::default();
        e
    }

    /// Record the time since the last `since` or `module` call under
    /// `label`.
    ///
    /// Intervals come from the configuration's monotonic ticker, truncated
    /// to whole milliseconds. In debug mode the timing is also written to the configuration's
    /// `since_output`. Recorded timings can be added as fields with
    /// [`Entry::fields_since`].
    pub fn since(&self, label: &str) -> Entry {
        let config = self.config();
        let now = config.tick();
        let ms = self.since.map_or(0, |anchor| now.duration_since(anchor).as_millis());

        let mut e = self.clone();
        Arc::make_mut(&mut e.since_log).insert(label.to_string(), Value::Str(format!("{}ms", ms)));
        if self.has_debug_in(&config) {
            (config.since_output)(&format!(
                "  {:<16} {:>5}ms  {}\n",
                self.modules.join(":"),
                ms,
                label
            ));
        }
        e.since = Some(now);
        e
    }

    /// Add the timings recorded with [`Entry::since`] as fields.
    pub fn fields_since(&self) -> Entry {
        self.fields((*self.since_log).clone())
    }

    fn dispatch(&self, level: Level, message: Option<String>, error: Option<LogError>) {
        self.dispatch_in(&self.config(), level, message, error);
    }

    fn dispatch_in(
        &self,
        config: &Config,
        level: Level,
        message: Option<String>,
        error: Option<LogError>,
    ) {
        let mut e = self.clone();
        e.level = level;
        e.message = message;
        e.error = error;
        e.time = Some(config.now());
        config.run_outputs(&e);
    }

    /// Dispatch with an explicit level, still honoring the debug gate for
    /// debug and trace levels. Used by the `tracing` bridge.
    pub(crate) fn emit(&self, level: Level, message: String) {
        let config = self.config();
        match level {
            Level::Debug | Level::Trace if !self.has_debug_in(&config) => {}
            Level::Error => self.error_with(LogError::new(MessageError(message))),
            _ => self.dispatch_in(&config, level, Some(message), None),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("level", &self.level)
            .field("modules", &self.modules)
            .field("message", &self.message)
            .field("error", &self.error)
            .field("fields", &self.fields)
            .field("debug_modules", &self.debug_modules)
            .field("traces", &self.traces.len())
            .field("since_log", &self.since_log)
            .finish_non_exhaustive()
    }
}
