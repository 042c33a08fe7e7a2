use crate::entry::Entry;
use crate::error::ConfigError;
use crate::format::format_text;
use crate::output::{Output, StdOutput};
use crate::stack::FilterTrace;
use arc_swap::ArcSwap;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Turns an [`Entry`] into text for the default output.
pub type FormatFn = Arc<dyn Fn(&Entry) -> String + Send + Sync>;

/// Source of the current time; replace it for deterministic tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Monotonic time source used for `since` checkpoints.
pub type Ticker = Arc<dyn Fn() -> Instant + Send + Sync>;

/// Receives the raw timing lines written by [`Entry::since`].
pub type SinceWriter = Arc<dyn Fn(&str) + Send + Sync>;

/// Default time layout: just the wall-clock time, followed by a space.
pub const DEFAULT_FMT_TIME: &str = "%H:%M:%S ";

/// Logging configuration.
///
/// Build one at startup, then either [`install`] it as the process-wide
/// configuration or bind entries to it with
/// [`Entry::with_config`](crate::Entry::with_config). A configuration is
/// read-only once in use; [`update`] swaps in a modified copy.
///
/// Outputs sharing a destination must serialize their own writes; the
/// dispatcher calls every output from whichever thread logged.
#[derive(Clone)]
pub struct Config {
    /// Outputs called, in order, for every dispatched entry.
    ///
    /// The default prints to stderr for errors and stdout for everything
    /// else. Generally you want to keep it and add extra outputs.
    pub outputs: Vec<Arc<dyn Output>>,

    /// Modules that always have debug output enabled; `"all"` enables
    /// every module.
    pub debug: Vec<String>,

    /// Formatter used by the built-in outputs and for buffered traces.
    pub format: FormatFn,

    /// strftime layout for the timestamp prefix. The default only prints
    /// the time, which works well in development; production setups
    /// probably want `"%Y-%m-%dT%H:%M:%S%z "` or similar.
    pub fmt_time: String,

    /// Optional filter applied to stack traces before rendering.
    pub stack_filter: Option<Arc<dyn FilterTrace>>,

    /// Capture a stack for errors that don't already carry one.
    pub capture_stack: bool,

    /// Decorate level labels with ANSI colors.
    pub colors: bool,

    /// Wall clock for entry timestamps.
    pub clock: Clock,

    /// Monotonic clock measuring the intervals reported by `since`; wall
    /// clock steps don't affect it.
    pub ticker: Ticker,

    /// Destination of the timing lines printed by `since` for modules in
    /// debug mode. Writes to stderr by default.
    pub since_output: SinceWriter,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            outputs: vec![Arc::new(StdOutput)],
            debug: Vec::new(),
            format: Arc::new(format_text),
            fmt_time: DEFAULT_FMT_TIME.to_string(),
            stack_filter: None,
            capture_stack: true,
            colors: false,
            clock: Arc::new(Utc::now),
            ticker: Arc::new(Instant::now),
            since_output: Arc::new(|line: &str| {
                let _ = std::io::stderr().lock().write_all(line.as_bytes());
            }),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug list from a comma-separated string of module names.
    ///
    /// An empty (or all-whitespace) string clears the list.
    pub fn set_debug(&mut self, csv: &str) {
        let csv = csv.trim();
        self.debug = if csv.is_empty() {
            Vec::new()
        } else {
            csv.split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect()
        };
    }

    pub fn with_debug(mut self, csv: &str) -> Self {
        self.set_debug(csv);
        self
    }

    /// Append an output after the existing ones.
    pub fn with_output(mut self, output: impl Output + 'static) -> Self {
        self.outputs.push(Arc::new(output));
        self
    }

    /// Append an output that the caller keeps a handle to.
    pub fn with_shared_output(mut self, output: Arc<dyn Output>) -> Self {
        self.outputs.push(output);
        self
    }

    /// Replace all outputs.
    pub fn with_outputs(mut self, outputs: Vec<Arc<dyn Output>>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_format<F>(mut self, format: F) -> Self
    where
        F: Fn(&Entry) -> String + Send + Sync + 'static,
    {
        self.format = Arc::new(format);
        self
    }

    /// Set the timestamp layout, rejecting malformed strftime strings.
    pub fn with_fmt_time(mut self, layout: &str) -> Result<Self, ConfigError> {
        if StrftimeItems::new(layout).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidTimeFormat(layout.to_string()));
        }
        self.fmt_time = layout.to_string();
        Ok(self)
    }

    pub fn with_stack_filter(mut self, filter: impl FilterTrace + 'static) -> Self {
        self.stack_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_capture_stack(mut self, capture: bool) -> Self {
        self.capture_stack = capture;
        self
    }

    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_ticker<F>(mut self, ticker: F) -> Self
    where
        F: Fn() -> Instant + Send + Sync + 'static,
    {
        self.ticker = Arc::new(ticker);
        self
    }

    pub fn with_since_output<F>(mut self, out: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.since_output = Arc::new(out);
        self
    }

    pub fn shared(self) -> Arc<Config> {
        Arc::new(self)
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn tick(&self) -> Instant {
        (self.ticker)()
    }

    /// Render `t` in local time using [`Config::fmt_time`].
    pub fn format_time(&self, t: DateTime<Utc>) -> String {
        let mut s = String::new();
        // A layout that slipped past validation renders as far as it can.
        let _ = write!(s, "{}", t.with_timezone(&Local).format(&self.fmt_time));
        s
    }

    pub fn format(&self, entry: &Entry) -> String {
        (self.format)(entry)
    }

    /// Hand `entry` to every output, in order.
    pub fn run_outputs(&self, entry: &Entry) {
        for output in &self.outputs {
            output.write(entry);
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("outputs", &self.outputs.len())
            .field("debug", &self.debug)
            .field("fmt_time", &self.fmt_time)
            .field("stack_filter", &self.stack_filter.is_some())
            .field("capture_stack", &self.capture_stack)
            .field("colors", &self.colors)
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<ArcSwap<Config>> = OnceLock::new();

fn cell() -> &'static ArcSwap<Config> {
    GLOBAL.get_or_init(|| ArcSwap::from_pointee(Config::default()))
}

/// The process-wide configuration used by entries that aren't bound to
/// one explicitly.
pub fn global() -> Arc<Config> {
    cell().load_full()
}

/// Replace the process-wide configuration.
pub fn install(config: Config) {
    cell().store(Arc::new(config));
}

/// Modify a copy of the process-wide configuration and install it.
///
/// `f` may run more than once when another thread swaps the
/// configuration concurrently; only the last run is kept.
pub fn update(f: impl Fn(&mut Config)) {
    cell().rcu(|current| {
        let mut config = Config::clone(current);
        f(&mut config);
        config
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_debug_parses_csv() {
        let mut c = Config::new();
        c.set_debug(" a, b ,c ");
        assert_eq!(c.debug, ["a", "b", "c"]);

        c.set_debug("all");
        assert_eq!(c.debug, ["all"]);

        c.set_debug("  ");
        assert!(c.debug.is_empty());
    }

    #[test]
    fn rejects_bad_time_layout() {
        assert!(Config::new().with_fmt_time("%Y-%m-%d ").is_ok());
        let err = Config::new().with_fmt_time("%Q").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeFormat(_)));
    }

    #[test]
    fn format_time_uses_layout() {
        let t = DateTime::parse_from_rfc3339("2024-03-01T10:20:30Z")
            .unwrap()
            .with_timezone(&Utc);
        let c = Config::new().with_fmt_time("%Y ").unwrap();
        assert_eq!(c.format_time(t), format!("{} ", t.with_timezone(&Local).format("%Y")));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        // The only unit test touching the process-wide config.
        install(Config::new().with_debug(""));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                std::thread::spawn(move || {
                    for i in 0..25 {
                        update(|c| c.debug.push(format!("{}-{}", t, i)));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(global().debug.len(), 200);
        install(Config::new());
    }

    #[test]
    fn with_output_appends() {
        let c = Config::new().with_output(|_: &Entry| {});
        assert_eq!(c.outputs.len(), 2);
        let c = c.with_outputs(Vec::new());
        assert!(c.outputs.is_empty());
    }
}
