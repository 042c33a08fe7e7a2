use crate::entry::Entry;
use crate::record::Level;
use std::io::Write;
use std::sync::Mutex;

/// Destination for dispatched [`Entry`] values.
///
/// Outputs are called synchronously, in registration order, from the
/// thread that logged. They can't fail the log call: an output that hits
/// an I/O error just drops the entry. Implementations writing to a shared
/// buffer are responsible for their own locking.
///
/// Any `Fn(&Entry) + Send + Sync` closure is an output:
///
/// ```
/// use chainlog::{Config, Entry, Level};
///
/// let config = Config::new().with_output(|e: &Entry| {
///     if e.level() != Level::Error {
///         return;
///     }
///     // .. send to an error notification service ..
/// });
/// ```
pub trait Output: Send + Sync {
    fn write(&self, entry: &Entry);
}

impl<F> Output for F
where
    F: Fn(&Entry) + Send + Sync,
{
    fn write(&self, entry: &Entry) {
        self(entry)
    }
}

/// The default output: errors go to stderr, everything else to stdout,
/// one newline-terminated line per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdOutput;

impl Output for StdOutput {
    fn write(&self, entry: &Entry) {
        let line = entry.config().format(entry);
        // Holding the stream lock keeps concurrent lines from interleaving.
        let _ = if entry.level() == Level::Error {
            writeln!(std::io::stderr().lock(), "{}", line)
        } else {
            writeln!(std::io::stdout().lock(), "{}", line)
        };
    }
}

/// Collects formatted entries in memory, one line each, guarded by a
/// mutex.
///
/// Handy for tests and for surfacing recent log lines elsewhere.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    buf: Mutex<String>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        self.buf.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Return everything written so far and clear the buffer.
    pub fn take(&self) -> String {
        self.buf
            .lock()
            .map(|mut b| std::mem::take(&mut *b))
            .unwrap_or_default()
    }
}

impl Output for MemoryOutput {
    fn write(&self, entry: &Entry) {
        let line = entry.config().format(entry);
        if let Ok(mut buf) = self.buf.lock() {
            buf.push_str(&line);
            buf.push('\n');
        }
    }
}
