//! Chainable structured logging.
//!
//! ```
//! use chainlog::fields;
//!
//! chainlog::print("starting");
//!
//! let log = chainlog::module("worker").fields(fields! { "job" => 7 });
//! let log = log.trace("fetched input"); // only shown if the job fails
//! log.since("fetch");
//! log.print("done");
//! ```
//!
//! Debug and trace output is enabled per module, either process-wide
//! through [`Config::debug`] or on a single chain with [`Entry::set_debug`].

pub mod value;
pub mod record;
pub mod entry;
pub mod config;
pub mod env;
pub mod error;
pub mod format;
pub mod stack;
pub mod output;
pub mod request;
pub mod recover;

pub mod layer;
pub mod init;
pub mod profile;

pub use config::Config;
pub use entry::Entry;
pub use error::{LogError, PanicError};
pub use output::{MemoryOutput, Output, StdOutput};
pub use record::{Level, Record};
pub use recover::{recover, Recover};
pub use request::RequestInfo;
pub use value::{Fields, Value};

use std::error::Error as StdError;
use std::fmt;

/// Start a chain with a module.
pub fn module(name: impl Into<String>) -> Entry {
    Entry::new().module(name)
}

/// Start a chain with fields.
pub fn fields(f: Fields) -> Entry {
    Entry::new().fields(f)
}

/// Start a chain with a single field.
pub fn field(key: impl Into<String>, value: impl Into<Value>) -> Entry {
    Entry::new().field(key, value)
}

/// Start a chain with debug output enabled for `modules`.
pub fn set_debug<I, S>(modules: I) -> Entry
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Entry::new().set_debug(modules)
}

/// Start a chain with fields describing an HTTP request.
pub fn fields_request<R: RequestInfo + ?Sized>(r: &R) -> Entry {
    Entry::new().fields_request(r)
}

/// Start a chain with the caller's location as a field.
#[track_caller]
pub fn fields_location() -> Entry {
    Entry::new().fields_location()
}

pub fn print(msg: impl fmt::Display) {
    Entry::new().print(msg)
}

pub fn printf(args: fmt::Arguments<'_>) {
    Entry::new().printf(args)
}

pub fn error<E>(err: E)
where
    E: StdError + Send + Sync + 'static,
{
    Entry::new().error(err)
}

pub fn errorf(args: fmt::Arguments<'_>) {
    Entry::new().errorf(args)
}
