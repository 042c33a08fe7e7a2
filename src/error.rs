use crate::stack::Stack;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Error returned when building a [`Config`](crate::Config).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid time format {0:?}")]
    InvalidTimeFormat(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Error returned when installing the global `tracing` subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("global tracing subscriber already set: {0}")]
    SubscriberSet(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Error returned by the profiling helpers.
#[derive(thiserror::Error, Debug)]
pub enum ProfileError {
    #[error("cannot create profile file {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("profiler failed: {0}")]
    Profiler(#[source] std::io::Error),
}

/// A panic caught by [`Recover`](crate::Recover), carrying the panic value
/// in string form.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct PanicError {
    pub message: String,
}

/// An error built from a formatted message, as produced by `errorf`.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{0}")]
pub struct MessageError(pub String);

/// The error carried by an error-level [`Entry`](crate::Entry).
///
/// Cheap to clone; optionally holds the stack captured where the error was
/// logged (or where a panic was recovered).
#[derive(Clone)]
pub struct LogError {
    inner: Arc<dyn StdError + Send + Sync>,
    stack: Option<Arc<Stack>>,
}

impl LogError {
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        LogError {
            inner: Arc::new(err),
            stack: None,
        }
    }

    pub fn from_boxed(err: Box<dyn StdError + Send + Sync>) -> Self {
        LogError {
            inner: Arc::from(err),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: Stack) -> Self {
        self.stack = Some(Arc::new(stack));
        self
    }

    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_deref()
    }

    pub fn has_stack(&self) -> bool {
        self.stack.is_some()
    }

    /// The wrapped error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.inner
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogError")
            .field("error", &self.inner)
            .field("stack", &self.stack.as_ref().map(|s| s.frames().len()))
            .finish()
    }
}
