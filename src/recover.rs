use crate::config::Config;
use crate::entry::Entry;
use crate::error::{LogError, PanicError};
use crate::stack::Stack;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

type Callback = Box<dyn FnOnce(Entry) -> Entry + Send>;

thread_local! {
    static SCOPES: Cell<usize> = const { Cell::new(0) };
    static PANIC_STACK: RefCell<Option<Stack>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chain a panic hook that, on threads currently running recovered code,
/// records the stack at the panic site instead of printing the panic.
/// Panics anywhere else go to the previous hook.
fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if SCOPES.try_with(Cell::get).unwrap_or(0) > 0 {
                let stack = Stack::capture_panic();
                let _ = PANIC_STACK.try_with(|s| *s.borrow_mut() = Some(stack));
            } else {
                previous(info);
            }
        }));
    });
}

/// Marks the current thread as running recovered code while alive.
struct Scope;

impl Scope {
    fn enter() -> Self {
        SCOPES.with(|s| s.set(s.get() + 1));
        Scope
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        SCOPES.with(|s| s.set(s.get() - 1));
    }
}

struct Caught {
    payload: Box<dyn Any + Send>,
    stack: Option<Stack>,
}

fn catch<R>(f: impl FnOnce() -> R) -> Result<R, Caught> {
    install_hook();
    PANIC_STACK.with(|s| s.borrow_mut().take());
    let _scope = Scope::enter();
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Caught {
        payload,
        stack: PANIC_STACK.with(|s| s.borrow_mut().take()),
    })
}

/// Polls the wrapped future inside [`catch`], so a panic is caught on the
/// worker thread while its stack is still known.
struct CatchPanic<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = Result<F::Output, Caught>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.inner.as_mut();
        match catch(|| inner.poll(cx)) {
            Ok(Poll::Ready(r)) => Poll::Ready(Ok(r)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(caught) => Poll::Ready(Err(caught)),
        }
    }
}

/// Runs a unit of work and reports a panic as an error-level entry
/// instead of letting it propagate.
///
/// ```
/// use chainlog::Recover;
///
/// let id = 7;
/// let out = Recover::new()
///     .before(move |l| l.field("id", id))
///     .run(|| -> u32 { panic!("oh noes") });
/// assert_eq!(out, None);
/// ```
///
/// The `before` callback can modify the entry (for example to add fields)
/// before it is logged. `after` callbacks run once the error was logged;
/// what they return is discarded.
#[derive(Default)]
pub struct Recover {
    config: Option<Arc<Config>>,
    before: Option<Callback>,
    after: Vec<Callback>,
}

impl Recover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log through `config` instead of the process-wide configuration.
    pub fn with_config(config: Arc<Config>) -> Self {
        Recover {
            config: Some(config),
            ..Self::default()
        }
    }

    /// Set the callback applied to the entry before it is logged.
    pub fn before<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Entry) -> Entry + Send + 'static,
    {
        self.before = Some(Box::new(f));
        self
    }

    /// Add a callback that observes the entry after it was logged.
    pub fn after<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Entry) -> Entry + Send + 'static,
    {
        self.after.push(Box::new(f));
        self
    }

    /// Run `f`, returning its result, or `None` if it panicked.
    pub fn run<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        match catch(f) {
            Ok(r) => Some(r),
            Err(caught) => {
                self.report(caught);
                None
            }
        }
    }

    /// Spawn `fut` on the current Tokio runtime and report it if it
    /// panics. The returned handle resolves to `None` after a panic.
    pub fn spawn<Fut>(self, fut: Fut) -> JoinHandle<Option<Fut::Output>>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let fut = CatchPanic { inner: Box::pin(fut) };
        tokio::spawn(async move {
            match fut.await {
                Ok(r) => Some(r),
                Err(caught) => {
                    self.report(caught);
                    None
                }
            }
        })
    }

    fn report(self, caught: Caught) {
        let root = match &self.config {
            Some(c) => Entry::with_config(Arc::clone(c)),
            None => Entry::new(),
        };
        let config = root.config();

        let mut err = LogError::new(PanicError {
            message: panic_message(caught.payload.as_ref()),
        });
        if config.capture_stack {
            err = err.with_stack(caught.stack.unwrap_or_else(Stack::capture));
        }

        let mut l = root.module("panic");
        if let Some(before) = self.before {
            l = before(l);
        }
        l.error_with(err);

        for after in self.after {
            l = after(l);
        }
    }
}

/// Run `f`, logging a panic as an error instead of propagating it.
pub fn recover<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R,
{
    Recover::new().run(f)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(e) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        e.to_string()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{MemoryOutput, Output};
    use crate::record::Level;
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn config(out: &Arc<MemoryOutput>) -> Arc<Config> {
        Config::new()
            .with_outputs(vec![out.clone() as Arc<dyn Output>])
            .with_capture_stack(false)
            .shared()
    }

    #[test]
    fn no_panic_no_output() {
        let out = Arc::new(MemoryOutput::new());
        let r = Recover::with_config(config(&out)).run(|| 5);
        assert_eq!(r, Some(5));
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn panic_is_logged_once() {
        let out = Arc::new(MemoryOutput::new());
        let r = Recover::with_config(config(&out)).run(|| -> () { panic!("oh noes") });
        assert_eq!(r, None);

        let text = out.contents();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("panic: ERROR: oh noes"), "{}", text);
    }

    #[test]
    fn callbacks_see_entry() {
        let seen: Arc<Mutex<Vec<Entry>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let cfg = Config::new()
            .with_outputs(Vec::new())
            .with_output(move |e: &Entry| sink.lock().unwrap().push(e.clone()))
            .with_capture_stack(false)
            .shared();

        let after_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&after_calls);
        Recover::with_config(cfg)
            .before(|l| l.field("a", "b"))
            .after(move |l| {
                assert_eq!(l.data()["a"], Value::from("b"));
                counter.fetch_add(1, Ordering::SeqCst);
                l.field("ignored", true)
            })
            .run(|| panic!("formatted {}", 42));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].level(), Level::Error);
        assert_eq!(seen[0].modules(), ["panic"]);
        assert_eq!(seen[0].data()["a"], Value::from("b"));
        assert!(!seen[0].data().contains_key("ignored"));
        assert_eq!(seen[0].err().map(|e| e.to_string()).as_deref(), Some("formatted 42"));
        assert_eq!(after_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stack_attached_when_enabled() {
        let seen: Arc<Mutex<Vec<Entry>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let cfg = Config::new()
            .with_outputs(Vec::new())
            .with_output(move |e: &Entry| sink.lock().unwrap().push(e.clone()))
            .shared();
        Recover::with_config(cfg).run(|| panic!("x"));
        assert!(seen.lock().unwrap()[0].err().is_some_and(|e| e.has_stack()));
    }

    #[inline(never)]
    fn failing_worker() -> u32 {
        panic!("worker failed")
    }

    async fn failing_task() {
        tokio::task::yield_now().await;
        panic!("task failed");
    }

    fn capturing() -> (Arc<Config>, Arc<Mutex<Vec<Entry>>>) {
        let seen: Arc<Mutex<Vec<Entry>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let cfg = Config::new()
            .with_outputs(Vec::new())
            .with_output(move |e: &Entry| sink.lock().unwrap().push(e.clone()))
            .shared();
        (cfg, seen)
    }

    fn assert_starts_at(entry: &Entry, function: &str) {
        let stack = entry.err().and_then(|e| e.stack()).expect("stack captured");
        let frames = stack.frames();
        let at = frames
            .iter()
            .position(|f| f.function.contains(function))
            .unwrap_or_else(|| panic!("{} missing from stack:{}", function, stack));
        assert!(
            !frames[..at]
                .iter()
                .any(|f| f.function.starts_with("std::panicking") || f.function.starts_with("core::panicking")),
            "panic machinery left above {}:{}",
            function,
            stack
        );
    }

    #[test]
    fn stack_starts_at_panic_site() {
        let (cfg, seen) = capturing();
        assert_eq!(Recover::with_config(cfg).run(failing_worker), None);
        assert_starts_at(&seen.lock().unwrap()[0], "failing_worker");
    }

    #[tokio::test]
    async fn spawned_stack_starts_at_panic_site() {
        let (cfg, seen) = capturing();
        let r = Recover::with_config(cfg).spawn(failing_task()).await.unwrap();
        assert_eq!(r, None);
        assert_starts_at(&seen.lock().unwrap()[0], "failing_task");
    }

    #[test]
    fn panics_outside_recover_reach_previous_hook() {
        let (cfg, seen) = capturing();
        Recover::with_config(cfg).run(|| 1);
        let r = catch_unwind(|| panic!("unrelated"));
        assert!(r.is_err());
        assert!(seen.lock().unwrap().is_empty());
        assert!(PANIC_STACK.with(|s| s.borrow().is_none()));
    }

    #[tokio::test]
    async fn spawned_task_panic() {
        let out = Arc::new(MemoryOutput::new());
        let cfg = config(&out);

        let ok = Recover::with_config(Arc::clone(&cfg)).spawn(async { 1 }).await.unwrap();
        assert_eq!(ok, Some(1));
        assert_eq!(out.contents(), "");

        let failed = Recover::with_config(cfg)
            .spawn(async {
                panic!("task failed");
            })
            .await
            .unwrap();
        assert_eq!(failed, None::<()>);
        assert!(out.contents().contains("panic: ERROR: task failed"));
    }

    #[test]
    fn non_string_payload() {
        assert_eq!(panic_message(&42u8), "panic with non-string payload");
        assert_eq!(panic_message(&"s"), "s");
    }
}
