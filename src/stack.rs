use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

/// One resolved frame of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub function: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// A captured call stack, innermost frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack {
    frames: Vec<Frame>,
}

impl Stack {
    pub fn new(frames: Vec<Frame>) -> Self {
        Stack { frames }
    }

    /// Capture the current call stack.
    ///
    /// Frames belonging to the backtrace machinery and to this crate are
    /// skipped from the top, so the first frame is the caller's. Returns an
    /// empty stack on platforms where capturing is unsupported.
    pub fn capture() -> Self {
        let bt = Backtrace::force_capture();
        if bt.status() != BacktraceStatus::Captured {
            return Stack::default();
        }

        let mut frames = parse(&bt.to_string());
        let skip = frames
            .iter()
            .take_while(|f| {
                f.function.starts_with("std::backtrace")
                    || f.function.starts_with("chainlog::")
                    || f.function.starts_with("<chainlog::")
            })
            .count();
        frames.drain(..skip);
        Stack { frames }
    }

    /// Capture the stack of a panic in progress, from inside a panic
    /// hook.
    ///
    /// The hook and the panic machinery above the panicking function are
    /// dropped, so the first frame is where the panic happened.
    pub fn capture_panic() -> Self {
        let mut stack = Self::capture();
        skip_panic_frames(&mut stack.frames);
        stack
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Write the stack as indented `function` / `file:line` pairs, each
    /// starting on a new line.
    pub fn render(&self, out: &mut String) {
        for f in &self.frames {
            out.push_str("\n\t");
            out.push_str(&f.function);
            if let Some(file) = &f.file {
                out.push_str("\n\t\t");
                out.push_str(file);
                if let Some(line) = f.line {
                    out.push(':');
                    out.push_str(&line.to_string());
                }
            }
        }
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::new();
        self.render(&mut s);
        f.write_str(&s)
    }
}

/// Parse the `Display` output of [`std::backtrace::Backtrace`].
///
/// Frame lines look like `  3: path::to::function`, optionally followed by
/// `at file.rs:12:5`.
fn parse(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if let Some(loc) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                let mut parts = loc.rsplitn(3, ':');
                let (_col, lineno, file) = (parts.next(), parts.next(), parts.next());
                match (file, lineno.and_then(|l| l.parse().ok())) {
                    (Some(file), Some(lineno)) => {
                        last.file = Some(file.to_string());
                        last.line = Some(lineno);
                    }
                    _ => last.file = Some(loc.to_string()),
                }
            }
        } else if let Some((idx, name)) = line.split_once(": ") {
            if !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()) {
                frames.push(Frame {
                    function: name.to_string(),
                    file: None,
                    line: None,
                });
            }
        }
    }
    frames
}

fn is_panic_machinery(f: &Frame) -> bool {
    let name = f.function.as_str();
    name.starts_with("std::panicking::")
        || name.starts_with("core::panicking::")
        || name.contains("rust_begin_unwind")
        || name.contains("__rust_end_short_backtrace")
}

/// Drop everything up to the end of the first run of panic machinery
/// frames. Stacks without such frames are left alone.
fn skip_panic_frames(frames: &mut Vec<Frame>) {
    let Some(start) = frames.iter().position(is_panic_machinery) else {
        return;
    };
    let end = frames[start..]
        .iter()
        .position(|f| !is_panic_machinery(f))
        .map_or(frames.len(), |n| start + n);
    frames.drain(..end);
}

/// Filters a captured stack before it is rendered.
///
/// Typically used to drop HTTP middleware and runtime frames that add
/// noise to every error.
pub trait FilterTrace: Send + Sync {
    fn filter(&self, stack: &Stack) -> Stack;
}

/// Substring patterns matched against a frame's function name and file.
///
/// A frame is kept when it matches at least one `include` pattern (or
/// `include` is empty) and matches no `exclude` pattern.
#[derive(Debug, Clone, Default)]
pub struct Patterns {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Patterns {
    pub fn include<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Patterns {
            include: patterns.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
        }
    }

    pub fn exclude<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Patterns {
            include: Vec::new(),
            exclude: patterns.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(pattern: &str, frame: &Frame) -> bool {
        frame.function.contains(pattern)
            || frame.file.as_deref().is_some_and(|f| f.contains(pattern))
    }
}

impl FilterTrace for Patterns {
    fn filter(&self, stack: &Stack) -> Stack {
        let frames = stack
            .frames()
            .iter()
            .filter(|f| {
                (self.include.is_empty() || self.include.iter().any(|p| Self::matches(p, f)))
                    && !self.exclude.iter().any(|p| Self::matches(p, f))
            })
            .cloned()
            .collect();
        Stack::new(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "   0: std::backtrace::Backtrace::create
             at /rustc/abc/library/std/src/backtrace.rs:331:13
   1: app::handler::serve
             at ./src/handler.rs:42:9
   2: tower::util::call
             at /home/u/.cargo/registry/tower/src/util.rs:10:5
   3: __rust_begin_short_backtrace
";

    #[test]
    fn parse_backtrace_text() {
        let frames = parse(SAMPLE);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[1].function, "app::handler::serve");
        assert_eq!(frames[1].file.as_deref(), Some("./src/handler.rs"));
        assert_eq!(frames[1].line, Some(42));
        assert_eq!(frames[3].file, None);
    }

    #[test]
    fn render_pairs() {
        let stack = Stack::new(parse(SAMPLE)[1..2].to_vec());
        assert_eq!(stack.to_string(), "\n\tapp::handler::serve\n\t\t./src/handler.rs:42");
    }

    #[test]
    fn patterns_filter() {
        let stack = Stack::new(parse(SAMPLE));

        let only_app = Patterns::include(["app::"]).filter(&stack);
        assert_eq!(only_app.frames().len(), 1);
        assert_eq!(only_app.frames()[0].function, "app::handler::serve");

        let no_deps = Patterns::exclude([".cargo/registry", "std::"]).filter(&stack);
        let names: Vec<_> = no_deps.frames().iter().map(|f| f.function.as_str()).collect();
        assert_eq!(names, ["app::handler::serve", "__rust_begin_short_backtrace"]);
    }

    const PANIC_SAMPLE: &str = "   0: std::backtrace::Backtrace::force_capture
   1: chainlog::stack::Stack::capture
   2: <alloc::boxed::Box<F,A> as core::ops::function::Fn<Args>>::call
   3: std::panicking::rust_panic_with_hook
   4: std::panicking::begin_panic_handler::{{closure}}
   5: std::sys::backtrace::__rust_end_short_backtrace
   6: rust_begin_unwind
   7: core::panicking::panic_fmt
   8: app::worker::run
             at ./src/worker.rs:9:5
   9: std::panicking::try::do_call
  10: std::panic::catch_unwind
";

    #[test]
    fn panic_machinery_is_skipped() {
        let mut frames = parse(PANIC_SAMPLE);
        skip_panic_frames(&mut frames);
        let names: Vec<_> = frames.iter().map(|f| f.function.as_str()).collect();
        assert_eq!(
            names,
            ["app::worker::run", "std::panicking::try::do_call", "std::panic::catch_unwind"]
        );

        let mut plain = parse(SAMPLE);
        skip_panic_frames(&mut plain);
        assert_eq!(plain.len(), 4);
    }

    #[test]
    fn capture_skips_own_frames() {
        let stack = Stack::capture();
        if let Some(first) = stack.frames().first() {
            assert!(!first.function.starts_with("std::backtrace"));
        }
    }
}
