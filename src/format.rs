use crate::entry::Entry;
use crate::record::{Level, Record};
use colored::Colorize;
use std::fmt::Write;

/// The default formatter.
///
/// Produces `<time><module: ...>LEVEL: <message or error> {k=v ...}`. For
/// errors, buffered trace lines come first (one per line) and the stack
/// follows as indented `function` / `file:line` pairs.
pub fn format_text(entry: &Entry) -> String {
    let config = entry.config();
    let mut b = String::new();
    let level = entry.level();

    if level == Level::Error {
        for t in entry.traces() {
            b.push_str(t);
            b.push('\n');
        }
    }

    b.push_str(&config.format_time(entry.time()));
    for m in entry.modules() {
        b.push_str(m);
        b.push_str(": ");
    }

    if config.colors {
        let _ = write!(b, "{}", paint(level));
    } else {
        b.push_str(level.as_str());
    }
    b.push_str(": ");

    match (entry.err(), entry.message()) {
        (Some(err), _) => {
            let _ = write!(b, "{}", err);
        }
        (None, Some(msg)) => b.push_str(msg),
        (None, None) => {}
    }

    let data = entry.data();
    if !data.is_empty() {
        b.push_str(" {");
        for (i, (k, v)) in data.iter().enumerate() {
            if i > 0 {
                b.push(' ');
            }
            b.push_str(k);
            b.push('=');
            v.render(&mut b);
        }
        b.push('}');
    }

    if level == Level::Error {
        if let Some(stack) = entry.err().and_then(|e| e.stack()) {
            match &config.stack_filter {
                Some(filter) => filter.filter(stack).render(&mut b),
                None => stack.render(&mut b),
            }
        }
    }

    b
}

fn paint(level: Level) -> colored::ColoredString {
    let label = level.as_str();
    match level {
        Level::Info => label.green(),
        Level::Error => label.red().bold(),
        Level::Debug => label.cyan(),
        Level::Trace => label.dimmed(),
    }
}

/// Format an entry as a single JSON object.
///
/// Swap it in with `Config::with_format(format_json)` when the output
/// feeds a log collector rather than a terminal.
pub fn format_json(entry: &Entry) -> String {
    serde_json::to_string(&Record::from(entry))
        .unwrap_or_else(|e| format!(r#"{{"error":"unable to encode entry: {}"}}"#, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::LogError;
    use crate::fields;
    use crate::stack::{Frame, Stack};
    use crate::value::Value;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    fn capture(config: Config) -> (Entry, Arc<Mutex<Vec<String>>>, String) {
        let t = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let config = config
            .with_outputs(Vec::new())
            .with_output(move |e: &Entry| sink.lock().unwrap().push(e.config().format(e)))
            .with_capture_stack(false)
            .with_clock(move || t)
            .shared();
        let stamp = config.format_time(t);
        (Entry::with_config(config), lines, stamp)
    }

    #[test]
    fn renders_field_types_sorted() {
        let (root, lines, stamp) = capture(Config::new());
        let y: HashMap<&str, &str> = [("X", "Y")].into_iter().collect();
        root.fields(fields! {
            "x" => Value::debug((123,)),
            "y" => Value::debug(y),
            "z" => 690123,
            "b" => b"aa".to_vec(),
            "f" => 0.5,
            "ok" => false,
            "raw" => Value::raw("[1,2]"),
        })
        .print("p");

        let want = format!(
            r#"{}INFO: p {{b="aa" f=0.5 ok=false raw=[1,2] x=(123,) y={{"X": "Y"}} z=690123}}"#,
            stamp
        );
        assert_eq!(lines.lock().unwrap()[0], want);
    }

    #[test]
    fn repeated_formatting_is_identical() {
        let (root, lines, _) = capture(Config::new());
        let e = root.module("m").fields(fields! { "c" => 3, "a" => 1, "b" => 2 });
        for _ in 0..5 {
            e.print("same");
        }
        let lines = lines.lock().unwrap();
        assert!(lines.windows(2).all(|w| w[0] == w[1]));
        assert!(lines[0].ends_with("{a=1 b=2 c=3}"));
    }

    #[test]
    fn error_takes_precedence_and_renders_stack() {
        let (root, lines, stamp) = capture(Config::new());
        let stack = Stack::new(vec![Frame {
            function: "app::run".into(),
            file: Some("src/main.rs".into()),
            line: Some(3),
        }]);
        let err = LogError::new(crate::error::MessageError("bad".into())).with_stack(stack);
        root.module("db").field("id", 1).error_with(err);
        assert_eq!(
            lines.lock().unwrap()[0],
            format!("{}db: ERROR: bad {{id=1}}\n\tapp::run\n\t\tsrc/main.rs:3", stamp)
        );
    }

    #[test]
    fn colored_level() {
        colored::control::set_override(true);
        let (root, lines, _) = capture(Config::new().with_colors(true));
        root.errorf(format_args!("red"));
        let line = lines.lock().unwrap()[0].clone();
        assert!(line.contains("\u{1b}["));
        assert!(line.contains("ERROR"));
    }

    #[test]
    fn json_format() {
        let (root, lines, _) = capture(Config::new().with_format(format_json));
        root.module("api").field("k", "v").field("n", 2).print("hello");

        let v: serde_json::Value = serde_json::from_str(&lines.lock().unwrap()[0]).unwrap();
        assert_eq!(v["level"], "info");
        assert_eq!(v["modules"], serde_json::json!(["api"]));
        assert_eq!(v["message"], "hello");
        assert_eq!(v["fields"], serde_json::json!({"k": "v", "n": 2}));
        assert_eq!(v["timestamp"], "2023-11-14T22:13:20Z");
        assert!(v.get("error").is_none());
    }
}
