use chainlog::format::format_json;
use chainlog::init::init_tracing_with_config;
use chainlog::{fields, Config, Entry, Level, Recover};
use std::sync::mpsc;
use std::thread;
use tracing::error;

/// Stand-in for an error notification service: receives one JSON object
/// per error and reports it.
fn notifier() -> mpsc::Sender<String> {
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for body in rx {
            eprintln!("notify: {}", body);
        }
    });
    tx
}

#[tokio::main]
async fn main() {
    let notify = notifier();
    let config = Config::from_env().unwrap_or_default().with_output(move |e: &Entry| {
        if e.level() == Level::Error {
            let _ = notify.send(format_json(e));
        }
    });
    if let Err(e) = init_tracing_with_config(config) {
        eprintln!("{}", e);
    }

    let log = chainlog::module("auth").fields(fields! { "user_id" => 42 });
    let log = log.trace("loaded user").since("load");
    log.fields_since().print("starting login");

    error!(user_id = 42, reason = "invalid password", "authentication failed");
    log.errorf(format_args!("login failed"));

    let _ = Recover::new()
        .before(|l| l.field("task", "cleanup"))
        .spawn(async { panic!("cleanup crashed") })
        .await;
}
