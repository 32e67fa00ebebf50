mod clock;
mod db;
mod fees;
mod ipc;
mod roster;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clock::{Clock, FixedClock, SystemClock};
use tracing::{info, warn};

fn init_logging() {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn select_clock() -> Box<dyn Clock> {
    match env::var("TUITIOND_TODAY") {
        Ok(raw) => match FixedClock::parse(&raw) {
            Some(clock) => {
                info!(today = %clock.today(), "clock pinned");
                Box::new(clock)
            }
            None => {
                warn!(value = %raw, "TUITIOND_TODAY is not YYYY-MM-DD, using system clock");
                Box::new(SystemClock)
            }
        },
        Err(_) => Box::new(SystemClock),
    }
}

fn main() {
    init_logging();

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        clock: select_clock(),
    };

    if let Ok(path) = env::var("TUITIOND_WORKSPACE") {
        if !path.trim().is_empty() {
            let _ = ipc::open_workspace(&mut state, PathBuf::from(path));
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "tuitiond ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to reply to.
                warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
