mod academic;
mod attendance;
mod calc;
mod db;
mod error;
mod grading;
mod ipc;
mod results;
mod rollup;
mod roster;
mod settings;

use std::io::{self, BufRead, Write};

use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_ENV: &str = "SCHOOLD_LOG";

fn init_logging() {
    // stdout carries the protocol, so logs go to stderr.
    let fmt = fmt::layer()
        .with_writer(io::stderr)
        .without_time()
        .with_target(false);
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt).init();
}

fn main() {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "schoold started");

    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // No id to echo back.
                tracing::warn!(error = %e, "unparseable request line");
                json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                })
            }
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("schoold stopped");
}
