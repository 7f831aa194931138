mod activities;
mod cache;
mod config;
mod db;
mod english;
mod enrollments;
mod error;
mod exams;
mod groups;
mod ipc;
mod rules;
mod special_courses;
mod students;
mod subjects;
mod teachers;
mod validators;

use std::io::{self, BufRead, Write};

use config::Config;
use serde_json::json;

fn init_logging(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .compact()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
}

fn main() {
    let config = Config::from_env();
    init_logging(&config.log_filter);
    for warning in Config::warnings(|key| std::env::var(key).ok()) {
        tracing::warn!("{}", warning);
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_filter = %config.log_filter,
        cache_capacity = config.cache_capacity,
        "schoold starting"
    );

    let startup_workspace = config.workspace.clone();
    let mut state = ipc::AppState::new(config);
    if let Some(path) = startup_workspace {
        if let Err(e) = ipc::select_workspace(&mut state, &path) {
            tracing::error!(workspace = %path.display(), error = ?e, "could not open startup workspace");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                tracing::warn!(error = %e, "unparseable request line");
                let resp = json!({
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
    tracing::info!("stdin closed; exiting");
}
