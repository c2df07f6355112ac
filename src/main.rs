mod auth;
mod calc;
mod config;
mod db;
mod http;
mod ipc;
mod pdf;
mod reports;
mod roster;
mod upload;

use std::io::{self, BufRead, Write};

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::auth::JwtSettings;

fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let config = config::Config::load()?;
    if std::env::args().skip(1).any(|a| a == "--stdio") {
        run_stdio(config.jwt);
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(http::serve(config))
}

/// One JSON request per line on stdin, one response per line on stdout.
/// The database is opened by `workspace.select`.
fn run_stdio(jwt: JwtSettings) {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        jwt,
    };
    info!("stdio transport ready");

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
                warn!("dropping malformed request: {e}");
                // No id to echo back.
                let reply = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", reply);
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
