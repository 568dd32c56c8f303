// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! folder-mcp daemon (folder-mcpd)
//!
//! Long-running background process that keeps configured folders indexed
//! into per-folder vector stores and serves the WebSocket control channel.
//!
//! Architecture:
//! - Listener task: accepts control connections, dispatches requests,
//!   pushes FMDM snapshots
//! - Orchestrator: one lifecycle owner task per folder plus a bounded
//!   embedding worker pool

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use fmcp_daemon::lifecycle::{self, Config, LifecycleError, StartupResult};
use fmcp_daemon::listener::{ListenCtx, Listener};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut restart = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--restart" => restart = true,
            "--version" | "-V" | "-v" => {
                println!("folder-mcpd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: folder-mcpd [--restart | --help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Rotate log file if it has grown too large
    rotate_log_if_needed(&config.log_path);

    // Set up logging before startup so failures are captured
    let log_guard = setup_logging(&config)?;

    info!("starting folder-mcp daemon");

    let StartupResult { mut daemon, listener } = match lifecycle::startup(&config, restart).await
    {
        Ok(result) => result,
        Err(e @ LifecycleError::AlreadyRunning { .. }) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start daemon: {e}");
            eprintln!("folder-mcpd: {e}");
            drop(log_guard);
            std::process::exit(1);
        }
    };

    // Spawn the control-channel listener task
    let ctx = Arc::new(ListenCtx {
        orchestrator: Arc::clone(&daemon.orchestrator),
        fmdm: daemon.fmdm.clone(),
        folders_path: daemon.config.folders_path.clone(),
        start_time: daemon.start_time,
    });
    tokio::spawn(Listener::new(listener, ctx).run());

    // Signal handlers: TERM/INT shut down, HUP reloads the folders list
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    info!("daemon ready");
    println!("READY");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down...");
                break;
            }
            _ = sighup.recv() => {
                info!("received SIGHUP, reloading folders configuration");
                daemon.reload_folders().await;
            }
        }
    }

    daemon.shutdown().await;
    info!("daemon stopped");
    Ok(())
}

fn print_help() {
    println!("folder-mcpd {}", env!("CARGO_PKG_VERSION"));
    println!("folder-mcp daemon - keeps configured folders indexed and serves the control channel");
    println!();
    println!("USAGE:");
    println!("    folder-mcpd [--restart]");
    println!();
    println!("OPTIONS:");
    println!("    --restart        Take over from a running daemon (graceful, then forced)");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
    println!();
    println!("ENVIRONMENT:");
    println!("    FOLDER_MCP_USER_CONFIG_DIR        Override the user config directory");
    println!("    FOLDER_MCP_FILE_CHANGE_DEBOUNCE_MS  Watcher debounce window");
    println!("    FOLDER_MCP_LOG_LEVEL              debug|info|warn|error");
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → `daemon.log.2` → `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently
/// ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    std::fs::create_dir_all(&config.config_dir)?;

    let file_appender = tracing_appender::rolling::never(
        &config.config_dir,
        config.log_path.file_name().ok_or(LifecycleError::NoConfigDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // FOLDER_MCP_LOG_LEVEL drives the filter; RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fmcp_daemon::env::log_level()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
