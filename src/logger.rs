//! File logging for drm.
//!
//! Everything goes to `drm.log` under the XDG state directory. stdout carries the
//! `KEY=value` lines a shell evaluates, so nothing may be logged there.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_DIR: &str = "drm";
const LOG_FILE: &str = "drm.log";
const DEFAULT_FILTER: &str = "info";

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init() -> Result<()> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let log_path = log_path(
        std::env::var_os("XDG_STATE_HOME").map(PathBuf::from),
        home::home_dir(),
    );
    let (directory, file_name) = split_path(&log_path)?;
    fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create log directory at {}", directory.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&directory, file_name));
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    let _ = GUARD.set(guard);
    Ok(())
}

/// `$XDG_STATE_HOME/drm/drm.log`, else `~/.local/state/drm/drm.log`, else the
/// system temp directory.
fn log_path(state_home: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    let state_dir = state_home
        .filter(|dir| !dir.as_os_str().is_empty())
        .or_else(|| home.map(|h| h.join(".local").join("state")));
    match state_dir {
        Some(dir) => dir.join(LOG_DIR).join(LOG_FILE),
        None => std::env::temp_dir().join(LOG_FILE),
    }
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name: {}", path.display()))?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((dir, file_name))
}
