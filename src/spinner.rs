//! Progress spinners on stderr. stdout stays reserved for machine-readable output.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

/// Create a spinner with consistent styling.
fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb
}

/// Run an operation with a spinner, showing success/failure.
///
/// The operation receives the spinner so it can print progress lines above it.
pub fn with_spinner<T, F>(msg: &str, op: F) -> Result<T>
where
    F: FnOnce(&ProgressBar) -> Result<T>,
{
    let pb = create_spinner(msg);
    let result = op(&pb);
    match &result {
        Ok(_) => pb.finish_with_message(format!("✔ {}", msg)),
        Err(_) => pb.finish_with_message(format!("✘ {}", msg)),
    }
    result
}

/// Run a command with a spinner, streaming its output above the spinner line.
///
/// Used for image pulls, whose layer progress is printed as it arrives. A non-zero
/// exit is an error carrying the exit code.
pub fn with_streaming_command(msg: &str, mut cmd: Command) -> Result<()> {
    with_spinner(msg, |pb| {
        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn command")?;

        let forwarders = [
            child.stdout.take().map(|out| forward_lines(out, pb.clone())),
            child.stderr.take().map(|err| forward_lines(err, pb.clone())),
        ];
        for handle in forwarders.into_iter().flatten() {
            handle.join().ok();
        }

        let status = child.wait().context("Failed to wait for command")?;
        if !status.success() {
            anyhow::bail!("{} (exit code: {})", msg, status.code().unwrap_or(-1));
        }
        Ok(())
    })
}

/// Print each non-blank line of `source` above the spinner until it closes.
fn forward_lines<R: Read + Send + 'static>(source: R, pb: ProgressBar) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(source).lines().map_while(Result::ok) {
            if !line.trim().is_empty() {
                pb.println(&line);
            }
        }
    })
}
