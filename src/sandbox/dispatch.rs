//! Run commands inside a reconciled sandbox.

use anyhow::Result;
use tracing::info;

use crate::error::DrmError;
use crate::runtime::{ContainerRuntime, ExecRequest};

/// Build the exec request for `command`. An empty command opens `shell` interactively.
pub fn exec_request(command: Vec<String>, shell: &str, stdin_is_terminal: bool) -> ExecRequest {
    if command.is_empty() {
        ExecRequest {
            command: vec![shell.to_string()],
            interactive: true,
            tty: stdin_is_terminal,
        }
    } else {
        ExecRequest {
            command,
            interactive: stdin_is_terminal,
            tty: stdin_is_terminal,
        }
    }
}

/// The sandbox name to attach to, or `SandboxUnavailable` when none is set.
pub fn selected_container(container: Option<&str>) -> Result<&str> {
    container
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            DrmError::SandboxUnavailable {
                reason: "no sandbox is selected; run `drm use <version>` first".to_string(),
            }
            .into()
        })
}

/// Attach to the sandbox named `container` and run `request`, returning its exit code.
///
/// Fails with `SandboxUnavailable` without touching the runtime when no sandbox name
/// is known.
pub fn dispatch(
    runtime: &dyn ContainerRuntime,
    container: Option<&str>,
    request: &ExecRequest,
) -> Result<i32> {
    let container = selected_container(container)?;
    info!(container, command = ?request.command, tty = request.tty, "dispatch:exec");
    let code = runtime.exec(container, request)?;
    info!(container, code, "dispatch:exited");
    Ok(code)
}
