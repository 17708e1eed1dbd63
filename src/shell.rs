//! Shell-friendly output of the sandbox environment.

use crate::image::ImageReference;
use crate::sandbox::SandboxIdentity;

pub const CONTAINER_NAME_VAR: &str = "DRM_CONTAINER_NAME";
pub const IMAGE_NAME_VAR: &str = "DRM_IMAGE_NAME";
pub const FULL_IMAGE_NAME_VAR: &str = "DRM_FULL_IMAGE_NAME";

/// Escape single quotes within a string for use inside a single-quoted shell argument.
fn shell_escape(s: &str) -> String {
    s.replace('\'', "'\\''")
}

/// Quote a value so that `eval` on a `KEY=value` line assigns it verbatim.
///
/// Values made only of safe characters (alphanumeric, `-`, `_`, `.`, `/`, `:`, `@`)
/// are returned unchanged. Empty strings return `''`.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '@')
    }) {
        s.to_string()
    } else {
        format!("'{}'", shell_escape(s))
    }
}

/// The `KEY=value` lines that select a sandbox for later `drm run` calls.
pub fn env_lines(identity: &SandboxIdentity, image: &ImageReference) -> Vec<String> {
    [
        (CONTAINER_NAME_VAR, identity.name.as_str()),
        (IMAGE_NAME_VAR, image.short_name.as_str()),
        (FULL_IMAGE_NAME_VAR, image.fully_qualified_name.as_str()),
    ]
    .iter()
    .map(|(key, value)| format!("{}={}", key, shell_quote(value)))
    .collect()
}
