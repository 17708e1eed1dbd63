//! Deterministic sandbox container names.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Prefix for all drm-managed container names.
pub const CONTAINER_PREFIX: &str = "drm";

/// Separator between name components. Never produced by `component`.
const DELIMITER: char = '_';

/// Bytes escaped inside a component: everything but ASCII alphanumerics and `.`.
/// `-` and `_` are escaped too, so `-` only ever introduces an escape and `_` only
/// ever separates components.
const ESCAPED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.');

/// Name of the container dedicated to one (version, gemset, repository) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxIdentity {
    pub name: String,
}

impl SandboxIdentity {
    /// Compose `drm_<version>_<gemset>[_<repo>]`.
    ///
    /// Pure: the same inputs always give the same name, which is how an existing
    /// sandbox is found again. Each component is escaped so that it holds only
    /// characters valid in a container name and never the delimiter, which keeps
    /// distinct triples on distinct names. Plain versions and gemsets such as
    /// `3.1` or `team` come through unchanged.
    pub fn derive(version: &str, gemset: &str, repo: Option<&str>) -> Self {
        let mut name = String::from(CONTAINER_PREFIX);
        name.push(DELIMITER);
        name.push_str(&component(version));
        name.push(DELIMITER);
        name.push_str(&component(gemset));
        if let Some(repo) = repo.filter(|r| !r.is_empty()) {
            name.push(DELIMITER);
            name.push_str(&component(repo));
        }
        Self { name }
    }
}

impl std::fmt::Display for SandboxIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Percent-encode `raw`, then swap `%` (not allowed in container names) for `-`.
///
/// Every `-` in the output starts a two-digit hex escape, so the mapping is
/// reversible and therefore injective.
fn component(raw: &str) -> String {
    utf8_percent_encode(raw, ESCAPED)
        .to_string()
        .replace('%', "-")
}
