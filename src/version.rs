//! Parsing of `version[@gemset]` requests.

/// Literal used for both an unspecified gemset and the unqualified base image.
pub const DEFAULT: &str = "default";

/// A Ruby version paired with the gemset it should be isolated under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequest {
    pub version: String,
    pub gemset: String,
}

impl VersionRequest {
    /// Split a raw token on its first `@`.
    ///
    /// `3.1@team` gives version `3.1` and gemset `team`. Without an `@` the whole
    /// token is the version and the gemset is `default`. Never fails; an empty token
    /// is kept as an empty version, which resolves to the base image.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('@') {
            Some((version, gemset)) => Self {
                version: version.to_string(),
                gemset: gemset.to_string(),
            },
            None => Self {
                version: raw.to_string(),
                gemset: DEFAULT.to_string(),
            },
        }
    }

    /// Whether this request targets the untagged base image.
    pub fn is_base(&self) -> bool {
        self.version.is_empty() || self.version == DEFAULT
    }
}
