//! Fatal, user-visible failures of version resolution and sandbox reconciliation.
//!
//! These travel inside `anyhow::Error` and are recovered with `downcast_ref` at the
//! process boundary to pick an exit code.

/// Typed failures that end a command with a dedicated exit status.
#[derive(Debug, thiserror::Error)]
pub enum DrmError {
    /// Requested version exists neither locally nor in the registry.
    #[error("Ruby version '{version}' does not exist locally or in the registry ({registry})")]
    VersionNotFound { version: String, registry: String },

    /// Both registry protocol generations failed.
    #[error("Registry {registry} is unreachable\n  v2: {v2}\n  v1: {v1}")]
    RegistryUnreachable {
        registry: String,
        v2: String,
        v1: String,
    },

    /// Pull failed, or the image is still missing from the local index after pulling.
    #[error("Failed to retrieve image '{image}': {reason}")]
    ImageRetrieval { image: String, reason: String },

    /// The sandbox could not be brought to a running state, or is unknown.
    #[error("Sandbox unavailable: {reason}")]
    SandboxUnavailable { reason: String },
}

impl DrmError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            DrmError::VersionNotFound { .. } => 2,
            DrmError::RegistryUnreachable { .. } => 3,
            DrmError::ImageRetrieval { .. } => 4,
            DrmError::SandboxUnavailable { .. } => 5,
        }
    }
}

/// Exit status for any error returned from a command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<DrmError>())
        .map(DrmError::exit_code)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            DrmError::VersionNotFound {
                version: "x".into(),
                registry: "r".into(),
            }
            .exit_code(),
            DrmError::RegistryUnreachable {
                registry: "r".into(),
                v2: "a".into(),
                v1: "b".into(),
            }
            .exit_code(),
            DrmError::ImageRetrieval {
                image: "ruby".into(),
                reason: "boom".into(),
            }
            .exit_code(),
            DrmError::SandboxUnavailable {
                reason: "gone".into(),
            }
            .exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
    }

    #[test]
    fn test_exit_code_for_wrapped_error() {
        let err: anyhow::Error = DrmError::SandboxUnavailable {
            reason: "gone".into(),
        }
        .into();
        let err = Err::<(), _>(err).context("while running").unwrap_err();
        assert_eq!(exit_code_for(&err), 5);
    }

    #[test]
    fn test_exit_code_for_untyped_error() {
        assert_eq!(exit_code_for(&anyhow::anyhow!("plain")), 1);
    }
}
