//! Container runtime capability.
//!
//! Resolution and reconciliation only ever talk to a `ContainerRuntime`. Two
//! transports implement it: the `docker`/`podman` CLI, and the Docker Engine API.

mod cli;
mod engine;
#[cfg(test)]
pub mod fake;

use anyhow::Result;
use std::path::PathBuf;

use crate::config::{Config, Transport};

pub use self::cli::CliRuntime;
pub use self::engine::EngineRuntime;

/// A container as reported by a name-filtered listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub name: String,
    pub image: String,
}

/// Listing filter: exact container name, optionally restricted to running containers.
#[derive(Debug, Clone, Copy)]
pub struct ContainerFilter<'a> {
    pub name: &'a str,
    pub running_only: bool,
}

/// Everything needed to create a sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub workdir: PathBuf,
    /// (host path, container path) bind mounts
    pub binds: Vec<(PathBuf, PathBuf)>,
    pub command: Vec<String>,
    pub network: Option<String>,
}

/// An exec session inside a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub command: Vec<String>,
    /// Forward stdin to the session
    pub interactive: bool,
    /// Allocate a pseudo-terminal
    pub tty: bool,
}

/// Operations drm needs from a container runtime.
///
/// Every call blocks until the runtime answers. None of them retries.
pub trait ContainerRuntime {
    /// Short label for logs ("docker", "podman", "engine")
    fn name(&self) -> &str;

    // ── Images ───────────────────────────────────────────────────────

    /// List local images as `repository:tag` references
    fn list_images(&self) -> Result<Vec<String>>;

    /// Pull an image into the local index
    fn pull_image(&self, image: &str) -> Result<()>;

    // ── Containers ───────────────────────────────────────────────────

    /// List containers whose name equals `filter.name`
    fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>>;

    /// Create (but do not start) a container
    fn create_container(&self, spec: &ContainerSpec) -> Result<()>;

    /// Start an existing container
    fn start_container(&self, name: &str) -> Result<()>;

    /// Remove a container, killing it first when `force` is set
    fn remove_container(&self, name: &str, force: bool) -> Result<()>;

    /// Run a command inside a container, streaming its output. Returns the exit code.
    fn exec(&self, container: &str, request: &ExecRequest) -> Result<i32>;
}

/// Build the runtime transport selected by the configuration.
pub fn connect(config: &Config) -> Result<Box<dyn ContainerRuntime>> {
    match config.transport() {
        Transport::Cli => Ok(Box::new(CliRuntime::new(config.runtime())?)),
        Transport::Engine => Ok(Box::new(EngineRuntime::connect()?)),
    }
}

/// Whether a local image reference matches a wanted one, treating a missing tag as `latest`.
pub fn image_ref_matches(candidate: &str, wanted: &str) -> bool {
    normalize_image_ref(candidate) == normalize_image_ref(wanted)
}

fn normalize_image_ref(reference: &str) -> String {
    let reference = reference
        .strip_prefix("docker.io/library/")
        .or_else(|| reference.strip_prefix("docker.io/"))
        .unwrap_or(reference);
    // A ':' after the last '/' is a tag; one before it is a registry port.
    let last_segment = reference.rsplit('/').next().unwrap_or(reference);
    if last_segment.contains(':') || last_segment.contains('@') {
        reference.to_string()
    } else {
        format!("{}:latest", reference)
    }
}
