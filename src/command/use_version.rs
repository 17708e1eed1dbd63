//! `drm use`: resolve a version, bring its sandbox up and print the env lines.

use std::io::IsTerminal;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::image::{ImageReference, Resolver};
use crate::registry::TagLookup;
use crate::runtime::ContainerRuntime;
use crate::sandbox::{self, SandboxContext, SandboxIdentity};
use crate::session::Session;
use crate::shell;
use crate::version::VersionRequest;

/// A sandbox ready for `drm run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub identity: SandboxIdentity,
    pub image: ImageReference,
}

pub fn run(version: Option<&str>, repo: Option<&str>, open_shell: bool) -> Result<i32> {
    let request = VersionRequest::parse(version.unwrap_or_default());
    let session = Session::open(repo)?;
    let registry = session.registry()?;

    let activation = activate(
        session.runtime.as_ref(),
        &registry,
        &session.config,
        &session.sandbox_context(),
        &request,
    )?;

    for line in shell::env_lines(&activation.identity, &activation.image) {
        println!("{}", line);
    }

    if !open_shell {
        return Ok(0);
    }
    let request = sandbox::exec_request(
        Vec::new(),
        session.config.shell(),
        std::io::stdin().is_terminal(),
    );
    sandbox::dispatch(
        session.runtime.as_ref(),
        Some(&activation.identity.name),
        &request,
    )
}

/// Resolve the image for `request`, derive its sandbox name and make sure the
/// sandbox is running.
pub fn activate(
    runtime: &dyn ContainerRuntime,
    registry: &dyn TagLookup,
    config: &Config,
    context: &SandboxContext,
    request: &VersionRequest,
) -> Result<Activation> {
    info!(version = %request.version, gemset = %request.gemset, "use:resolving");
    let image =
        Resolver::new(runtime, registry, config.base_image()).resolve(request, config.repo())?;

    let identity = SandboxIdentity::derive(&request.version, &request.gemset, config.repo());
    sandbox::ensure_running(runtime, &identity, &image, context)?;

    info!(
        container = %identity,
        image = %image.fully_qualified_name,
        prefix = ?image.repository_prefix,
        "use:ready"
    );
    Ok(Activation { identity, image })
}
