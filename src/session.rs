//! Per-invocation state: the runtime transport, configuration and caller paths.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;
use crate::registry::{RegistryLocation, RegistryProbe};
use crate::runtime::{self, ContainerRuntime};
use crate::sandbox::SandboxContext;

pub struct Session {
    pub runtime: Box<dyn ContainerRuntime>,
    pub config: Config,
    pub home: PathBuf,
    pub cwd: PathBuf,
}

impl Session {
    /// Load configuration, apply a `--repo` override and connect to the runtime.
    pub fn open(repo_override: Option<&str>) -> Result<Self> {
        let mut config = Config::load()?;
        config.apply_repo_override(repo_override, None);

        let home = home::home_dir().context("Could not determine home directory")?;
        let cwd = std::env::current_dir().context("Could not determine current directory")?;
        let runtime = runtime::connect(&config)?;
        debug!(
            runtime = runtime.name(),
            repo = ?config.repo(),
            cwd = %cwd.display(),
            "session:opened"
        );

        Ok(Self {
            runtime,
            config,
            home,
            cwd,
        })
    }

    /// Registry client for the configured repository prefix and base image.
    pub fn registry(&self) -> Result<RegistryProbe> {
        RegistryProbe::new(RegistryLocation::for_prefix(
            self.config.repo(),
            self.config.base_image(),
            self.config.registry_url.as_deref(),
        ))
    }

    pub fn sandbox_context(&self) -> SandboxContext {
        SandboxContext {
            home: self.home.clone(),
            cwd: self.cwd.clone(),
            network: self.config.network.clone(),
        }
    }
}
