use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the configured repository prefix.
pub const REPO_ENV: &str = "DRM_REPO";

/// CLI binary used by the CLI transport
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Docker (default)
    #[default]
    Docker,
    /// Podman
    Podman,
}

impl RuntimeKind {
    pub fn binary(&self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
        }
    }
}

/// How drm talks to the container runtime
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Shell out to the runtime CLI (default)
    #[default]
    Cli,
    /// Docker Engine API (local socket, or DOCKER_HOST with optional TLS)
    Engine,
}

/// Configuration for drm, read from ~/.config/drm/config.yaml
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Registry repository prefix prepended to image names (e.g. "registry.local:5000/team")
    #[serde(default)]
    pub repo: Option<String>,

    /// Runtime binary for the CLI transport. Default: docker
    #[serde(default)]
    pub runtime: Option<RuntimeKind>,

    /// Runtime transport. Default: cli
    #[serde(default)]
    pub transport: Option<Transport>,

    /// Base image name. Default: ruby
    #[serde(default)]
    pub base_image: Option<String>,

    /// Shell started when no command is given. Default: /bin/bash
    #[serde(default)]
    pub shell: Option<String>,

    /// Network mode for newly created sandboxes
    #[serde(default)]
    pub network: Option<String>,

    /// Explicit registry base URL including scheme (overrides the host derived from `repo`)
    #[serde(default)]
    pub registry_url: Option<String>,
}

impl Config {
    pub fn runtime(&self) -> RuntimeKind {
        self.runtime.unwrap_or_default()
    }

    pub fn transport(&self) -> Transport {
        self.transport.unwrap_or_default()
    }

    pub fn base_image(&self) -> &str {
        self.base_image.as_deref().unwrap_or("ruby")
    }

    pub fn shell(&self) -> &str {
        self.shell.as_deref().unwrap_or("/bin/bash")
    }

    /// Configured repository prefix, ignoring empty strings.
    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref().filter(|r| !r.is_empty())
    }

    /// Load the global configuration and apply the `DRM_REPO` override.
    pub fn load() -> anyhow::Result<Self> {
        debug!("config:loading");
        let mut config = match global_config_path() {
            Some(path) => Self::load_from_path(&path)?.unwrap_or_default(),
            None => Self::default(),
        };
        config.apply_repo_override(None, std::env::var(REPO_ENV).ok());
        Ok(config)
    }

    /// Apply repository overrides. A CLI value wins over the environment value, which
    /// wins over the file. Empty values are ignored.
    pub fn apply_repo_override(&mut self, cli: Option<&str>, env: Option<String>) {
        if let Some(repo) = cli.filter(|r| !r.is_empty()) {
            self.repo = Some(repo.to_string());
        } else if let Some(repo) = env.filter(|r| !r.is_empty()) {
            self.repo = Some(repo);
        }
    }

    fn load_from_path(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config at {}: {}", path.display(), e))?;
        Ok(Some(config))
    }
}

/// Locate the global config file, preferring `$XDG_CONFIG_HOME` over `~/.config`.
fn global_config_path() -> Option<PathBuf> {
    let config_dir = match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join("drm"),
        _ => home::home_dir()?.join(".config").join("drm"),
    };
    let yaml = config_dir.join("config.yaml");
    if yaml.exists() {
        return Some(yaml);
    }
    let yml = config_dir.join("config.yml");
    if yml.exists() {
        return Some(yml);
    }
    Some(yaml)
}
