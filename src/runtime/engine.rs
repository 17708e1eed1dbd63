//! Docker Engine API transport.
//!
//! Uses bollard on a private current-thread tokio runtime so the rest of drm stays
//! synchronous. Connects through `DOCKER_HOST` (or the local socket) and switches to
//! HTTPS with client certificates when `DOCKER_CERT_PATH` is set.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bollard::container::LogOutput;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ContainerSummary as EngineContainer, ExecConfig, HostConfig,
};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, ListContainersOptionsBuilder,
    ListImagesOptionsBuilder, RemoveContainerOptionsBuilder, StartContainerOptions,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, ExecRequest};
use crate::spinner;

/// Request timeout handed to bollard. Calls are meant to block for as long as the
/// daemon takes, so this is set far beyond any realistic session.
const CLIENT_TIMEOUT_SECS: u64 = 60 * 60 * 24 * 365;

pub struct EngineRuntime {
    docker: Docker,
    rt: Option<tokio::runtime::Runtime>,
}

impl EngineRuntime {
    pub fn connect() -> Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime for the Docker Engine client")?;
        let _guard = rt.enter();

        let host = std::env::var("DOCKER_HOST").ok().filter(|h| !h.is_empty());
        let cert_path = std::env::var("DOCKER_CERT_PATH")
            .ok()
            .filter(|p| !p.is_empty());

        let docker = match (host, cert_path) {
            (Some(host), Some(cert_path)) => {
                let dir = PathBuf::from(cert_path);
                let addr = host.strip_prefix("tcp://").unwrap_or(&host);
                debug!(addr, certs = %dir.display(), "engine:connecting with TLS");
                Docker::connect_with_ssl(
                    addr,
                    &dir.join("key.pem"),
                    &dir.join("cert.pem"),
                    &dir.join("ca.pem"),
                    CLIENT_TIMEOUT_SECS,
                    API_DEFAULT_VERSION,
                )
            }
            _ => {
                debug!("engine:connecting with local defaults");
                Docker::connect_with_local_defaults()
            }
        }
        .context("Failed to connect to the Docker Engine API")?
        .with_timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS));

        Ok(Self {
            docker,
            rt: Some(rt),
        })
    }

    fn block_on<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        match &self.rt {
            Some(rt) => rt.block_on(future),
            None => anyhow::bail!("Docker Engine client is shut down"),
        }
    }
}

impl Drop for EngineRuntime {
    fn drop(&mut self) {
        // A stdin forwarder may still be parked on a blocking read.
        if let Some(rt) = self.rt.take() {
            rt.shutdown_background();
        }
    }
}

impl ContainerRuntime for EngineRuntime {
    fn name(&self) -> &str {
        "engine"
    }

    fn list_images(&self) -> Result<Vec<String>> {
        self.block_on(async {
            let images = self
                .docker
                .list_images(Some(ListImagesOptionsBuilder::new().all(false).build()))
                .await
                .context("Failed to list images")?;
            Ok(images
                .into_iter()
                .flat_map(|image| image.repo_tags)
                .filter(|tag| !tag.contains("<none>"))
                .collect())
        })
    }

    fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = split_image_tag(image);
        spinner::with_spinner(&format!("Pulling {}", image), |pb| {
            self.block_on(async {
                let options = CreateImageOptionsBuilder::new()
                    .from_image(from_image)
                    .tag(tag)
                    .build();
                let mut progress =
                    std::pin::pin!(self.docker.create_image(Some(options), None, None));
                while let Some(info) = progress.next().await {
                    let info = info.with_context(|| format!("Failed to pull {}", image))?;
                    if let Some(status) = info.status {
                        pb.set_message(format!("Pulling {}: {}", image, status));
                    }
                }
                Ok(())
            })
        })
    }

    fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>> {
        let filters = container_filters(filter);
        let options = ListContainersOptionsBuilder::new()
            .all(!filter.running_only)
            .filters(&filters)
            .build();

        self.block_on(async {
            let containers = self
                .docker
                .list_containers(Some(options))
                .await
                .context("Failed to list containers")?;
            Ok(exact_matches(containers, filter.name))
        })
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        let body = create_body(spec);
        let options = CreateContainerOptionsBuilder::new().name(&spec.name).build();

        self.block_on(async {
            let response = self
                .docker
                .create_container(Some(options), body)
                .await
                .with_context(|| format!("Failed to create container {}", spec.name))?;
            for warning in response.warnings {
                warn!(container = %spec.name, %warning, "engine:create warning");
            }
            Ok(())
        })
    }

    fn start_container(&self, name: &str) -> Result<()> {
        self.block_on(async {
            self.docker
                .start_container(name, None::<StartContainerOptions>)
                .await
                .with_context(|| format!("Failed to start container {}", name))
        })
    }

    fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::new().force(force).build();
        self.block_on(async {
            self.docker
                .remove_container(name, Some(options))
                .await
                .with_context(|| format!("Failed to remove container {}", name))
        })
    }

    fn exec(&self, container: &str, request: &ExecRequest) -> Result<i32> {
        let config = exec_config(request);

        self.block_on(async {
            let exec = self
                .docker
                .create_exec(container, config)
                .await
                .with_context(|| format!("Failed to create exec session in {}", container))?;

            let _raw = if request.tty {
                Some(RawModeGuard::enable()?)
            } else {
                None
            };

            let started = self
                .docker
                .start_exec(
                    &exec.id,
                    Some(StartExecOptions {
                        detach: false,
                        tty: request.tty,
                        output_capacity: None,
                    }),
                )
                .await
                .context("Failed to attach to exec session")?;

            if let StartExecResults::Attached {
                mut output,
                mut input,
            } = started
            {
                if request.interactive {
                    tokio::spawn(async move {
                        let mut stdin = tokio::io::stdin();
                        let _ = tokio::io::copy(&mut stdin, &mut input).await;
                    });
                }

                let mut stdout = tokio::io::stdout();
                let mut stderr = tokio::io::stderr();
                while let Some(chunk) = output.next().await {
                    match chunk.context("Exec stream failed")? {
                        LogOutput::StdErr { message } => {
                            stderr.write_all(&message).await?;
                            stderr.flush().await?;
                        }
                        other => {
                            stdout.write_all(&other.into_bytes()).await?;
                            stdout.flush().await?;
                        }
                    }
                }
            }

            let inspect = self
                .docker
                .inspect_exec(&exec.id)
                .await
                .context("Failed to read exec exit status")?;
            Ok(inspect.exit_code.map(|c| c as i32).unwrap_or(0))
        })
    }
}

/// Puts the local terminal in raw mode for the lifetime of a TTY session.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode().context("Failed to enable raw terminal mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

fn container_filters(filter: &ContainerFilter) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    filters.insert("name".to_string(), vec![filter.name.to_string()]);
    if filter.running_only {
        filters.insert("status".to_string(), vec!["running".to_string()]);
    }
    filters
}

/// The engine's name filter matches substrings and reports names with a leading
/// '/', so only exact matches survive.
fn exact_matches(containers: Vec<EngineContainer>, name: &str) -> Vec<ContainerSummary> {
    containers
        .into_iter()
        .filter(|c| {
            c.names
                .iter()
                .flatten()
                .any(|n| n.trim_start_matches('/') == name)
        })
        .map(|c| ContainerSummary {
            name: name.to_string(),
            image: c.image.unwrap_or_default(),
        })
        .collect()
}

fn create_body(spec: &ContainerSpec) -> ContainerCreateBody {
    let binds = spec
        .binds
        .iter()
        .map(|(host, guest)| format!("{}:{}", host.display(), guest.display()))
        .collect();
    ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        working_dir: Some(spec.workdir.display().to_string()),
        host_config: Some(HostConfig {
            binds: Some(binds),
            network_mode: spec.network.clone(),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

fn exec_config(request: &ExecRequest) -> ExecConfig {
    ExecConfig {
        attach_stdin: Some(request.interactive),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(request.tty),
        cmd: Some(request.command.clone()),
        ..ExecConfig::default()
    }
}

/// Split `name[:tag]` into its name and tag, defaulting to `latest`.
/// A ':' before the last '/' belongs to a registry port, not a tag.
fn split_image_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}
