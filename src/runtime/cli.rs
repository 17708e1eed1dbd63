//! Docker/Podman CLI transport.

use anyhow::{Context, Result};
use tracing::debug;

use super::{ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, ExecRequest};
use crate::cmd::Cmd;
use crate::config::RuntimeKind;
use crate::spinner;

/// Drives the runtime by invoking its command-line client.
pub struct CliRuntime {
    binary: &'static str,
}

impl CliRuntime {
    /// Fails if the runtime binary is not on PATH.
    pub fn new(kind: RuntimeKind) -> Result<Self> {
        let binary = kind.binary();
        which::which(binary)
            .with_context(|| format!("'{}' not found in PATH; is it installed?", binary))?;
        Ok(Self { binary })
    }
}

impl ContainerRuntime for CliRuntime {
    fn name(&self) -> &str {
        self.binary
    }

    fn list_images(&self) -> Result<Vec<String>> {
        let stdout = Cmd::new(self.binary)
            .args(&["images", "--format", "{{.Repository}}:{{.Tag}}"])
            .run_and_capture_stdout()?;
        Ok(parse_image_lines(&stdout))
    }

    fn pull_image(&self, image: &str) -> Result<()> {
        let cmd = Cmd::new(self.binary).args(&["pull", image]).into_command();
        spinner::with_streaming_command(&format!("Pulling {}", image), cmd)
    }

    fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>> {
        let args = build_ps_args(filter);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = Cmd::new(self.binary).args(&args).run_and_capture_stdout()?;
        Ok(parse_container_lines(&stdout, filter.name))
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        let args = build_create_args(spec);
        debug!(runtime = self.binary, args = ?args, "creating container");
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Cmd::new(self.binary).args(&args).run()?;
        Ok(())
    }

    fn start_container(&self, name: &str) -> Result<()> {
        Cmd::new(self.binary).args(&["start", name]).run()?;
        Ok(())
    }

    fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        let mut cmd = Cmd::new(self.binary).arg("rm");
        if force {
            cmd = cmd.arg("-f");
        }
        cmd.arg(name).run()?;
        Ok(())
    }

    fn exec(&self, container: &str, request: &ExecRequest) -> Result<i32> {
        let args = build_exec_args(container, request);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Cmd::new(self.binary)
            .args(&args)
            .run_attached(request.interactive)
    }
}

/// Parse `repository:tag` lines, skipping dangling `<none>` entries.
fn parse_image_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.contains("<none>"))
        .map(str::to_string)
        .collect()
}

fn build_ps_args(filter: &ContainerFilter) -> Vec<String> {
    let mut args = vec!["ps".to_string()];
    if !filter.running_only {
        args.push("-a".to_string());
    }
    args.push("--filter".to_string());
    args.push(format!("name={}", filter.name));
    if filter.running_only {
        args.push("--filter".to_string());
        args.push("status=running".to_string());
    }
    args.push("--format".to_string());
    args.push("{{.Names}}\t{{.Image}}".to_string());
    args
}

/// Parse `name<TAB>image` lines. The runtime's name filter matches substrings,
/// so only exact name matches are kept.
fn parse_container_lines(stdout: &str, name: &str) -> Vec<ContainerSummary> {
    stdout
        .lines()
        .filter_map(|line| {
            let (names, image) = line.trim().split_once('\t')?;
            names
                .split(',')
                .any(|n| n.trim_start_matches('/') == name)
                .then(|| ContainerSummary {
                    name: name.to_string(),
                    image: image.trim().to_string(),
                })
        })
        .collect()
}

fn build_create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];

    for (host, guest) in &spec.binds {
        args.push("-v".to_string());
        args.push(format!("{}:{}", host.display(), guest.display()));
    }

    args.push("-w".to_string());
    args.push(spec.workdir.display().to_string());

    if let Some(network) = &spec.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

fn build_exec_args(container: &str, request: &ExecRequest) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if request.interactive {
        args.push("-i".to_string());
    }
    if request.tty {
        args.push("-t".to_string());
    }
    args.push(container.to_string());
    args.extend(request.command.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_spec() -> ContainerSpec {
        ContainerSpec {
            name: "drm_3.1_team".to_string(),
            image: "ruby:3.1".to_string(),
            workdir: PathBuf::from("/home/dev/app"),
            binds: vec![(PathBuf::from("/home/dev"), PathBuf::from("/home/dev"))],
            command: vec!["sleep".to_string(), "infinity".to_string()],
            network: None,
        }
    }

    #[test]
    fn test_parse_image_lines() {
        let out = "ruby:3.1\nruby:latest\n<none>:<none>\n\nregistry.local:5000/ruby:2.7\n";
        assert_eq!(
            parse_image_lines(out),
            vec!["ruby:3.1", "ruby:latest", "registry.local:5000/ruby:2.7"]
        );
    }

    #[test]
    fn test_parse_image_lines_empty() {
        assert!(parse_image_lines("").is_empty());
    }

    #[test]
    fn test_parse_container_lines_exact_match_only() {
        let out = "drm_3.1_default\truby:3.1\ndrm_3.1_default_old\truby:3.1\n";
        let parsed = parse_container_lines(out, "drm_3.1_default");
        assert_eq!(
            parsed,
            vec![ContainerSummary {
                name: "drm_3.1_default".to_string(),
                image: "ruby:3.1".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_container_lines_none() {
        assert!(parse_container_lines("", "drm_3.1_default").is_empty());
    }

    #[test]
    fn test_ps_args_all() {
        let args = build_ps_args(&ContainerFilter {
            name: "drm_x",
            running_only: false,
        });
        assert_eq!(args[..4], ["ps", "-a", "--filter", "name=drm_x"]);
        assert!(!args.iter().any(|a| a == "status=running"));
    }

    #[test]
    fn test_ps_args_running() {
        let args = build_ps_args(&ContainerFilter {
            name: "drm_x",
            running_only: true,
        });
        assert!(!args.iter().any(|a| a == "-a"));
        assert!(args.iter().any(|a| a == "status=running"));
    }

    #[test]
    fn test_create_args() {
        let args = build_create_args(&make_spec()).join(" ");
        assert!(args.starts_with("create --name drm_3.1_team"));
        assert!(args.contains("-v /home/dev:/home/dev"));
        assert!(args.contains("-w /home/dev/app"));
        assert!(args.ends_with("ruby:3.1 sleep infinity"));
        assert!(!args.contains("--network"));
    }

    #[test]
    fn test_create_args_with_network() {
        let spec = ContainerSpec {
            network: Some("host".to_string()),
            ..make_spec()
        };
        let args = build_create_args(&spec).join(" ");
        assert!(args.contains("--network host ruby:3.1"));
    }

    #[test]
    fn test_exec_args_interactive() {
        let request = ExecRequest {
            command: vec!["/bin/bash".to_string()],
            interactive: true,
            tty: true,
        };
        assert_eq!(
            build_exec_args("drm_x", &request),
            vec!["exec", "-i", "-t", "drm_x", "/bin/bash"]
        );
    }

    #[test]
    fn test_exec_args_one_shot() {
        let request = ExecRequest {
            command: vec!["ruby".to_string(), "-v".to_string()],
            interactive: false,
            tty: false,
        };
        assert_eq!(
            build_exec_args("drm_x", &request),
            vec!["exec", "drm_x", "ruby", "-v"]
        );
    }
}
