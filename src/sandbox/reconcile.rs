//! Drive a sandbox container to the running state.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::identity::SandboxIdentity;
use crate::error::DrmError;
use crate::image::ImageReference;
use crate::runtime::{ContainerFilter, ContainerRuntime, ContainerSpec, image_ref_matches};

/// Entry command that keeps an idle sandbox alive between exec sessions.
const KEEP_ALIVE: [&str; 2] = ["sleep", "infinity"];

/// What the runtime reports about a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SandboxObservedState {
    pub exists: bool,
    pub running: bool,
    /// The container was created from the resolved image
    pub image_matches: bool,
}

/// Caller environment a new sandbox is created in.
#[derive(Debug, Clone)]
pub struct SandboxContext {
    pub home: PathBuf,
    pub cwd: PathBuf,
    pub network: Option<String>,
}

impl SandboxContext {
    fn container_spec(&self, identity: &SandboxIdentity, image: &ImageReference) -> ContainerSpec {
        ContainerSpec {
            name: identity.name.clone(),
            image: image.fully_qualified_name.clone(),
            workdir: self.cwd.clone(),
            binds: vec![(self.home.clone(), self.home.clone())],
            command: KEEP_ALIVE.iter().map(|s| s.to_string()).collect(),
            network: self.network.clone(),
        }
    }
}

/// Query the runtime for the sandbox's existence, liveness and image.
pub fn observe(
    runtime: &dyn ContainerRuntime,
    identity: &SandboxIdentity,
    image: &ImageReference,
) -> Result<SandboxObservedState> {
    let all = runtime
        .list_containers(&ContainerFilter {
            name: &identity.name,
            running_only: false,
        })
        .with_context(|| format!("Failed to look up container {}", identity))?;
    let Some(container) = all.iter().find(|c| c.name == identity.name) else {
        return Ok(SandboxObservedState::default());
    };

    let running = !runtime
        .list_containers(&ContainerFilter {
            name: &identity.name,
            running_only: true,
        })
        .with_context(|| format!("Failed to check whether {} is running", identity))?
        .is_empty();

    Ok(SandboxObservedState {
        exists: true,
        running,
        image_matches: image_ref_matches(&container.image, &image.fully_qualified_name),
    })
}

/// Make sure the sandbox exists and is running.
///
/// At most one create-or-start attempt is made. If the container is still not
/// running afterwards it is force-removed once and the call fails with
/// `SandboxUnavailable`; the next invocation recreates it from scratch.
pub fn ensure_running(
    runtime: &dyn ContainerRuntime,
    identity: &SandboxIdentity,
    image: &ImageReference,
    context: &SandboxContext,
) -> Result<()> {
    let state = observe(runtime, identity, image).map_err(unavailable)?;
    debug!(container = %identity, ?state, "reconcile:observed");

    if state.running {
        if !state.image_matches {
            warn!(
                container = %identity,
                image = %image.fully_qualified_name,
                "reconcile:running sandbox was created from a different image"
            );
        }
        info!(container = %identity, "reconcile:already running");
        return Ok(());
    }

    if !state.exists {
        info!(container = %identity, image = %image.fully_qualified_name, "reconcile:creating");
        runtime
            .create_container(&context.container_spec(identity, image))
            .map_err(unavailable)?;
    }

    info!(container = %identity, "reconcile:starting");
    let start_error = runtime.start_container(&identity.name).err().map(|e| {
        warn!(container = %identity, error = %format!("{:#}", e), "reconcile:start failed");
        format!("{:#}", e)
    });

    let state = observe(runtime, identity, image).map_err(unavailable)?;
    if state.running {
        info!(container = %identity, "reconcile:running");
        return Ok(());
    }

    warn!(container = %identity, "reconcile:not running after start, removing");
    let removal_error = runtime.remove_container(&identity.name, true).err().map(|e| {
        warn!(container = %identity, error = %format!("{:#}", e), "reconcile:removal failed");
        format!("{:#}", e)
    });
    Err(DrmError::SandboxUnavailable {
        reason: self_heal_reason(identity, start_error.as_deref(), removal_error.as_deref()),
    }
    .into())
}

/// Failure message after the self-heal removal, naming why the start failed and
/// whether the broken container is gone.
fn self_heal_reason(
    identity: &SandboxIdentity,
    start_error: Option<&str>,
    removal_error: Option<&str>,
) -> String {
    let mut reason = format!("container {} did not reach the running state", identity);
    if let Some(e) = start_error {
        reason.push_str(&format!(" (start failed: {})", e));
    }
    match removal_error {
        None => reason.push_str("; it was removed, run the command again to recreate it"),
        Some(e) => reason.push_str(&format!(
            "; it could not be removed: {}. Remove it manually before retrying",
            e
        )),
    }
    reason
}

fn unavailable(err: anyhow::Error) -> anyhow::Error {
    DrmError::SandboxUnavailable {
        reason: format!("{:#}", err),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::{Call, FakeRuntime};

    const NAME: &str = "drm_3.1_team";

    fn identity() -> SandboxIdentity {
        SandboxIdentity::derive("3.1", "team", None)
    }

    fn image() -> ImageReference {
        ImageReference::new("ruby:3.1".to_string(), None)
    }

    fn context() -> SandboxContext {
        SandboxContext {
            home: PathBuf::from("/home/dev"),
            cwd: PathBuf::from("/home/dev/app"),
            network: None,
        }
    }

    fn creates(rt: &FakeRuntime) -> usize {
        rt.count(|c| matches!(c, Call::Create(_)))
    }

    fn starts(rt: &FakeRuntime) -> usize {
        rt.count(|c| matches!(c, Call::Start(_)))
    }

    fn removes(rt: &FakeRuntime) -> usize {
        rt.count(|c| matches!(c, Call::Remove { .. }))
    }

    #[test]
    fn observe_absent() {
        let rt = FakeRuntime::new();
        let state = observe(&rt, &identity(), &image()).unwrap();
        assert_eq!(state, SandboxObservedState::default());
    }

    #[test]
    fn observe_stopped_with_other_image() {
        let rt = FakeRuntime::new().with_container(NAME, "ruby:3.0", false);
        let state = observe(&rt, &identity(), &image()).unwrap();
        assert!(state.exists);
        assert!(!state.running);
        assert!(!state.image_matches);
    }

    #[test]
    fn absent_sandbox_is_created_and_started() {
        let rt = FakeRuntime::new();
        ensure_running(&rt, &identity(), &image(), &context()).unwrap();

        assert_eq!(creates(&rt), 1);
        assert_eq!(starts(&rt), 1);
        assert_eq!(removes(&rt), 0);

        let spec = rt
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Create(spec) => Some(spec),
                _ => None,
            })
            .unwrap();
        assert_eq!(spec.name, NAME);
        assert_eq!(spec.image, "ruby:3.1");
        assert_eq!(spec.workdir, PathBuf::from("/home/dev/app"));
        assert_eq!(
            spec.binds,
            vec![(PathBuf::from("/home/dev"), PathBuf::from("/home/dev"))]
        );
        assert_eq!(spec.command, vec!["sleep", "infinity"]);
    }

    #[test]
    fn network_mode_is_passed_to_create() {
        let rt = FakeRuntime::new();
        let ctx = SandboxContext {
            network: Some("host".to_string()),
            ..context()
        };
        ensure_running(&rt, &identity(), &image(), &ctx).unwrap();
        assert!(rt.calls().iter().any(|c| matches!(
            c,
            Call::Create(spec) if spec.network.as_deref() == Some("host")
        )));
    }

    #[test]
    fn second_call_on_running_sandbox_is_a_no_op() {
        let rt = FakeRuntime::new();
        ensure_running(&rt, &identity(), &image(), &context()).unwrap();
        rt.reset_calls();

        ensure_running(&rt, &identity(), &image(), &context()).unwrap();
        assert_eq!(creates(&rt), 0);
        assert_eq!(starts(&rt), 0);
        assert_eq!(rt.mutation_count(), 0);
    }

    #[test]
    fn stopped_sandbox_is_started_without_create() {
        let rt = FakeRuntime::new().with_container(NAME, "ruby:3.1", false);
        ensure_running(&rt, &identity(), &image(), &context()).unwrap();
        assert_eq!(creates(&rt), 0);
        assert_eq!(starts(&rt), 1);
    }

    fn unavailable_reason(err: &anyhow::Error) -> String {
        match err.downcast_ref::<DrmError>() {
            Some(DrmError::SandboxUnavailable { reason }) => reason.clone(),
            other => panic!("expected SandboxUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn unstartable_sandbox_is_removed_once() {
        let rt = FakeRuntime::new()
            .with_container(NAME, "ruby:3.1", false)
            .with_failing_start("error mounting /home/dev: no such file or directory");
        let err = ensure_running(&rt, &identity(), &image(), &context()).unwrap_err();

        let reason = unavailable_reason(&err);
        assert!(reason.contains("start failed"));
        assert!(reason.contains("error mounting /home/dev"));
        assert!(reason.contains("it was removed"));
        assert_eq!(starts(&rt), 1);
        assert_eq!(
            rt.count(|c| *c
                == Call::Remove {
                    name: NAME.to_string(),
                    force: true
                }),
            1
        );
        assert!(!rt.container_exists(NAME));
    }

    #[test]
    fn silently_stopped_sandbox_reports_removal() {
        let rt = FakeRuntime::new()
            .with_container(NAME, "ruby:3.1", false)
            .with_broken_start();
        let err = ensure_running(&rt, &identity(), &image(), &context()).unwrap_err();

        let reason = unavailable_reason(&err);
        assert!(!reason.contains("start failed"));
        assert!(reason.contains("it was removed"));
        assert_eq!(removes(&rt), 1);
    }

    #[test]
    fn failed_removal_is_reported() {
        let rt = FakeRuntime::new()
            .with_container(NAME, "ruby:3.1", false)
            .with_broken_start()
            .with_failing_remove();
        let err = ensure_running(&rt, &identity(), &image(), &context()).unwrap_err();

        let reason = unavailable_reason(&err);
        assert!(reason.contains("could not be removed"));
        assert!(reason.contains("is already in progress"));
        assert!(!reason.contains("it was removed"));
        assert_eq!(removes(&rt), 1);
        assert!(rt.container_exists(NAME));
    }

    #[test]
    fn unstartable_new_sandbox_is_removed_once() {
        let rt = FakeRuntime::new().with_broken_start();
        let err = ensure_running(&rt, &identity(), &image(), &context()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DrmError>(),
            Some(DrmError::SandboxUnavailable { .. })
        ));
        assert_eq!(creates(&rt), 1);
        assert_eq!(starts(&rt), 1);
        assert_eq!(removes(&rt), 1);
    }

    #[test]
    fn invocation_after_self_heal_recreates() {
        let rt = FakeRuntime::new()
            .with_container(NAME, "ruby:3.1", false)
            .with_broken_start();
        assert!(ensure_running(&rt, &identity(), &image(), &context()).is_err());
        rt.reset_calls();

        let _ = ensure_running(&rt, &identity(), &image(), &context());
        assert_eq!(creates(&rt), 1);
    }

    #[test]
    fn failed_create_is_sandbox_unavailable() {
        let rt = FakeRuntime::new().with_failing_create();
        let err = ensure_running(&rt, &identity(), &image(), &context()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DrmError>(),
            Some(DrmError::SandboxUnavailable { .. })
        ));
        assert_eq!(starts(&rt), 0);
        assert_eq!(removes(&rt), 0);
    }

    #[test]
    fn running_sandbox_with_stale_image_is_left_alone() {
        let rt = FakeRuntime::new().with_container(NAME, "ruby:3.0", true);
        ensure_running(&rt, &identity(), &image(), &context()).unwrap();
        assert_eq!(rt.mutation_count(), 0);
    }
}
