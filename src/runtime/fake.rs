//! In-memory runtime that records every call, for tests.

use anyhow::{Result, bail};
use std::cell::RefCell;
use std::collections::HashMap;

use super::{
    ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, ExecRequest,
    image_ref_matches,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListImages,
    Pull(String),
    ListContainers { name: String, running_only: bool },
    Create(ContainerSpec),
    Start(String),
    Remove { name: String, force: bool },
    Exec { container: String, request: ExecRequest },
}

impl Call {
    /// Whether this call changes runtime state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Pull(_) | Call::Create(_) | Call::Start(_) | Call::Remove { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct FakeContainer {
    image: String,
    running: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    images: Vec<String>,
    containers: HashMap<String, FakeContainer>,
    image_index_unreachable: bool,
    pull_fails: bool,
    pull_lands: bool,
    start_keeps_stopped: bool,
    start_error: Option<String>,
    remove_fails: bool,
    create_fails: bool,
    exec_exit_code: i32,
}

pub struct FakeRuntime {
    state: RefCell<FakeState>,
    calls: RefCell<Vec<Call>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(FakeState {
                pull_lands: true,
                ..FakeState::default()
            }),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_image(self, image: &str) -> Self {
        self.state.borrow_mut().images.push(image.to_string());
        self
    }

    pub fn with_container(self, name: &str, image: &str, running: bool) -> Self {
        self.state.borrow_mut().containers.insert(
            name.to_string(),
            FakeContainer {
                image: image.to_string(),
                running,
            },
        );
        self
    }

    pub fn with_unreachable_image_index(self) -> Self {
        self.state.borrow_mut().image_index_unreachable = true;
        self
    }

    pub fn with_failing_pull(self) -> Self {
        self.state.borrow_mut().pull_fails = true;
        self
    }

    /// Pulls report success but the image never shows up locally.
    pub fn with_pull_not_landing(self) -> Self {
        self.state.borrow_mut().pull_lands = false;
        self
    }

    /// Starts report success but the container stays stopped.
    pub fn with_broken_start(self) -> Self {
        self.state.borrow_mut().start_keeps_stopped = true;
        self
    }

    /// Starts fail with `message` and the container stays stopped.
    pub fn with_failing_start(self, message: &str) -> Self {
        self.state.borrow_mut().start_error = Some(message.to_string());
        self
    }

    /// Removals fail and the container stays in place.
    pub fn with_failing_remove(self) -> Self {
        self.state.borrow_mut().remove_fails = true;
        self
    }

    pub fn with_failing_create(self) -> Self {
        self.state.borrow_mut().create_fails = true;
        self
    }

    pub fn with_exec_exit_code(self, code: i32) -> Self {
        self.state.borrow_mut().exec_exit_code = code;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn mutation_count(&self) -> usize {
        self.count(Call::is_mutation)
    }

    pub fn reset_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.state.borrow().containers.contains_key(name)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    fn list_images(&self) -> Result<Vec<String>> {
        self.record(Call::ListImages);
        let state = self.state.borrow();
        if state.image_index_unreachable {
            bail!("Cannot connect to the Docker daemon");
        }
        Ok(state.images.clone())
    }

    fn pull_image(&self, image: &str) -> Result<()> {
        self.record(Call::Pull(image.to_string()));
        let mut state = self.state.borrow_mut();
        if state.pull_fails {
            bail!("pull access denied for {}", image);
        }
        if state.pull_lands && !state.images.iter().any(|i| image_ref_matches(i, image)) {
            state.images.push(image.to_string());
        }
        Ok(())
    }

    fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>> {
        self.record(Call::ListContainers {
            name: filter.name.to_string(),
            running_only: filter.running_only,
        });
        let state = self.state.borrow();
        Ok(state
            .containers
            .get(filter.name)
            .filter(|c| !filter.running_only || c.running)
            .map(|c| ContainerSummary {
                name: filter.name.to_string(),
                image: c.image.clone(),
            })
            .into_iter()
            .collect())
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        self.record(Call::Create(spec.clone()));
        let mut state = self.state.borrow_mut();
        if state.create_fails {
            bail!("Conflict. The container name is already in use");
        }
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                image: spec.image.clone(),
                running: false,
            },
        );
        Ok(())
    }

    fn start_container(&self, name: &str) -> Result<()> {
        self.record(Call::Start(name.to_string()));
        let mut state = self.state.borrow_mut();
        if let Some(message) = &state.start_error {
            bail!("Error response from daemon: {}", message);
        }
        let keep_stopped = state.start_keeps_stopped;
        match state.containers.get_mut(name) {
            Some(container) => {
                container.running = !keep_stopped;
                Ok(())
            }
            None => bail!("No such container: {}", name),
        }
    }

    fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        self.record(Call::Remove {
            name: name.to_string(),
            force,
        });
        let mut state = self.state.borrow_mut();
        if state.remove_fails {
            bail!("removal of container {} is already in progress", name);
        }
        state.containers.remove(name);
        Ok(())
    }

    fn exec(&self, container: &str, request: &ExecRequest) -> Result<i32> {
        self.record(Call::Exec {
            container: container.to_string(),
            request: request.clone(),
        });
        Ok(self.state.borrow().exec_exit_code)
    }
}
