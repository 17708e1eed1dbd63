//! `drm run`: execute a command in the sandbox selected by `drm use`.

use std::io::IsTerminal;

use anyhow::Result;
use tracing::debug;

use crate::sandbox;
use crate::session::Session;
use crate::shell::{CONTAINER_NAME_VAR, FULL_IMAGE_NAME_VAR, IMAGE_NAME_VAR};

pub fn run(command: Vec<String>) -> Result<i32> {
    let container = std::env::var(CONTAINER_NAME_VAR).ok();
    debug!(
        container = ?container,
        image = ?std::env::var(IMAGE_NAME_VAR).ok(),
        full_image = ?std::env::var(FULL_IMAGE_NAME_VAR).ok(),
        "run:selected sandbox"
    );

    let container = sandbox::selected_container(container.as_deref())?;

    let session = Session::open(None)?;
    let request = sandbox::exec_request(
        command,
        session.config.shell(),
        std::io::stdin().is_terminal(),
    );
    sandbox::dispatch(session.runtime.as_ref(), Some(container), &request)
}
