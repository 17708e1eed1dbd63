//! `drm install`: make a version's image available locally without starting a sandbox.

use anyhow::Result;
use console::style;

use crate::image::Resolver;
use crate::session::Session;
use crate::version::VersionRequest;

pub fn run(version: &str, repo: Option<&str>) -> Result<i32> {
    let request = VersionRequest::parse(version);
    let session = Session::open(repo)?;
    let registry = session.registry()?;

    let image = Resolver::new(
        session.runtime.as_ref(),
        &registry,
        session.config.base_image(),
    )
    .resolve(&request, session.config.repo())?;

    eprintln!(
        "{} {} is installed",
        style("✓").green(),
        style(&image.fully_qualified_name).bold()
    );
    Ok(0)
}
