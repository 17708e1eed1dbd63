//! `drm ls`: show the versions available in the local image index.

use anyhow::Result;
use console::style;

use crate::image::{ImageReference, local_versions};
use crate::session::Session;
use crate::shell::FULL_IMAGE_NAME_VAR;

pub fn run(repo: Option<&str>) -> Result<i32> {
    let session = Session::open(repo)?;
    let base_image = session.config.base_image();
    let prefix = session.config.repo();
    let versions = local_versions(session.runtime.as_ref(), base_image, prefix)?;

    let repository = ImageReference::new(base_image.to_string(), prefix).fully_qualified_name;
    if versions.is_empty() {
        eprintln!(
            "No local versions of {}. Install one with {}",
            style(&repository).bold(),
            style("drm install <version>").cyan()
        );
        return Ok(0);
    }

    let active = std::env::var(FULL_IMAGE_NAME_VAR).ok();
    for line in format_versions(&repository, &versions, active.as_deref()) {
        println!("{}", line);
    }
    Ok(0)
}

/// One line per version; the active one is marked with `*`.
fn format_versions(repository: &str, versions: &[String], active: Option<&str>) -> Vec<String> {
    versions
        .iter()
        .map(|version| {
            let image = format!("{}:{}", repository, version);
            if active == Some(image.as_str()) {
                format!("* {}", style(version).green().bold())
            } else {
                format!("  {}", version)
            }
        })
        .collect()
}
