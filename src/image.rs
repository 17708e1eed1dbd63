//! Image references and version resolution.
//!
//! A version request becomes an image reference. The local image index is consulted
//! first; on a miss the registry decides whether the version exists, and a confirmed
//! hit is pulled once.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::error::DrmError;
use crate::registry::TagLookup;
use crate::runtime::{ContainerRuntime, image_ref_matches};
use crate::version::VersionRequest;

/// Tag probed in the registry when the base image is requested.
const BASE_TAG: &str = "latest";

/// An image name with and without its repository prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// `ruby` or `ruby:<version>`
    pub short_name: String,
    pub repository_prefix: Option<String>,
    /// `<prefix>/<short_name>`, or `short_name` without a prefix
    pub fully_qualified_name: String,
}

impl ImageReference {
    pub fn new(short_name: String, repository_prefix: Option<&str>) -> Self {
        let repository_prefix = repository_prefix
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let fully_qualified_name = match &repository_prefix {
            Some(prefix) => format!("{}/{}", prefix, short_name),
            None => short_name.clone(),
        };
        Self {
            short_name,
            repository_prefix,
            fully_qualified_name,
        }
    }

    /// Reference for a request: the bare base image for `default`, else `base:version`.
    pub fn for_request(base_image: &str, request: &VersionRequest, prefix: Option<&str>) -> Self {
        let short_name = if request.is_base() {
            base_image.to_string()
        } else {
            format!("{}:{}", base_image, request.version)
        };
        Self::new(short_name, prefix)
    }
}

/// Maps version requests onto locally available images.
pub struct Resolver<'a> {
    runtime: &'a dyn ContainerRuntime,
    registry: &'a dyn TagLookup,
    base_image: &'a str,
}

impl<'a> Resolver<'a> {
    /// `registry` must point at the registry serving the prefix later passed to `resolve`.
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        registry: &'a dyn TagLookup,
        base_image: &'a str,
    ) -> Self {
        Self {
            runtime,
            registry,
            base_image,
        }
    }

    /// Whether `image` is in the local index. An unreachable or empty index counts
    /// as a miss.
    pub fn resolve_local(&self, image: &str) -> bool {
        match self.runtime.list_images() {
            Ok(images) => {
                let found = images.iter().any(|i| image_ref_matches(i, image));
                debug!(image, found, count = images.len(), "resolve:local index");
                found
            }
            Err(e) => {
                warn!(image, error = %format!("{:#}", e), "resolve:local index unavailable, treating as miss");
                false
            }
        }
    }

    /// Resolve a request to an image present in the local index, pulling it when the
    /// registry confirms it exists.
    pub fn resolve(&self, request: &VersionRequest, prefix: Option<&str>) -> Result<ImageReference> {
        let image = ImageReference::for_request(self.base_image, request, prefix);
        let wanted = image.fully_qualified_name.as_str();

        if self.resolve_local(wanted) {
            info!(image = wanted, "resolve:found locally");
            return Ok(image);
        }

        let tag = if request.is_base() {
            BASE_TAG
        } else {
            request.version.as_str()
        };
        if !self.registry.tag_exists(tag)? {
            return Err(DrmError::VersionNotFound {
                version: tag.to_string(),
                registry: self.registry.describe(),
            }
            .into());
        }

        eprintln!("Retrieving version [{}] from repository...", tag);
        info!(image = wanted, "resolve:pulling");
        self.runtime
            .pull_image(wanted)
            .map_err(|e| DrmError::ImageRetrieval {
                image: wanted.to_string(),
                reason: format!("{:#}", e),
            })?;

        if !self.resolve_local(wanted) {
            return Err(DrmError::ImageRetrieval {
                image: wanted.to_string(),
                reason: "image is still missing from the local index after pulling".to_string(),
            }
            .into());
        }
        Ok(image)
    }
}

/// Tags of the base image (under `prefix`) present in the local index, sorted.
pub fn local_versions(
    runtime: &dyn ContainerRuntime,
    base_image: &str,
    prefix: Option<&str>,
) -> Result<Vec<String>> {
    let repository = ImageReference::new(base_image.to_string(), prefix).fully_qualified_name;
    let mut tags: Vec<String> = runtime
        .list_images()?
        .into_iter()
        .filter_map(|image| {
            let (name, tag) = image.rsplit_once(':')?;
            (name == repository || name == format!("docker.io/library/{}", repository))
                .then(|| tag.to_string())
        })
        .collect();
    tags.sort();
    tags.dedup();
    Ok(tags)
}
