//! Image reference domain types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag used when a reference does not carry one
pub const DEFAULT_TAG: &str = "latest";

/// Registry assumed for references without an explicit host
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Errors produced while parsing an image reference
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageReferenceError {
    #[error("image reference is empty")]
    Empty,

    #[error("image reference '{0}' has an empty name")]
    EmptyName(String),
}

/// A parsed container image reference
///
/// `registry/repository:tag@digest`. The registry and digest are optional,
/// the tag defaults to [`DEFAULT_TAG`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: String,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parses a raw image string such as `registry.k8s.io/ns/img:v1@sha256:abc`
    pub fn parse(raw: &str) -> Result<Self, ImageReferenceError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ImageReferenceError::Empty);
        }

        let (rest, digest) = match raw.split_once('@') {
            Some((rest, digest)) if !digest.is_empty() => (rest, Some(digest.to_string())),
            Some((rest, _)) => (rest, None),
            None => (raw, None),
        };

        // A ':' only introduces a tag when it sits in the last path segment,
        // otherwise it is a registry port.
        let (path, tag) = match rest.rfind(':') {
            Some(idx) if !rest[idx + 1..].contains('/') => (&rest[..idx], &rest[idx + 1..]),
            _ => (rest, ""),
        };
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };

        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ImageReferenceError::EmptyName(raw.to_string()));
        }

        let (registry, repository) = if segments.len() > 1 && is_registry_host(segments[0]) {
            (Some(segments[0].to_string()), segments[1..].join("/"))
        } else {
            (None, segments.join("/"))
        };

        Ok(Self {
            registry,
            repository,
            tag: tag.to_string(),
            digest,
        })
    }

    /// Reference without tag and digest, e.g. `quay.io/org/app`
    pub fn bare_name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.repository),
            None => self.repository.clone(),
        }
    }

    /// Reference handed to the container runtime
    ///
    /// The digest is always dropped: the runtime rejects references carrying
    /// both a tag and a digest.
    pub fn runtime_name(&self) -> String {
        format!("{}:{}", self.bare_name(), self.tag)
    }

    /// Bare name with Docker Hub defaults filled in
    ///
    /// `busybox` and `docker.io/library/busybox` both become
    /// `docker.io/library/busybox`.
    pub fn canonical_name(&self) -> String {
        let registry = match self.registry.as_deref() {
            None | Some("index.docker.io") => DEFAULT_REGISTRY,
            Some(registry) => registry,
        };

        if registry == DEFAULT_REGISTRY && !self.repository.contains('/') {
            format!("{}/library/{}", registry, self.repository)
        } else {
            format!("{}/{}", registry, self.repository)
        }
    }

    /// Last path segment of the repository
    pub fn repository_tail(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// On-disk artifact name, `/<name>_<tag>.<extension>`
    pub fn artifact_name(&self, extension: &str) -> String {
        format!("/{}_{}.{}", self.repository_tail(), self.tag, extension)
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.runtime_name())?;
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

/// One record of the runtime's image inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCacheEntry {
    pub name: String,
    pub read_only: bool,
}

/// Outcome of resolving an image against the local cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImage {
    pub reference: ImageReference,
    /// Digest-free reference used for runtime and scheduler invocations
    pub runtime_name: String,
    /// Path of the image artifact under the image cache directory
    pub artifact_path: std::path::PathBuf,
    /// True when the cached copy was reused and no pull happened
    pub reused: bool,
}
