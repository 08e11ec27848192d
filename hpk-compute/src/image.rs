//! Image resolution and caching
//!
//! Decides whether an image has to be pulled by asking the container runtime
//! for its inventory. The inventory is queried on every resolution, so there
//! is no cache state to invalidate.

use hpk_core::domain::image::{ImageCacheEntry, ImageReference, ResolvedImage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ComputeConfig;
use crate::error::ImageError;
use crate::process::CommandRunner;

/// Inventory format: one `name|readOnly` record per line
pub const INVENTORY_FORMAT: &str = "{{.Name}}|{{.ReadOnly}}";

/// Resolves image references against the runtime's local image store
pub struct ImageResolver {
    runner: Arc<dyn CommandRunner>,
    runtime_bin: String,
    image_dir: PathBuf,
    extension: String,
}

impl ImageResolver {
    pub fn new(config: &ComputeConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            runtime_bin: config.runtime_bin.clone(),
            image_dir: config.dirs().image_dir(),
            extension: config.image_extension.clone(),
        }
    }

    /// Checks that the runtime binary is installed and answers
    ///
    /// # Returns
    /// The version string reported by the runtime
    pub fn check_runtime(&self) -> Result<String, ImageError> {
        let output = self
            .runner
            .run(&self.runtime_bin, &["--version".to_string()])
            .map_err(|e| {
                ImageError::Inventory(format!(
                    "failed to execute '{} --version': {}",
                    self.runtime_bin, e
                ))
            })?;

        if !output.success() {
            return Err(ImageError::Inventory(format!(
                "'{} --version' failed: {}",
                self.runtime_bin,
                output.describe()
            )));
        }

        let version = output.stdout.trim().to_string();
        info!("Container runtime is available: {}", version);
        Ok(version)
    }

    /// Resolves an image, pulling it when no read-only cached copy exists
    ///
    /// Any digest in `image` is dropped before the runtime sees the reference.
    pub fn resolve(&self, image: &str) -> Result<ResolvedImage, ImageError> {
        let reference = ImageReference::parse(image)?;
        let runtime_name = reference.runtime_name();
        let artifact_path = self
            .image_dir
            .join(reference.artifact_name(&self.extension).trim_start_matches('/'));

        let wanted = reference.canonical_name();
        let cached = self
            .inventory()?
            .iter()
            .any(|entry| entry.read_only && same_image(&entry.name, &wanted));

        if cached {
            info!("Image {} already cached, reusing it", runtime_name);
        } else {
            info!("Image {} not cached, pulling", runtime_name);
            self.pull(&runtime_name)?;
            info!("Pulled image {}", runtime_name);
        }

        Ok(ResolvedImage {
            reference,
            runtime_name,
            artifact_path,
            reused: cached,
        })
    }

    /// Lists the images known to the runtime
    pub fn inventory(&self) -> Result<Vec<ImageCacheEntry>, ImageError> {
        let args = vec!["images".to_string(), format!("--format={}", INVENTORY_FORMAT)];
        let output = self
            .runner
            .run(&self.runtime_bin, &args)
            .map_err(|e| ImageError::Inventory(e.to_string()))?;

        if !output.success() {
            return Err(ImageError::Inventory(output.describe()));
        }

        let entries = parse_inventory(&output.stdout);
        debug!("Image inventory holds {} entries", entries.len());
        Ok(entries)
    }

    fn pull(&self, image: &str) -> Result<(), ImageError> {
        let args = vec!["pull".to_string(), image.to_string()];
        let output = self
            .runner
            .run(&self.runtime_bin, &args)
            .map_err(|e| ImageError::Pull {
                image: image.to_string(),
                message: e.to_string(),
            })?;

        if !output.success() {
            return Err(ImageError::Pull {
                image: image.to_string(),
                message: output.describe(),
            });
        }
        Ok(())
    }
}

/// Parses the runtime's inventory listing
///
/// The listing may come wrapped in quotes or braces and names may be reported
/// as a bracketed list; both are trimmed away. Tags are stripped from names.
/// Lines that are not `name|flag` records are skipped.
pub fn parse_inventory(output: &str) -> Vec<ImageCacheEntry> {
    output
        .trim_matches(|c: char| matches!(c, '{' | '}' | '"') || c.is_whitespace())
        .lines()
        .flat_map(parse_inventory_line)
        .collect()
}

fn parse_inventory_line(line: &str) -> Vec<ImageCacheEntry> {
    let line = line.trim_matches(|c: char| c == '"' || c.is_whitespace());
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() != 2 {
        return Vec::new();
    }

    let read_only = parts[1].trim().trim_matches('"') == "true";
    parts[0]
        .trim_matches(|c: char| matches!(c, '[' | ']') || c.is_whitespace())
        .split_whitespace()
        .map(|name| ImageCacheEntry {
            name: strip_tag(name).to_string(),
            read_only,
        })
        .collect()
}

/// Drops a trailing `:tag` and `@digest` while keeping registry ports
fn strip_tag(name: &str) -> &str {
    let name = name.split('@').next().unwrap_or(name);
    match name.rfind(':') {
        Some(idx) if !name[idx + 1..].contains('/') => &name[..idx],
        _ => name,
    }
}

fn same_image(inventory_name: &str, wanted_canonical: &str) -> bool {
    ImageReference::parse(inventory_name)
        .map(|reference| reference.canonical_name() == wanted_canonical)
        .unwrap_or(false)
}

/// On-disk artifact name of an image, `/<name>_<tag>.<extension>`
pub fn artifact_name(image: &str, extension: &str) -> Result<String, ImageError> {
    Ok(ImageReference::parse(image)?.artifact_name(extension))
}
