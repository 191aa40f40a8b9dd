pub mod error;
pub mod manifest;

pub use error::*;
pub use manifest::{Manifest, Settings, TaskEntry};

use std::path::{Path, PathBuf};

pub const MANIFEST_ENV: &str = "FLEETFORM_MANIFEST";

const CANDIDATES: [&str; 4] = [
    "fleetform.local.yaml",
    ".fleetform.local.yaml",
    "fleetform.yaml",
    ".fleetform.yaml",
];

/// FleetForm's global configuration directory, created if missing
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("fleetform");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locates the manifest to load.
///
/// Search order:
/// 1. `explicit` (the `--manifest` flag); it must exist
/// 2. the `FLEETFORM_MANIFEST` environment variable
/// 3. the current directory: fleetform.local.yaml, .fleetform.local.yaml, fleetform.yaml, .fleetform.yaml
/// 4. the same names inside `./.fleetform/`
/// 5. `~/.config/fleetform/fleetform.yaml`
pub fn find_manifest_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::MissingManifest(path.to_path_buf()));
    }

    if let Ok(path) = std::env::var(MANIFEST_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            "{} points at {}, which does not exist",
            MANIFEST_ENV,
            path.display()
        );
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = first_existing(&current_dir) {
        return Ok(path);
    }

    let project_dir = current_dir.join(".fleetform");
    if project_dir.is_dir() {
        if let Some(path) = first_existing(&project_dir) {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("fleetform").join("fleetform.yaml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::ManifestNotFound)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}
