use fleetform_core::ConvergeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error(
        "No manifest found. Looked in:\n\
        - the current directory: fleetform.local.yaml, .fleetform.local.yaml, fleetform.yaml, .fleetform.yaml\n\
        - the ./.fleetform/ directory\n\
        - ~/.config/fleetform/fleetform.yaml\n\
        Pass --manifest or set FLEETFORM_MANIFEST to point at one directly"
    )]
    ManifestNotFound,

    #[error("Manifest {0} does not exist")]
    MissingManifest(PathBuf),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid manifest: {0}")]
    Invalid(String),

    #[error(transparent)]
    Converge(#[from] ConvergeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
