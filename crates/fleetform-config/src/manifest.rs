//! Manifest: run settings plus the declared task set
//!
//! ```yaml
//! settings:
//!   max_concurrency: 8
//!   deadline_secs: 600
//!   lifecycle_overrides:
//!     Network: ExistsAndValidates
//! tasks:
//!   - kind: Network
//!     name: main
//!     cidr: 10.0.0.0/16
//!   - kind: Subnet
//!     name: private-a
//!     network: main
//!     cidr: 10.0.1.0/24
//! ```

use crate::error::{ConfigError, Result};
use fleetform_core::{ExecutorOptions, Lifecycle, Task, TaskRegistry, apply_lifecycle_overrides};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_STATE_FILE: &str = ".fleetform/cloud.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

/// Run settings; command-line flags take precedence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Lifecycle forced onto every task of a kind
    #[serde(default)]
    pub lifecycle_overrides: BTreeMap<String, Lifecycle>,

    /// Where the local cloud keeps its resources, relative to the manifest
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            deadline_secs: None,
            lifecycle_overrides: BTreeMap::new(),
            state_file: default_state_file(),
        }
    }
}

impl Settings {
    pub fn executor_options(&self) -> ExecutorOptions {
        let options = ExecutorOptions::default().with_max_concurrency(self.max_concurrency);
        match self.deadline_secs {
            Some(secs) => options.with_deadline(Duration::from_secs(secs)),
            None => options,
        }
    }

    /// State file path, resolved against the manifest's directory
    pub fn state_path(&self, manifest_path: &Path) -> PathBuf {
        if self.state_file.is_absolute() {
            return self.state_file.clone();
        }
        manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.state_file)
    }
}

/// One declared task: its kind, name and kind-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub kind: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl TaskEntry {
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }
}

impl FromStr for Manifest {
    type Err = serde_yaml::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_yaml::from_str(s)
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Manifest = content.parse().map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        manifest.validate()?;

        tracing::debug!(
            "Loaded {} task(s) from {}",
            manifest.tasks.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Checks that do not need a task registry
    pub fn validate(&self) -> Result<()> {
        if self.settings.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "settings.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.settings.deadline_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "settings.deadline_secs must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (i, entry) in self.tasks.iter().enumerate() {
            let Some(name) = entry.name() else {
                return Err(ConfigError::Invalid(format!(
                    "task #{} ({}) has no name",
                    i + 1,
                    entry.kind
                )));
            };
            if !seen.insert((entry.kind.as_str(), name)) {
                return Err(ConfigError::Invalid(format!(
                    "task {}/{} is declared more than once",
                    entry.kind, name
                )));
            }
        }
        Ok(())
    }

    /// Builds the declared tasks, with lifecycle overrides applied
    pub fn tasks<C>(&self, registry: &TaskRegistry<C>) -> Result<Vec<Box<dyn Task<C>>>>
    where
        C: Send + Sync + 'static,
    {
        self.tasks_with_overrides(registry, &BTreeMap::new())
    }

    /// Like [`Manifest::tasks`], with `extra` overrides winning over the
    /// manifest's own
    pub fn tasks_with_overrides<C>(
        &self,
        registry: &TaskRegistry<C>,
        extra: &BTreeMap<String, Lifecycle>,
    ) -> Result<Vec<Box<dyn Task<C>>>>
    where
        C: Send + Sync + 'static,
    {
        let mut tasks = self
            .tasks
            .iter()
            .map(|entry| registry.build(&entry.kind, Value::Object(entry.fields.clone())))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut overrides = self.settings.lifecycle_overrides.clone();
        overrides.extend(extra.iter().map(|(k, v)| (k.clone(), *v)));
        for kind in overrides.keys() {
            if !registry.contains(kind) {
                tracing::warn!("Lifecycle override for unknown task kind {}", kind);
            }
        }

        let changed = apply_lifecycle_overrides(&mut tasks, &overrides);
        if changed > 0 {
            tracing::debug!("Lifecycle overrides changed {} task(s)", changed);
        }
        Ok(tasks)
    }
}
