//! Run context shared by every task execution

use crate::error::TaskError;
use crate::executor::ExecutorOptions;
use crate::refs::TaskRef;
use crate::task::{TaskKey, TaskKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Whether a run only plans changes or performs them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    DryRun,
    Apply,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::DryRun => write!(f, "dry-run"),
            Mode::Apply => write!(f, "apply"),
        }
    }
}

/// State consumed by tasks during one run.
///
/// Holds the cloud handle, the run options, and the cache of resources
/// materialized so far. A cache entry is written once, by the task that owns
/// the key, so dependents can read ids assigned by the cloud.
pub struct RunContext<C> {
    cloud: C,
    mode: Mode,
    options: ExecutorOptions,
    materialized: RwLock<HashMap<TaskKey, Value>>,
}

impl<C> RunContext<C> {
    pub fn new(cloud: C, mode: Mode, options: ExecutorOptions) -> Self {
        Self {
            cloud,
            mode,
            options,
            materialized: RwLock::new(HashMap::new()),
        }
    }

    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_dry_run(&self) -> bool {
        self.mode == Mode::DryRun
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Materialized state of a task, if it has completed in this run
    pub fn materialized(&self, key: &TaskKey) -> Option<Value> {
        let cache = self.materialized.read().unwrap_or_else(|e| e.into_inner());
        cache.get(key).cloned()
    }

    /// Typed view of a referenced task's materialized state
    pub fn resolve<T>(&self, reference: &TaskRef<T>) -> Result<T, TaskError>
    where
        T: TaskKind + DeserializeOwned,
    {
        let key = reference.key();
        let value = self
            .materialized(&key)
            .ok_or_else(|| TaskError::Unresolved(key.clone()))?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn materialized_count(&self) -> usize {
        let cache = self.materialized.read().unwrap_or_else(|e| e.into_inner());
        cache.len()
    }

    /// Insert-if-absent; returns false when the key was already published
    pub(crate) fn publish(&self, key: TaskKey, value: Value) -> bool {
        let mut cache = self.materialized.write().unwrap_or_else(|e| e.into_inner());
        if cache.contains_key(&key) {
            tracing::warn!("{} was already materialized in this run", key);
            return false;
        }
        cache.insert(key, value);
        true
    }
}
