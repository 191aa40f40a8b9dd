//! Registration table of task kinds
//!
//! Maps a kind name to a constructor that builds the task from its
//! serialized fields. A registry is an ordinary value handed to whatever
//! loads task definitions; there is no process-wide table.

use crate::error::{ConvergeError, Result};
use crate::task::{CloudTask, Task};
use serde_json::Value;
use std::collections::BTreeMap;

type Constructor<C> = fn(Value) -> std::result::Result<Box<dyn Task<C>>, serde_json::Error>;

pub struct TaskRegistry<C> {
    constructors: BTreeMap<&'static str, Constructor<C>>,
}

impl<C> Default for TaskRegistry<C> {
    fn default() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }
}

impl<C> TaskRegistry<C>
where
    C: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: CloudTask<C>>(&mut self) -> &mut Self {
        if self.constructors.insert(T::KIND, construct::<C, T>).is_some() {
            tracing::warn!("Task kind {} registered twice", T::KIND);
        }
        self
    }

    pub fn with<T: CloudTask<C>>(mut self) -> Self {
        self.register::<T>();
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    /// Builds a task of `kind` from its fields
    pub fn build(&self, kind: &str, fields: Value) -> Result<Box<dyn Task<C>>> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| ConvergeError::UnknownKind(kind.to_string()))?;
        constructor(fields).map_err(|e| ConvergeError::InvalidTask {
            kind: kind.to_string(),
            reason: e.to_string(),
        })
    }
}

fn construct<C, T>(fields: Value) -> std::result::Result<Box<dyn Task<C>>, serde_json::Error>
where
    C: Send + Sync + 'static,
    T: CloudTask<C>,
{
    Ok(Box::new(serde_json::from_value::<T>(fields)?))
}
