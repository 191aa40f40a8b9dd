//! Task abstraction
//!
//! A task describes one desired cloud resource. Providers implement the
//! typed [`CloudTask`] trait; the engine works with the object-safe
//! [`Task`] trait, which every `CloudTask` gets for free.

use crate::context::RunContext;
use crate::diff::{Changes, display_value};
use crate::error::TaskError;
use crate::lifecycle::Lifecycle;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Identity of a task within one run (`kind/name`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskKey {
    kind: String,
    name: String,
}

impl TaskKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for TaskKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((kind, name)) if !kind.is_empty() && !name.is_empty() => {
                Ok(TaskKey::new(kind, name))
            }
            _ => Err(format!("invalid task key '{}', expected kind/name", s)),
        }
    }
}

impl TryFrom<String> for TaskKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskKey> for String {
    fn from(key: TaskKey) -> Self {
        key.to_string()
    }
}

/// Static kind name of a task type (e.g. "Network", "Subnet")
pub trait TaskKind {
    const KIND: &'static str;
}

/// Typed task implemented by providers.
///
/// `find` returns the resource as it currently exists in the cloud, expressed
/// as the same type as the desired state. `render` performs the mutation and
/// may return the materialized resource (for example with a cloud-assigned
/// id), which dependents can then read through [`RunContext::resolve`].
///
/// References to other tasks are held as [`crate::TaskRef`] fields; the
/// engine discovers them from the serialized form, so no dependency list has
/// to be maintained by hand.
#[async_trait]
pub trait CloudTask<C>: TaskKind + Serialize + DeserializeOwned + Send + Sync + 'static
where
    C: Send + Sync + 'static,
{
    fn name(&self) -> &str;

    fn lifecycle(&self) -> Lifecycle;

    fn set_lifecycle(&mut self, lifecycle: Lifecycle);

    /// Fields never compared when diffing (in addition to `name` and `lifecycle`)
    fn ignored_fields(&self) -> &'static [&'static str] {
        &[]
    }

    async fn find(&self, ctx: &RunContext<C>) -> Result<Option<Self>, TaskError>;

    async fn render(
        &self,
        ctx: &RunContext<C>,
        actual: Option<&Self>,
        changes: &Changes,
    ) -> Result<Option<Self>, TaskError>;
}

/// Object-safe task contract consumed by the engine
#[async_trait]
pub trait Task<C>: Send + Sync {
    fn key(&self) -> TaskKey;

    fn lifecycle(&self) -> Lifecycle;

    fn set_lifecycle(&mut self, lifecycle: Lifecycle);

    fn ignored_fields(&self) -> &'static [&'static str];

    /// Desired state as a field map
    fn desired(&self) -> Result<Value, TaskError>;

    async fn find(&self, ctx: &RunContext<C>) -> Result<Option<Value>, TaskError>;

    async fn render(
        &self,
        ctx: &RunContext<C>,
        actual: Option<&Value>,
        changes: &Changes,
    ) -> Result<Option<Value>, TaskError>;
}

#[async_trait]
impl<C, T> Task<C> for T
where
    C: Send + Sync + 'static,
    T: CloudTask<C>,
{
    fn key(&self) -> TaskKey {
        TaskKey::new(T::KIND, <T as CloudTask<C>>::name(self))
    }

    fn lifecycle(&self) -> Lifecycle {
        <T as CloudTask<C>>::lifecycle(self)
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        <T as CloudTask<C>>::set_lifecycle(self, lifecycle)
    }

    fn ignored_fields(&self) -> &'static [&'static str] {
        <T as CloudTask<C>>::ignored_fields(self)
    }

    fn desired(&self) -> Result<Value, TaskError> {
        Ok(serde_json::to_value(self)?)
    }

    async fn find(&self, ctx: &RunContext<C>) -> Result<Option<Value>, TaskError> {
        match <T as CloudTask<C>>::find(self, ctx).await? {
            Some(actual) => Ok(Some(serde_json::to_value(&actual)?)),
            None => Ok(None),
        }
    }

    async fn render(
        &self,
        ctx: &RunContext<C>,
        actual: Option<&Value>,
        changes: &Changes,
    ) -> Result<Option<Value>, TaskError> {
        let actual: Option<T> = actual
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?;
        match <T as CloudTask<C>>::render(self, ctx, actual.as_ref(), changes).await? {
            Some(rendered) => Ok(Some(serde_json::to_value(&rendered)?)),
            None => Ok(None),
        }
    }
}

/// Human-readable form of a task: `kind/name {field: value, ...}`.
///
/// Unset fields and the lifecycle are left out.
pub fn describe<C>(task: &dyn Task<C>) -> String {
    let key = task.key();
    let fields = match task.desired() {
        Ok(Value::Object(map)) => map
            .iter()
            .filter(|(k, v)| !v.is_null() && *k != "name" && *k != "lifecycle")
            .map(|(k, v)| format!("{}: {}", k, display_value(v)))
            .collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    format!("{} {{{}}}", key, fields.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_key_round_trip_through_string() {
        let key: TaskKey = "Subnet/private-a".parse().unwrap();
        assert_eq!(key.kind(), "Subnet");
        assert_eq!(key.name(), "private-a");
        assert_eq!(key.to_string(), "Subnet/private-a");
    }

    #[test]
    fn test_task_key_rejects_missing_kind() {
        assert!("/name".parse::<TaskKey>().is_err());
        assert!("plain".parse::<TaskKey>().is_err());
    }

    #[test]
    fn test_task_key_serializes_as_string() {
        let key = TaskKey::new("Network", "main");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"Network/main\"");
    }
}
