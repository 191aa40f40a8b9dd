//! Resource tasks for the local cloud

mod compute;
mod load_balancer;
mod network;

pub use compute::Instance;
pub use load_balancer::{LoadBalancer, PoolAssociation};
pub use network::{IngressRule, Network, SecurityGroup, Subnet};

use crate::cloud::LocalCloud;
use fleetform_core::{RunContext, TaskError, TaskKey, TaskKind, TaskRef, TaskRegistry};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A resource that receives an id from the cloud once created
pub trait Provisioned {
    fn id(&self) -> Option<&str>;
}

/// Registry with every resource kind of the local cloud
pub fn registry() -> TaskRegistry<LocalCloud> {
    TaskRegistry::new()
        .with::<Network>()
        .with::<Subnet>()
        .with::<SecurityGroup>()
        .with::<Instance>()
        .with::<LoadBalancer>()
        .with::<PoolAssociation>()
}

/// Reads the stored resource `name` of kind `T`
pub(crate) async fn lookup<T>(cloud: &LocalCloud, name: &str) -> Result<Option<T>, TaskError>
where
    T: TaskKind + DeserializeOwned,
{
    let key = TaskKey::new(T::KIND, name);
    match cloud.get(&key).await? {
        Some(record) => Ok(Some(serde_json::from_value(record.materialize())?)),
        None => Ok(None),
    }
}

/// Serializes a task into the attributes the cloud stores.
///
/// The lifecycle is engine state and the id is owned by the cloud, so
/// neither is written.
pub(crate) fn attributes<T: Serialize>(task: &T) -> Result<Value, TaskError> {
    let mut value = serde_json::to_value(task)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("lifecycle");
        map.remove("id");
    }
    Ok(value)
}

/// Writes `attributes` and reads the resulting resource back
pub(crate) async fn store<T>(
    cloud: &LocalCloud,
    name: &str,
    attributes: Value,
) -> Result<Option<T>, TaskError>
where
    T: TaskKind + DeserializeOwned,
{
    let record = cloud.put(&TaskKey::new(T::KIND, name), attributes).await?;
    Ok(Some(serde_json::from_value(record.materialize())?))
}

/// Id of an already materialized dependency
pub(crate) fn resolve_id<T>(
    ctx: &RunContext<LocalCloud>,
    reference: &TaskRef<T>,
) -> Result<String, TaskError>
where
    T: TaskKind + DeserializeOwned + Provisioned,
{
    let resolved = ctx.resolve(reference)?;
    resolved
        .id()
        .map(str::to_string)
        .ok_or_else(|| TaskError::Unresolved(reference.key()))
}
