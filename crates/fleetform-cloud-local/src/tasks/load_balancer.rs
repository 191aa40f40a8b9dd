//! Load balancing resources

use super::{Instance, Provisioned, Subnet, attributes, lookup, resolve_id, store};
use crate::cloud::LocalCloud;
use async_trait::async_trait;
use fleetform_core::{Changes, CloudTask, Lifecycle, RunContext, TaskError, TaskKind, TaskRef};
use serde::{Deserialize, Serialize};

/// Listener spread over one or more subnets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub subnets: Vec<TaskRef<Subnet>>,
    pub port: u16,
    #[serde(default)]
    pub dns_name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl TaskKind for LoadBalancer {
    const KIND: &'static str = "LoadBalancer";
}

impl Provisioned for LoadBalancer {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[async_trait]
impl CloudTask<LocalCloud> for LoadBalancer {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    async fn find(&self, ctx: &RunContext<LocalCloud>) -> Result<Option<Self>, TaskError> {
        lookup(ctx.cloud(), &self.name).await
    }

    async fn render(
        &self,
        ctx: &RunContext<LocalCloud>,
        _actual: Option<&Self>,
        _changes: &Changes,
    ) -> Result<Option<Self>, TaskError> {
        if self.subnets.is_empty() {
            return Err(TaskError::Invalid(format!(
                "load balancer {} needs at least one subnet",
                self.name
            )));
        }
        for subnet in &self.subnets {
            resolve_id(ctx, subnet)?;
        }

        let mut stored = attributes(self)?;
        if let Some(map) = stored.as_object_mut() {
            map.insert(
                "dns_name".to_string(),
                format!("{}.lb.fleetform.internal", self.name).into(),
            );
        }
        store(ctx.cloud(), &self.name, stored).await
    }
}

/// Membership of instances in a load balancer's target pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolAssociation {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub load_balancer: TaskRef<LoadBalancer>,
    pub instances: Vec<TaskRef<Instance>>,
    /// Port the instances listen on
    pub target_port: u16,
    #[serde(default)]
    pub id: Option<String>,
}

impl TaskKind for PoolAssociation {
    const KIND: &'static str = "PoolAssociation";
}

impl Provisioned for PoolAssociation {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[async_trait]
impl CloudTask<LocalCloud> for PoolAssociation {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    async fn find(&self, ctx: &RunContext<LocalCloud>) -> Result<Option<Self>, TaskError> {
        lookup(ctx.cloud(), &self.name).await
    }

    async fn render(
        &self,
        ctx: &RunContext<LocalCloud>,
        _actual: Option<&Self>,
        changes: &Changes,
    ) -> Result<Option<Self>, TaskError> {
        let lb_id = resolve_id(ctx, &self.load_balancer)?;
        let mut members = Vec::with_capacity(self.instances.len());
        for instance in &self.instances {
            members.push(resolve_id(ctx, instance)?);
        }
        if changes.contains("instances") {
            tracing::info!(
                "Pool of {} now targets {} instance(s): {}",
                lb_id,
                members.len(),
                members.join(", ")
            );
        }
        store(ctx.cloud(), &self.name, attributes(self)?).await
    }
}
