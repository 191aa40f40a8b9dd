//! Compute resources

use super::{Provisioned, SecurityGroup, Subnet, attributes, lookup, resolve_id, store};
use crate::cloud::LocalCloud;
use async_trait::async_trait;
use fleetform_core::{Changes, CloudTask, Lifecycle, RunContext, TaskError, TaskKind, TaskRef};
use serde::{Deserialize, Serialize};

/// Virtual machine placed in a subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub subnet: TaskRef<Subnet>,
    #[serde(default)]
    pub security_groups: Vec<TaskRef<SecurityGroup>>,
    pub machine_type: String,
    pub image: String,
    /// Write-only; never returned by lookups
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl TaskKind for Instance {
    const KIND: &'static str = "Instance";
}

impl Provisioned for Instance {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[async_trait]
impl CloudTask<LocalCloud> for Instance {
    fn name(&self) -> &str {
        &self.name
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    fn ignored_fields(&self) -> &'static [&'static str] {
        &["user_data"]
    }

    async fn find(&self, ctx: &RunContext<LocalCloud>) -> Result<Option<Self>, TaskError> {
        lookup(ctx.cloud(), &self.name).await
    }

    async fn render(
        &self,
        ctx: &RunContext<LocalCloud>,
        actual: Option<&Self>,
        _changes: &Changes,
    ) -> Result<Option<Self>, TaskError> {
        let subnet = ctx.resolve(&self.subnet)?;
        resolve_id(ctx, &self.subnet)?;
        for group in &self.security_groups {
            resolve_id(ctx, group)?;
        }

        // an instance keeps its address across updates
        let private_ip = match self
            .private_ip
            .clone()
            .or_else(|| actual.and_then(|a| a.private_ip.clone()))
        {
            Some(ip) => ip,
            None => ctx.cloud().allocate_address(&subnet.cidr).await?.to_string(),
        };

        let mut stored = attributes(self)?;
        if let Some(map) = stored.as_object_mut() {
            map.remove("user_data");
            map.insert("private_ip".to_string(), private_ip.into());
        }
        if self.user_data.is_some() {
            tracing::debug!("Passing user data to {}", self.name);
        }
        store(ctx.cloud(), &self.name, stored).await
    }
}
