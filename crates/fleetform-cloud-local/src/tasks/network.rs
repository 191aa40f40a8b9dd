//! Networking resources

use super::{Provisioned, attributes, lookup, resolve_id, store};
use crate::cloud::{LocalCloud, cidr_contains, parse_cidr};
use async_trait::async_trait;
use fleetform_core::{Changes, CloudTask, Lifecycle, RunContext, TaskError, TaskKind, TaskRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Private network address space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub cidr: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl TaskKind for Network {
    const KIND: &'static str = "Network";
}

impl Provisioned for Network {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[async_trait]
impl CloudTask<LocalCloud> for Network {
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
        parse_cidr(&self.cidr)?;
        store(ctx.cloud(), &self.name, attributes(self)?).await
    }
}

/// Address range carved out of a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub network: TaskRef<Network>,
    pub cidr: String,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl TaskKind for Subnet {
    const KIND: &'static str = "Subnet";
}

impl Provisioned for Subnet {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[async_trait]
impl CloudTask<LocalCloud> for Subnet {
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
        let network = ctx.resolve(&self.network)?;
        if !cidr_contains(&network.cidr, &self.cidr)? {
            return Err(TaskError::Invalid(format!(
                "subnet {} ({}) is outside network {} ({})",
                self.name, self.cidr, network.name, network.cidr
            )));
        }
        resolve_id(ctx, &self.network)?;
        store(ctx.cloud(), &self.name, attributes(self)?).await
    }
}

/// One allowed inbound flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub port: u16,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_source() -> String {
    "0.0.0.0/0".to_string()
}

/// Firewall rules attached to instances of a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub name: String,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    pub network: TaskRef<Network>,
    #[serde(default)]
    pub ingress: Vec<IngressRule>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl TaskKind for SecurityGroup {
    const KIND: &'static str = "SecurityGroup";
}

impl Provisioned for SecurityGroup {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[async_trait]
impl CloudTask<LocalCloud> for SecurityGroup {
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
        resolve_id(ctx, &self.network)?;
        for rule in &self.ingress {
            if !matches!(rule.protocol.as_str(), "tcp" | "udp" | "icmp") {
                return Err(TaskError::Invalid(format!(
                    "security group {}: unsupported protocol '{}'",
                    self.name, rule.protocol
                )));
            }
            parse_cidr(&rule.source)?;
        }
        store(ctx.cloud(), &self.name, attributes(self)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subnet_references_network() {
        let subnet: Subnet = serde_json::from_value(json!({
            "name": "private-a",
            "network": "main",
            "cidr": "10.0.1.0/24",
        }))
        .unwrap();
        assert_eq!(subnet.network.name(), "main");
        assert_eq!(subnet.lifecycle, Lifecycle::Sync);

        let value = serde_json::to_value(&subnet).unwrap();
        assert_eq!(value["network"], json!({"$task": "Network/main"}));
    }

    #[test]
    fn test_ingress_rule_defaults() {
        let rule: IngressRule = serde_json::from_value(json!({"port": 443})).unwrap();
        assert_eq!(rule.protocol, "tcp");
        assert_eq!(rule.source, "0.0.0.0/0");
    }
}
