#![allow(dead_code)]

use fleetform_cloud_local::{LocalCloud, registry};
use fleetform_core::{Executor, ExecutorOptions, Mode, RunReport, Task};
use serde_json::{Value, json};

pub type Tasks = Vec<Box<dyn Task<LocalCloud>>>;

/// Builds tasks the way a manifest does: `{kind, name, ...fields}` entries
pub fn tasks_from(entries: Value) -> Tasks {
    let registry = registry();
    entries
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            let mut fields = entry.clone();
            let kind = fields
                .as_object_mut()
                .unwrap()
                .remove("kind")
                .unwrap();
            registry.build(kind.as_str().unwrap(), fields).unwrap()
        })
        .collect()
}

/// Network → Subnet → Instance
pub fn three_tier() -> Tasks {
    tasks_from(json!([
        {
            "kind": "Instance",
            "name": "web-1",
            "subnet": "private-a",
            "machine_type": "small",
            "image": "debian-12",
            "user_data": "#!/bin/sh\necho hello"
        },
        {"kind": "Subnet", "name": "private-a", "network": "main", "cidr": "10.0.1.0/24"},
        {"kind": "Network", "name": "main", "cidr": "10.0.0.0/16"}
    ]))
}

/// A load-balanced pair of instances
pub fn web_stack() -> Tasks {
    tasks_from(json!([
        {"kind": "Network", "name": "main", "cidr": "10.0.0.0/16", "tags": {"env": "test"}},
        {"kind": "Subnet", "name": "private-a", "network": "main", "cidr": "10.0.1.0/24"},
        {"kind": "Subnet", "name": "private-b", "network": "main", "cidr": "10.0.2.0/24"},
        {
            "kind": "SecurityGroup",
            "name": "web",
            "network": "main",
            "ingress": [{"port": 80}, {"port": 22, "source": "10.0.0.0/8"}]
        },
        {
            "kind": "Instance",
            "name": "web-1",
            "subnet": "private-a",
            "security_groups": ["web"],
            "machine_type": "small",
            "image": "debian-12"
        },
        {
            "kind": "Instance",
            "name": "web-2",
            "subnet": "private-b",
            "security_groups": ["web"],
            "machine_type": "small",
            "image": "debian-12"
        },
        {"kind": "LoadBalancer", "name": "front", "subnets": ["private-a", "private-b"], "port": 443},
        {
            "kind": "PoolAssociation",
            "name": "front-web",
            "load_balancer": "front",
            "instances": ["web-1", "web-2"],
            "target_port": 80
        }
    ]))
}

pub async fn converge(cloud: &LocalCloud, tasks: Tasks, mode: Mode) -> RunReport {
    Executor::new(ExecutorOptions::default())
        .run(cloud.clone(), tasks, mode)
        .await
        .unwrap()
}
