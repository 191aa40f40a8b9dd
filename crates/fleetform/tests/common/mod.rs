#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const THREE_TIER: &str = r#"
settings:
  max_concurrency: 2
tasks:
  - kind: Network
    name: main
    cidr: 10.0.0.0/16
  - kind: Subnet
    name: private-a
    network: main
    cidr: 10.0.1.0/24
  - kind: Instance
    name: web-1
    subnet: private-a
    machine_type: small
    image: debian-12
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn with_manifest(content: &str) -> Self {
        let project = Self::new();
        project.write_manifest(content);
        project
    }

    pub fn write_manifest(&self, content: &str) {
        fs::write(self.manifest_path(), content).unwrap();
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.path().join("fleetform.yaml")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.path().join(".fleetform/cloud.json")
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }
}
