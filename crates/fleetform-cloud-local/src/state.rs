//! Persistence for the local cloud
//!
//! The resource store is written to a JSON file (by default
//! `.fleetform/cloud.json`), with a backup of the previous version and a
//! lock file next to it that keeps two processes from sharing a store.

use crate::error::{LocalCloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
pub const DEFAULT_STATE_FILE: &str = ".fleetform/cloud.json";

/// Locks older than this are considered abandoned
const STALE_LOCK_HOURS: i64 = 1;

/// Every resource in the cloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudState {
    pub version: u32,

    pub updated_at: DateTime<Utc>,

    /// Resources indexed by `Kind/name`
    pub resources: BTreeMap<String, ResourceRecord>,

    /// Last id handed out per resource kind
    #[serde(default)]
    pub sequences: BTreeMap<String, u64>,

    /// Last host number handed out per CIDR block
    #[serde(default)]
    pub addresses: BTreeMap<String, u32>,
}

impl Default for CloudState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
            sequences: BTreeMap::new(),
            addresses: BTreeMap::new(),
        }
    }
}

impl CloudState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ResourceRecord> {
        self.resources.get(key)
    }

    pub fn set(&mut self, key: String, record: ResourceRecord) {
        self.resources.insert(key, record);
        self.updated_at = Utc::now();
    }

    /// Next id for `kind`, e.g. `subnet-000003`
    pub fn next_id(&mut self, kind: &str) -> String {
        let seq = self.sequences.entry(kind.to_string()).or_insert(0);
        *seq += 1;
        format!("{}-{:06}", kind.to_lowercase(), seq)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// One stored resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Cloud-assigned id
    pub id: String,

    pub kind: String,

    /// Stored fields, as the task serializes them
    pub attributes: Value,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, attributes: Value) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind: kind.into(),
            attributes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, attributes: Value) {
        self.attributes = attributes;
        self.updated_at = Utc::now();
    }

    /// Attributes with the cloud-assigned id filled in
    pub fn materialize(&self) -> Value {
        let mut value = self.attributes.clone();
        if let Some(map) = value.as_object_mut() {
            map.insert("id".to_string(), Value::String(self.id.clone()));
        }
        value
    }
}

/// Reads and writes a state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cloud.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn backup_path(&self) -> PathBuf {
        self.sibling(".backup")
    }

    fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).await?;
                tracing::debug!("Created state directory: {}", dir.display());
            }
        }
        Ok(())
    }

    /// Loads the state, or an empty one when the file does not exist yet
    pub async fn load(&self) -> Result<CloudState> {
        if !self.path.exists() {
            tracing::debug!("State file {} not found, starting empty", self.path.display());
            return Ok(CloudState::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        let state: CloudState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(LocalCloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} resource(s)", state.len());
        Ok(state)
    }

    /// Writes the state, keeping the previous file as a backup
    pub async fn save(&self, state: &CloudState) -> Result<()> {
        self.ensure_parent().await?;

        let backup = self.backup_path();
        if self.path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&self.path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, content).await?;

        tracing::debug!("Saved state with {} resource(s)", state.len());
        Ok(())
    }

    /// Takes the lock file for exclusive use of this store.
    ///
    /// The lock file is created with `create_new`, so of two processes racing
    /// for it exactly one wins. A stale lock is removed and creation retried
    /// once.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_parent().await?;
        let lock_path = self.lock_path();

        match create_lock_file(&lock_path).await {
            Err(LocalCloudError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                self.ensure_stale(&lock_path).await?;
                match fs::remove_file(&lock_path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                create_lock_file(&lock_path).await.map_err(|e| match e {
                    LocalCloudError::Io(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        LocalCloudError::LockError(format!(
                            "{} was locked by another process while replacing a stale lock",
                            self.path.display()
                        ))
                    }
                    other => other,
                })?;
            }
            result => result?,
        }

        tracing::debug!("Acquired lock {}", lock_path.display());
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }

    /// Fails unless the existing lock at `lock_path` is abandoned
    async fn ensure_stale(&self, lock_path: &Path) -> Result<()> {
        let content = match fs::read_to_string(lock_path).await {
            Ok(content) => content,
            // released in the meantime
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let Ok(info) = serde_json::from_str::<LockInfo>(&content) else {
            return Err(LocalCloudError::LockError(format!(
                "{} is locked and {} cannot be read; remove it if no other process is running",
                self.path.display(),
                lock_path.display()
            )));
        };

        let age = Utc::now().signed_duration_since(info.acquired_at);
        if age.num_hours() < STALE_LOCK_HOURS {
            return Err(LocalCloudError::LockError(format!(
                "{} is locked by {} (pid {}) since {}",
                self.path.display(),
                info.holder,
                info.pid,
                info.acquired_at
            )));
        }
        tracing::warn!("Removing stale lock held by {} since {}", info.holder, info.acquired_at);
        Ok(())
    }
}

/// Atomically creates the lock file; fails with `AlreadyExists` when taken
async fn create_lock_file(lock_path: &Path) -> Result<()> {
    let info = LockInfo {
        holder: std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown".to_string()),
        pid: std::process::id(),
        acquired_at: Utc::now(),
    };
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
        .await?;
    file.write_all(serde_json::to_string_pretty(&info)?.as_bytes())
        .await?;
    file.flush().await?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held lock on a state file; removed on release or drop
#[derive(Debug)]
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await?;
            tracing::debug!("Released lock {}", self.lock_path.display());
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
