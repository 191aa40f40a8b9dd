//! In-process cloud backend
//!
//! `LocalCloud` keeps resources in memory and, when opened on a state file,
//! writes every change through to disk. Lookups and writes can be made to
//! fail on purpose, which is how the executor's failure handling is
//! exercised without a real provider.

use crate::error::{LocalCloudError, Result};
use crate::state::{CloudState, ResourceRecord, StateLock, StateStore};
use fleetform_core::TaskKey;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Handle to a local cloud; clones share the same resources
#[derive(Clone, Default)]
pub struct LocalCloud {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: tokio::sync::Mutex<CloudState>,
    store: Option<StateStore>,
    _lock: Option<StateLock>,
    faults: Mutex<Faults>,
    lookups: AtomicUsize,
    mutations: AtomicUsize,
}

#[derive(Debug, Default)]
struct Faults {
    failing_lookups: HashSet<TaskKey>,
    failing_writes: HashSet<TaskKey>,
    read_only_kinds: HashSet<String>,
}

impl LocalCloud {
    /// A cloud that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the cloud persisted at `path`, taking its lock.
    ///
    /// Fails when another process holds the lock.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = StateStore::new(path);
        let lock = store.acquire_lock().await?;
        let state = store.load().await?;
        tracing::info!(
            "Opened local cloud {} ({} resource(s))",
            store.path().display(),
            state.len()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                state: tokio::sync::Mutex::new(state),
                store: Some(store),
                _lock: Some(lock),
                ..Default::default()
            }),
        })
    }

    /// Makes every lookup of `key` fail as if the API timed out
    pub fn fail_lookups(&self, key: TaskKey) {
        self.faults().failing_lookups.insert(key);
    }

    /// Makes every write to `key` be rejected
    pub fn fail_writes(&self, key: TaskKey) {
        self.faults().failing_writes.insert(key);
    }

    /// Denies writes to every resource of `kind`
    pub fn set_read_only(&self, kind: impl Into<String>) {
        self.faults().read_only_kinds.insert(kind.into());
    }

    pub fn lookup_count(&self) -> usize {
        self.inner.lookups.load(Ordering::SeqCst)
    }

    pub fn mutation_count(&self) -> usize {
        self.inner.mutations.load(Ordering::SeqCst)
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.inner.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Looks up a resource
    pub async fn get(&self, key: &TaskKey) -> Result<Option<ResourceRecord>> {
        self.inner.lookups.fetch_add(1, Ordering::SeqCst);
        if self.faults().failing_lookups.contains(key) {
            return Err(LocalCloudError::Unavailable(format!(
                "lookup of {} timed out",
                key
            )));
        }
        let state = self.inner.state.lock().await;
        Ok(state.get(&key.to_string()).cloned())
    }

    /// Creates or replaces a resource, assigning an id on creation
    pub async fn put(&self, key: &TaskKey, attributes: Value) -> Result<ResourceRecord> {
        {
            let faults = self.faults();
            if faults.read_only_kinds.contains(key.kind()) {
                return Err(LocalCloudError::AccessDenied(format!(
                    "no write access to {} resources",
                    key.kind()
                )));
            }
            if faults.failing_writes.contains(key) {
                return Err(LocalCloudError::WriteRejected(format!(
                    "write to {} was rejected",
                    key
                )));
            }
        }
        if !attributes.is_object() {
            return Err(LocalCloudError::InvalidResource(format!(
                "{} must be stored as an object",
                key
            )));
        }

        let mut state = self.inner.state.lock().await;
        let record = match state.get(&key.to_string()).cloned() {
            Some(mut record) => {
                record.update(attributes);
                tracing::info!("Updated {} ({})", key, record.id);
                record
            }
            None => {
                let id = state.next_id(key.kind());
                tracing::info!("Created {} ({})", key, id);
                ResourceRecord::new(id, key.kind(), attributes)
            }
        };
        state.set(key.to_string(), record.clone());
        self.inner.mutations.fetch_add(1, Ordering::SeqCst);

        if let Some(store) = &self.inner.store {
            store.save(&state).await?;
        }
        Ok(record)
    }

    /// Hands out the next free host address inside `cidr`.
    ///
    /// The counter lives in the cloud state, so addresses stay unique
    /// across reopens of the same state file.
    pub async fn allocate_address(&self, cidr: &str) -> Result<Ipv4Addr> {
        let (network, prefix) = parse_cidr(cidr)?;
        // network, gateway and broadcast addresses are never handed out
        let capacity = if prefix >= 31 {
            0
        } else {
            (1u64 << (32 - prefix)) - 3
        };

        let mut state = self.inner.state.lock().await;
        let host = state.addresses.entry(cidr.to_string()).or_insert(0);
        if u64::from(*host) >= capacity {
            return Err(LocalCloudError::WriteRejected(format!(
                "no free addresses left in {}",
                cidr
            )));
        }
        *host += 1;
        let address = Ipv4Addr::from(u32::from(network) + *host + 1);

        if let Some(store) = &self.inner.store {
            store.save(&state).await?;
        }
        Ok(address)
    }

    /// Snapshot of every stored resource
    pub async fn resources(&self) -> BTreeMap<String, ResourceRecord> {
        self.inner.state.lock().await.resources.clone()
    }
}

/// Splits `a.b.c.d/n` into its network address and prefix length
pub fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u8)> {
    let invalid = || LocalCloudError::InvalidResource(format!("invalid CIDR block: {}", cidr));

    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }

    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    if u32::from(addr) & !mask != 0 {
        return Err(LocalCloudError::InvalidResource(format!(
            "{} has host bits set",
            cidr
        )));
    }
    Ok((addr, prefix))
}

/// Whether `inner` lies entirely within `outer`
pub fn cidr_contains(outer: &str, inner: &str) -> Result<bool> {
    let (outer_addr, outer_prefix) = parse_cidr(outer)?;
    let (inner_addr, inner_prefix) = parse_cidr(inner)?;
    if inner_prefix < outer_prefix {
        return Ok(false);
    }
    let mask = if outer_prefix == 0 {
        0
    } else {
        u32::MAX << (32 - outer_prefix)
    };
    Ok(u32::from(inner_addr) & mask == u32::from(outer_addr))
}
