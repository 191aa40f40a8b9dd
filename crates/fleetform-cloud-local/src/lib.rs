//! FleetForm local cloud
//!
//! A self-contained cloud backend for FleetForm: resources live in memory
//! or in a JSON state file, and the usual building blocks of a deployment
//! are available as tasks.
//!
//! # Resources
//!
//! - **Network**, **Subnet**, **SecurityGroup**
//! - **Instance** (private address allocated from its subnet)
//! - **LoadBalancer**, **PoolAssociation**
//!
//! # Example
//!
//! ```ignore
//! use fleetform_cloud_local::{LocalCloud, Network, Subnet};
//! use fleetform_core::{Executor, ExecutorOptions, Mode, TaskRef};
//!
//! let cloud = LocalCloud::open(".fleetform/cloud.json").await?;
//! let tasks: Vec<Box<dyn fleetform_core::Task<LocalCloud>>> = vec![
//!     Box::new(Network { name: "main".into(), cidr: "10.0.0.0/16".into(), ..}),
//!     Box::new(Subnet { name: "a".into(), network: TaskRef::new("main"), ..}),
//! ];
//! let report = Executor::new(ExecutorOptions::default())
//!     .run(cloud, tasks, Mode::Apply)
//!     .await?;
//! ```

pub mod cloud;
pub mod error;
pub mod state;
pub mod tasks;

pub use cloud::LocalCloud;
pub use error::{LocalCloudError, Result};
pub use state::{CloudState, DEFAULT_STATE_FILE, ResourceRecord, StateLock, StateStore};
pub use tasks::{
    IngressRule, Instance, LoadBalancer, Network, PoolAssociation, Provisioned, SecurityGroup,
    Subnet, registry,
};
