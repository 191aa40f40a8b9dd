//! FleetForm convergence engine
//!
//! This crate turns a set of typed infrastructure tasks into a dependency
//! graph and converges the target cloud toward the desired state they
//! describe, either as a dry-run plan or as an apply.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        Vec<Box<dyn Task<C>>> (desired state)     │
//! └─────────────────┬───────────────────────────────┘
//!                   │ DependencyGraph::build()
//! ┌─────────────────▼───────────────────────────────┐
//! │   TaskRef markers → edges → cycle check          │
//! └─────────────────┬───────────────────────────────┘
//!                   │ Executor::run()
//! ┌─────────────────▼───────────────────────────────┐
//! │  ready set → bounded batch → find/diff/render    │
//! │         (Lifecycle decides per task)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                  RunReport                       │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod lifecycle;
mod protocol;
pub mod refs;
pub mod registry;
pub mod report;
pub mod task;

// Re-exports
pub use context::{Mode, RunContext};
pub use diff::{Changes, FieldChange};
pub use error::{ConvergeError, GraphError, Result, TaskError};
pub use executor::{Executor, ExecutorOptions};
pub use graph::DependencyGraph;
pub use lifecycle::{Decision, Lifecycle, Observation, apply_lifecycle_overrides, parse_override};
pub use refs::{TaskRef, collect_references};
pub use registry::TaskRegistry;
pub use report::{ActionType, ExecutionRecord, FailureKind, RunReport, RunSummary, TaskOutcome, TaskState};
pub use task::{CloudTask, Task, TaskKey, TaskKind, describe};
