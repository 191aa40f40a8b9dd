//! Engine error types

use crate::task::TaskKey;
use thiserror::Error;

/// Configuration errors found while resolving the dependency graph.
///
/// All of these are reported before any task executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate task: {0}")]
    DuplicateTask(TaskKey),

    #[error("Task {task} references {missing}, which is not part of the task set")]
    DanglingReference { task: TaskKey, missing: TaskKey },

    #[error("Dependency cycle detected: {}", format_cycle(.0))]
    Cycle(Vec<TaskKey>),

    #[error("Cannot inspect fields of {task}: {reason}")]
    Introspection { task: TaskKey, reason: String },
}

fn format_cycle(cycle: &[TaskKey]) -> String {
    cycle
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors raised by a task's find or render step
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Query failed: {0}")]
    Query(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Mutation failed: {0}")]
    Mutation(String),

    #[error("Reference {0} has not been materialized in this run")]
    Unresolved(TaskKey),

    #[error("Invalid resource state: {0}")]
    Invalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, TaskError::PermissionDenied(_))
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum ConvergeError {
    #[error("Invalid task graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Unknown task kind: {0}")]
    UnknownKind(String),

    #[error("Invalid definition for {kind} task: {reason}")]
    InvalidTask { kind: String, reason: String },

    #[error("Invalid lifecycle: {0}")]
    InvalidLifecycle(String),

    #[error("Run failed: {failed} task(s) failed, {blocked} blocked")]
    RunFailed { failed: usize, blocked: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConvergeError>;
