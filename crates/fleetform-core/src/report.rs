//! Execution records and the per-run report

use crate::context::Mode;
use crate::error::ConvergeError;
use crate::task::TaskKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change a task needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// No changes needed
    NoOp,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// State of a task within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Skipped,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Skipped | TaskState::Failed
        )
    }

    /// Whether dependents may run after this state
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Skipped)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Skipped => write!(f, "skipped"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// Why a task ended up Failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailureKind {
    /// The task itself reported an error
    Error,
    /// A predecessor failed, so the task was never attempted
    Blocked { by: TaskKey },
    /// The run was cancelled before the task was attempted
    Cancelled,
}

/// Terminal result of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub key: TaskKey,
    pub state: TaskState,
    pub action: ActionType,
    /// Whether a change was made (or, in a dry-run, would be made)
    pub changed: bool,
    /// Field-level description of the change
    pub diff: Option<String>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub duration_ms: u64,
}

impl TaskOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self.failure, Some(FailureKind::Blocked { .. }))
    }
}

/// Mutable record of one task while a run is in progress.
///
/// Moves Pending → Running → {Succeeded, Skipped, Failed}; a task blocked by
/// a failed predecessor or by cancellation goes straight to Failed.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    key: TaskKey,
    state: TaskState,
    outcome: Option<TaskOutcome>,
}

impl ExecutionRecord {
    pub fn new(key: TaskKey) -> Self {
        Self {
            key,
            state: TaskState::Pending,
            outcome: None,
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.as_ref()
    }

    pub fn start(&mut self) {
        debug_assert_eq!(self.state, TaskState::Pending, "{} started twice", self.key);
        self.state = TaskState::Running;
    }

    pub fn finish(&mut self, outcome: TaskOutcome) {
        debug_assert!(!self.state.is_terminal(), "{} finished twice", self.key);
        debug_assert!(outcome.state.is_terminal());
        self.state = outcome.state;
        self.outcome = Some(outcome);
    }

    /// Fails a task that will never be attempted
    pub fn abandon(&mut self, failure: FailureKind, error: String) {
        self.finish(TaskOutcome {
            key: self.key.clone(),
            state: TaskState::Failed,
            action: ActionType::NoOp,
            changed: false,
            diff: None,
            warnings: Vec::new(),
            error: Some(error),
            failure: Some(failure),
            duration_ms: 0,
        });
    }

    pub fn into_outcome(self) -> Option<TaskOutcome> {
        self.outcome
    }
}

/// Report for a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: Mode,
    /// Outcomes in execution (topological) order
    pub outcomes: Vec<TaskOutcome>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self
                .outcomes
                .iter()
                .all(|o| o.state.satisfies_dependents())
    }

    pub fn get(&self, key: &TaskKey) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }

    /// Tasks that failed on their own
    pub fn failed(&self) -> Vec<&TaskOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.failure == Some(FailureKind::Error))
            .collect()
    }

    /// Tasks never attempted because a predecessor failed
    pub fn blocked(&self) -> Vec<&TaskOutcome> {
        self.outcomes.iter().filter(|o| o.is_blocked()).collect()
    }

    pub fn changed(&self) -> Vec<&TaskOutcome> {
        self.outcomes.iter().filter(|o| o.changed).collect()
    }

    pub fn warnings(&self) -> Vec<(&TaskKey, &str)> {
        self.outcomes
            .iter()
            .flat_map(|o| o.warnings.iter().map(move |w| (&o.key, w.as_str())))
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        let count =
            |f: &dyn Fn(&TaskOutcome) -> bool| self.outcomes.iter().filter(|&o| f(o)).count();
        RunSummary {
            create: count(&|o| o.changed && o.action == ActionType::Create),
            update: count(&|o| o.changed && o.action == ActionType::Update),
            unchanged: count(&|o| o.state == TaskState::Skipped && o.warnings.is_empty()),
            warned: count(&|o| !o.warnings.is_empty()),
            failed: count(&|o| o.failure.is_some() && !o.is_blocked()),
            blocked: count(&|o| o.is_blocked()),
        }
    }

    /// Converts a failed run into an error
    pub fn into_result(self) -> Result<RunReport, ConvergeError> {
        if self.is_success() {
            return Ok(self);
        }
        let summary = self.summary();
        Err(ConvergeError::RunFailed {
            failed: summary.failed,
            blocked: summary.blocked,
        })
    }
}

/// Counts of outcomes in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub create: usize,
    pub update: usize,
    pub unchanged: usize,
    pub warned: usize,
    pub failed: usize,
    pub blocked: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} unchanged, {} with warnings, {} failed, {} blocked",
            self.create, self.update, self.unchanged, self.warned, self.failed, self.blocked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, state: TaskState, action: ActionType, changed: bool) -> TaskOutcome {
        TaskOutcome {
            key: TaskKey::new("Network", name),
            state,
            action,
            changed,
            diff: None,
            warnings: Vec::new(),
            error: None,
            failure: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_record_transitions() {
        let mut record = ExecutionRecord::new(TaskKey::new("Network", "a"));
        assert_eq!(record.state(), TaskState::Pending);
        record.start();
        assert_eq!(record.state(), TaskState::Running);
        record.finish(outcome("a", TaskState::Succeeded, ActionType::Create, true));
        assert_eq!(record.state(), TaskState::Succeeded);
        assert!(record.outcome().unwrap().changed);
    }

    #[test]
    fn test_abandoned_record_is_failed() {
        let mut record = ExecutionRecord::new(TaskKey::new("Subnet", "b"));
        record.abandon(
            FailureKind::Blocked {
                by: TaskKey::new("Network", "a"),
            },
            "blocked".into(),
        );
        assert_eq!(record.state(), TaskState::Failed);
        assert!(record.into_outcome().unwrap().is_blocked());
    }

    #[test]
    fn test_summary_and_success() {
        let mut failed = outcome("c", TaskState::Failed, ActionType::NoOp, false);
        failed.failure = Some(FailureKind::Error);
        let mut blocked = outcome("d", TaskState::Failed, ActionType::NoOp, false);
        blocked.failure = Some(FailureKind::Blocked {
            by: TaskKey::new("Network", "c"),
        });

        let report = RunReport {
            mode: Mode::Apply,
            outcomes: vec![
                outcome("a", TaskState::Succeeded, ActionType::Create, true),
                outcome("b", TaskState::Skipped, ActionType::NoOp, false),
                failed,
                blocked,
            ],
            cancelled: false,
            duration_ms: 0,
        };

        let summary = report.summary();
        assert_eq!(summary.create, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.blocked, 1);
        assert!(!report.is_success());
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.blocked().len(), 1);
        assert!(matches!(
            report.into_result(),
            Err(ConvergeError::RunFailed {
                failed: 1,
                blocked: 1
            })
        ));
    }
}
