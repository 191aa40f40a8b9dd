//! Find → Diff → Render for a single task

use crate::context::RunContext;
use crate::diff::Changes;
use crate::lifecycle::{Decision, Lifecycle, Observation};
use crate::report::{ActionType, TaskState};
use crate::task::Task;
use serde_json::Value;

/// What happened to one dispatched task
#[derive(Debug, Clone)]
pub(crate) struct Conclusion {
    pub state: TaskState,
    pub action: ActionType,
    pub changed: bool,
    pub diff: Option<String>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl Conclusion {
    fn unchanged() -> Self {
        Self {
            state: TaskState::Skipped,
            action: ActionType::NoOp,
            changed: false,
            diff: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    fn changed(changes: &Changes) -> Self {
        Self {
            state: TaskState::Succeeded,
            action: changes.action(),
            changed: true,
            diff: Some(changes.to_string()),
            warnings: Vec::new(),
            error: None,
        }
    }

    fn warned(changes: &Changes, warning: String) -> Self {
        Self {
            state: TaskState::Skipped,
            action: changes.action(),
            changed: false,
            diff: (!changes.is_empty()).then(|| changes.to_string()),
            warnings: vec![warning],
            error: None,
        }
    }

    pub(crate) fn failed(action: ActionType, diff: Option<String>, error: String) -> Self {
        Self {
            state: TaskState::Failed,
            action,
            changed: false,
            diff,
            warnings: Vec::new(),
            error: Some(error),
        }
    }
}

/// Runs the three-step protocol for `task`, letting its lifecycle gate any
/// mutation. Never panics on task errors; they become a Failed conclusion.
pub(crate) async fn converge<C>(task: &dyn Task<C>, ctx: &RunContext<C>) -> Conclusion {
    let key = task.key();
    let lifecycle = task.lifecycle();

    let actual = match task.find(ctx).await {
        Ok(actual) => actual,
        Err(e) if e.is_permission_denied() => {
            let observation = Observation {
                exists: false,
                has_changes: true,
                permission_denied: true,
            };
            if lifecycle.decide(observation) == Decision::Warn {
                let warning = format!("{}: {} (ignored by lifecycle {})", key, e, lifecycle);
                tracing::warn!("{}", warning);
                return Conclusion::warned(&Changes::none(), warning);
            }
            tracing::error!("Failed to query current state of {}: {}", key, e);
            return Conclusion::failed(ActionType::NoOp, None, e.to_string());
        }
        Err(e) => {
            tracing::error!("Failed to query current state of {}: {}", key, e);
            return Conclusion::failed(ActionType::NoOp, None, e.to_string());
        }
    };
    let exists = actual.is_some();

    if !lifecycle.compares_fields(exists) {
        tracing::debug!("{} exists; lifecycle {} leaves it untouched", key, lifecycle);
        if let Some(actual) = actual {
            ctx.publish(key, actual);
        }
        return Conclusion::unchanged();
    }

    let desired = match task.desired() {
        Ok(desired) => desired,
        Err(e) => return Conclusion::failed(ActionType::NoOp, None, e.to_string()),
    };
    let changes = match &actual {
        Some(actual) => Changes::between(actual, &desired, task.ignored_fields()),
        None => Changes::create(&desired, task.ignored_fields()),
    };

    let observation = Observation {
        exists,
        has_changes: !changes.is_empty(),
        permission_denied: false,
    };

    match lifecycle.decide(observation) {
        Decision::NoOp => {
            tracing::debug!("{} is up to date", key);
            ctx.publish(key, actual.unwrap_or(desired));
            Conclusion::unchanged()
        }
        Decision::Warn => {
            let warning = format!(
                "{} needs changes ({}) but lifecycle {} does not allow them",
                key,
                changes.action(),
                lifecycle
            );
            tracing::warn!("{}", warning);
            if let Some(actual) = actual {
                ctx.publish(key, actual);
            }
            Conclusion::warned(&changes, warning)
        }
        Decision::Fail => {
            let error = if exists {
                format!("{} does not match its desired state", key)
            } else {
                format!("{} does not exist", key)
            };
            tracing::error!("{} (lifecycle {})", error, lifecycle);
            Conclusion::failed(changes.action(), Some(changes.to_string()), error)
        }
        Decision::Apply => apply(task, ctx, lifecycle, actual, desired, changes).await,
    }
}

async fn apply<C>(
    task: &dyn Task<C>,
    ctx: &RunContext<C>,
    lifecycle: Lifecycle,
    actual: Option<Value>,
    desired: Value,
    changes: Changes,
) -> Conclusion {
    let key = task.key();

    if ctx.is_dry_run() {
        tracing::debug!("Would {} {}", changes.action(), key);
        let planned = match &actual {
            Some(actual) => overlay(actual, &desired),
            None => desired,
        };
        ctx.publish(key, planned);
        return Conclusion::changed(&changes);
    }

    tracing::info!("Applying {} to {}", changes.action(), key);
    match task.render(ctx, actual.as_ref(), &changes).await {
        Ok(rendered) => {
            let materialized = match (rendered, &actual) {
                (Some(rendered), _) => rendered,
                (None, Some(actual)) => overlay(actual, &desired),
                (None, None) => desired,
            };
            ctx.publish(key, materialized);
            Conclusion::changed(&changes)
        }
        Err(e) if e.is_permission_denied() => {
            let observation = Observation {
                exists: actual.is_some(),
                has_changes: true,
                permission_denied: true,
            };
            match lifecycle.decide(observation) {
                Decision::Warn => {
                    let warning = format!("{}: {} (ignored by lifecycle {})", key, e, lifecycle);
                    tracing::warn!("{}", warning);
                    if let Some(actual) = actual {
                        ctx.publish(key, actual);
                    }
                    Conclusion::warned(&changes, warning)
                }
                _ => {
                    tracing::error!("Failed to {} {}: {}", changes.action(), key, e);
                    Conclusion::failed(changes.action(), Some(changes.to_string()), e.to_string())
                }
            }
        }
        Err(e) => {
            tracing::error!("Failed to {} {}: {}", changes.action(), key, e);
            Conclusion::failed(changes.action(), Some(changes.to_string()), e.to_string())
        }
    }
}

/// `base` with every set field of `top` written over it
fn overlay(base: &Value, top: &Value) -> Value {
    let mut merged = base.clone();
    if let (Some(merged_map), Some(top_map)) = (merged.as_object_mut(), top.as_object()) {
        for (field, value) in top_map {
            if !value.is_null() {
                merged_map.insert(field.clone(), value.clone());
            }
        }
    }
    merged
}
