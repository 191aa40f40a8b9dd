//! Lifecycle policies
//!
//! A lifecycle gates how far the engine may go when mutating a resource
//! that already exists. Evaluation is a pure function of what Find and Diff
//! observed; it never depends on the resource type.

use crate::error::ConvergeError;
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Mutation policy for a task, ordered by increasing permissiveness
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String")]
pub enum Lifecycle {
    /// The resource must exist and match; any required change fails the task
    ExistsAndValidates,
    /// Leave an existing resource alone without comparing fields
    IgnoreIfExists,
    /// Report required changes as warnings without applying them
    WarnIfChangesNeeded,
    /// Reconcile, but downgrade permission errors to warnings
    WarnIfInsufficientAccess,
    /// Create if absent, update in place if different
    #[default]
    Sync,
}

/// What Find/Diff/Render observed for a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    pub exists: bool,
    pub has_changes: bool,
    pub permission_denied: bool,
}

/// Outcome of evaluating a lifecycle against an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoOp,
    Warn,
    Apply,
    Fail,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 5] = [
        Lifecycle::ExistsAndValidates,
        Lifecycle::IgnoreIfExists,
        Lifecycle::WarnIfChangesNeeded,
        Lifecycle::WarnIfInsufficientAccess,
        Lifecycle::Sync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::ExistsAndValidates => "ExistsAndValidates",
            Lifecycle::IgnoreIfExists => "IgnoreIfExists",
            Lifecycle::WarnIfChangesNeeded => "WarnIfChangesNeeded",
            Lifecycle::WarnIfInsufficientAccess => "WarnIfInsufficientAccess",
            Lifecycle::Sync => "Sync",
        }
    }

    /// Whether fields are compared at all once existence is known
    pub fn compares_fields(&self, exists: bool) -> bool {
        !(exists && *self == Lifecycle::IgnoreIfExists)
    }

    pub fn decide(&self, observation: Observation) -> Decision {
        let Observation {
            exists,
            has_changes,
            permission_denied,
        } = observation;
        // a missing resource always needs a change
        let has_changes = has_changes || !exists;

        match self {
            Lifecycle::ExistsAndValidates => {
                if has_changes || permission_denied {
                    Decision::Fail
                } else {
                    Decision::NoOp
                }
            }
            Lifecycle::IgnoreIfExists => {
                if permission_denied {
                    Decision::Fail
                } else if exists {
                    Decision::NoOp
                } else {
                    Decision::Apply
                }
            }
            Lifecycle::WarnIfChangesNeeded => {
                if has_changes || permission_denied {
                    Decision::Warn
                } else {
                    Decision::NoOp
                }
            }
            Lifecycle::WarnIfInsufficientAccess => {
                if permission_denied {
                    Decision::Warn
                } else if has_changes {
                    Decision::Apply
                } else {
                    Decision::NoOp
                }
            }
            Lifecycle::Sync => {
                if permission_denied {
                    Decision::Fail
                } else if has_changes {
                    Decision::Apply
                } else {
                    Decision::NoOp
                }
            }
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifecycle {
    type Err = ConvergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "existsandvalidates" => Ok(Lifecycle::ExistsAndValidates),
            "ignoreifexists" | "ignore" => Ok(Lifecycle::IgnoreIfExists),
            "warnifchangesneeded" | "existsandwarnifchanges" => {
                Ok(Lifecycle::WarnIfChangesNeeded)
            }
            "warnifinsufficientaccess" => Ok(Lifecycle::WarnIfInsufficientAccess),
            "sync" => Ok(Lifecycle::Sync),
            _ => Err(ConvergeError::InvalidLifecycle(format!(
                "'{}' (expected one of: {})",
                s,
                Lifecycle::ALL.map(|l| l.as_str()).join(", ")
            ))),
        }
    }
}

impl TryFrom<String> for Lifecycle {
    type Error = ConvergeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Parses a `Kind=Policy` override
pub fn parse_override(s: &str) -> Result<(String, Lifecycle), ConvergeError> {
    let (kind, policy) = s.split_once('=').ok_or_else(|| {
        ConvergeError::InvalidLifecycle(format!("'{}' (expected Kind=Policy)", s))
    })?;
    let kind = kind.trim();
    if kind.is_empty() {
        return Err(ConvergeError::InvalidLifecycle(format!(
            "'{}' (missing task kind)",
            s
        )));
    }
    Ok((kind.to_string(), policy.parse()?))
}

/// Replaces the lifecycle of every task whose kind has an override.
///
/// Returns the number of tasks changed.
pub fn apply_lifecycle_overrides<C>(
    tasks: &mut [Box<dyn Task<C>>],
    overrides: &BTreeMap<String, Lifecycle>,
) -> usize {
    let mut changed = 0;
    for task in tasks.iter_mut() {
        let key = task.key();
        let Some(lifecycle) = overrides.get(key.kind()) else {
            continue;
        };
        if task.lifecycle() != *lifecycle {
            tracing::debug!(
                "Overriding lifecycle of {}: {} -> {}",
                key,
                task.lifecycle(),
                lifecycle
            );
            task.set_lifecycle(*lifecycle);
            changed += 1;
        }
    }
    changed
}
