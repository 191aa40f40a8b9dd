//! Convergence executor
//!
//! Walks the dependency graph in batches: every Pending task whose
//! predecessors all Succeeded or were Skipped is dispatched onto a bounded
//! pool of tokio tasks, and the executor waits for the whole batch before
//! computing the next ready set. Tasks below a failure are marked Failed
//! without being attempted; unrelated branches keep going.

use crate::context::{Mode, RunContext};
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::protocol::{Conclusion, converge};
use crate::report::{ActionType, ExecutionRecord, FailureKind, RunReport, TaskOutcome, TaskState};
use crate::task::Task;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Tunables for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorOptions {
    /// Maximum number of tasks running at the same time
    pub max_concurrency: usize,

    /// Overall deadline; once reached no further task is dispatched
    pub deadline: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            deadline: None,
        }
    }
}

impl ExecutorOptions {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Result of one dispatched tokio task
enum Dispatch {
    Finished(Conclusion, u64),
    Cancelled,
    Panicked(String),
}

/// Runs task sets against a cloud handle
pub struct Executor {
    options: ExecutorOptions,
    cancellation: CancellationToken,
}

impl Executor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Uses an externally owned token, e.g. one cancelled on Ctrl-C
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Converges `tasks` against `cloud`.
    ///
    /// Configuration errors (duplicate, dangling reference, cycle) are
    /// returned before any task runs. Task failures do not make this return
    /// `Err`; they are recorded in the report.
    pub async fn run<C>(
        &self,
        cloud: C,
        tasks: Vec<Box<dyn Task<C>>>,
        mode: Mode,
    ) -> Result<RunReport>
    where
        C: Send + Sync + 'static,
    {
        let started = Instant::now();
        let graph = DependencyGraph::build(&tasks)?;
        let tasks: Vec<Arc<dyn Task<C>>> = tasks.into_iter().map(Arc::from).collect();
        let ctx = Arc::new(RunContext::new(cloud, mode, self.options.clone()));

        tracing::info!(
            "Starting {} of {} task(s) (max concurrency {})",
            mode,
            graph.len(),
            self.options.max_concurrency
        );

        // a child token so a deadline does not cancel the caller's token
        let cancel = self.cancellation.child_token();
        let deadline = self
            .options
            .deadline
            .map(|d| tokio::time::Instant::now() + d);
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut records: Vec<ExecutionRecord> =
            graph.keys().iter().cloned().map(ExecutionRecord::new).collect();

        loop {
            propagate_failures(&graph, &mut records);
            if cancel.is_cancelled() {
                break;
            }

            let ready = graph.ready(
                |n| records[n].state() == TaskState::Pending,
                |n| records[n].state().satisfies_dependents(),
            );
            if ready.is_empty() {
                break;
            }
            tracing::debug!(
                "Dispatching batch: {}",
                ready
                    .iter()
                    .map(|&n| graph.key(n).to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let mut batch = JoinSet::new();
            for &node in &ready {
                records[node].start();
                let task = Arc::clone(&tasks[node]);
                let ctx = Arc::clone(&ctx);
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                let span = tracing::info_span!("task", key = %graph.key(node));

                batch.spawn(
                    async move {
                        let permit = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            permit = semaphore.acquire_owned() => permit.ok(),
                        };
                        let Some(_permit) = permit else {
                            return (node, Dispatch::Cancelled);
                        };
                        if cancel.is_cancelled() {
                            return (node, Dispatch::Cancelled);
                        }

                        let task_started = Instant::now();
                        let result = AssertUnwindSafe(converge(task.as_ref(), ctx.as_ref()))
                            .catch_unwind()
                            .await;
                        let elapsed = task_started.elapsed().as_millis() as u64;
                        match result {
                            Ok(conclusion) => (node, Dispatch::Finished(conclusion, elapsed)),
                            Err(panic) => (node, Dispatch::Panicked(panic_message(&*panic))),
                        }
                    }
                    .instrument(span),
                );
            }

            self.settle_batch(&mut batch, &mut records, &cancel, deadline)
                .await;

            // anything still Running lost its tokio task
            for &node in &ready {
                if records[node].state() == TaskState::Running {
                    records[node].abandon(FailureKind::Error, "task was aborted".to_string());
                }
            }
        }

        let cancelled = cancel.is_cancelled();
        for record in records.iter_mut() {
            if record.state() == TaskState::Pending {
                record.abandon(
                    FailureKind::Cancelled,
                    "run was cancelled before this task was attempted".to_string(),
                );
            }
        }

        let mut slots: Vec<Option<ExecutionRecord>> = records.into_iter().map(Some).collect();
        let outcomes: Vec<TaskOutcome> = graph
            .topological_order()
            .into_iter()
            .filter_map(|n| slots[n].take().and_then(ExecutionRecord::into_outcome))
            .collect();

        let report = RunReport {
            mode,
            outcomes,
            cancelled,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!("Finished {}: {}", mode, report.summary());
        Ok(report)
    }

    /// Waits for every task in the batch, cancelling further dispatch when
    /// the deadline passes. In-flight tasks are always awaited.
    async fn settle_batch(
        &self,
        batch: &mut JoinSet<(usize, Dispatch)>,
        records: &mut [ExecutionRecord],
        cancel: &CancellationToken,
        deadline: Option<tokio::time::Instant>,
    ) {
        loop {
            let joined = match deadline {
                Some(at) if !cancel.is_cancelled() => {
                    tokio::select! {
                        joined = batch.join_next() => joined,
                        _ = tokio::time::sleep_until(at) => {
                            tracing::warn!("Run deadline reached; no further tasks will be started");
                            cancel.cancel();
                            continue;
                        }
                    }
                }
                _ => batch.join_next().await,
            };

            let Some(joined) = joined else {
                break;
            };
            match joined {
                Ok((node, dispatch)) => record_dispatch(&mut records[node], dispatch),
                Err(e) => tracing::error!("Task worker failed: {}", e),
            }
        }
    }
}

fn record_dispatch(record: &mut ExecutionRecord, dispatch: Dispatch) {
    match dispatch {
        Dispatch::Finished(conclusion, duration_ms) => {
            let failure = (conclusion.state == TaskState::Failed).then_some(FailureKind::Error);
            record.finish(TaskOutcome {
                key: record.key().clone(),
                state: conclusion.state,
                action: conclusion.action,
                changed: conclusion.changed,
                diff: conclusion.diff,
                warnings: conclusion.warnings,
                error: conclusion.error,
                failure,
                duration_ms,
            });
        }
        Dispatch::Cancelled => record.abandon(
            FailureKind::Cancelled,
            "run was cancelled before this task was attempted".to_string(),
        ),
        Dispatch::Panicked(message) => {
            tracing::error!("{} panicked: {}", record.key(), message);
            let conclusion =
                Conclusion::failed(ActionType::NoOp, None, format!("task panicked: {}", message));
            record_dispatch(record, Dispatch::Finished(conclusion, 0));
        }
    }
}

/// Marks every Pending task below a Failed one as blocked, in dependency
/// order. A task whose only failed predecessors were cancelled is cancelled
/// too, so cancellations are never counted as blocked.
fn propagate_failures(graph: &DependencyGraph, records: &mut [ExecutionRecord]) {
    for node in graph.topological_order() {
        if records[node].state() != TaskState::Pending {
            continue;
        }
        let failed: Vec<usize> = graph
            .dependencies(node)
            .iter()
            .copied()
            .filter(|&d| records[d].state() == TaskState::Failed)
            .collect();
        if failed.is_empty() {
            continue;
        }

        match failed.iter().copied().find(|&d| !was_cancelled(&records[d])) {
            Some(dep) => {
                let by = graph.key(dep).clone();
                tracing::debug!("{} is blocked by failed {}", graph.key(node), by);
                records[node].abandon(
                    FailureKind::Blocked { by: by.clone() },
                    format!("not attempted: dependency {} failed", by),
                );
            }
            None => records[node].abandon(
                FailureKind::Cancelled,
                "run was cancelled before this task was attempted".to_string(),
            ),
        }
    }
}

fn was_cancelled(record: &ExecutionRecord) -> bool {
    record
        .outcome()
        .is_some_and(|o| o.failure == Some(FailureKind::Cancelled))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
