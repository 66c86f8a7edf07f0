//! Batch scheduling policy
//!
//! [`PriorityPropagationTaskExecutor`] runs a batch in two lanes: resources
//! carrying a propagation priority execute one at a time, strictly in
//! ascending priority order, on the calling task; everything else goes
//! through a bounded worker pool. The first priority task that does not
//! finish with SUCCESS aborts the rest of the batch.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, instrument, warn};

use crate::entity::SecurityContext;
use crate::reporter::PropagationReporter;
use crate::task::{PropagationTaskInfo, TaskExec};
use crate::types::ExecStatus;

use super::runner::TaskRunner;
use super::{ExecutorConfig, PropagationTaskExecutor};

/// Executes batches of propagation tasks under the priority policy.
pub struct PriorityPropagationTaskExecutor {
    runner: Arc<TaskRunner>,
    pool: Arc<Semaphore>,
}

impl PriorityPropagationTaskExecutor {
    /// Create an executor around the given runner.
    pub fn new(runner: TaskRunner, config: ExecutorConfig) -> Self {
        Self {
            runner: Arc::new(runner),
            pool: Arc::new(Semaphore::new(config.pool_size)),
        }
    }

    /// Stop accepting non-priority submissions: tasks submitted afterwards
    /// are converted to NOT_ATTEMPTED rejection records.
    pub fn shutdown(&self) {
        self.pool.close();
    }
}

#[async_trait]
impl PropagationTaskExecutor for PriorityPropagationTaskExecutor {
    async fn execute(
        &self,
        mut task: PropagationTaskInfo,
        reporter: &PropagationReporter,
        ctx: &SecurityContext,
    ) -> TaskExec {
        self.runner.execute(&mut task, reporter, ctx).await
    }

    async fn rejected(
        &self,
        task: &PropagationTaskInfo,
        reason: &str,
        reporter: &PropagationReporter,
        ctx: &SecurityContext,
    ) -> TaskExec {
        self.runner.rejected(task, reason, reporter, ctx).await
    }

    #[instrument(skip_all, fields(tasks = tasks.len(), null_priority_async))]
    async fn execute_all(
        &self,
        tasks: Vec<PropagationTaskInfo>,
        null_priority_async: bool,
        ctx: &SecurityContext,
    ) -> Arc<PropagationReporter> {
        let reporter = Arc::new(PropagationReporter::new());

        let (mut priority, non_priority): (Vec<_>, Vec<_>) = tasks
            .iter()
            .cloned()
            .partition(|t| t.resource.propagation_priority.is_some());
        priority.sort_by_key(|t| t.resource.propagation_priority.unwrap_or(i32::MAX));

        debug!(
            priority = priority.len(),
            non_priority = non_priority.len(),
            "Executing batch"
        );

        // Priority lane: one at a time, each fully completes (including its
        // reporter write) before the next starts.
        for mut task in priority {
            let exec = self.runner.execute(&mut task, &reporter, ctx).await;
            if !exec.is_success() {
                warn!(
                    resource = %task.resource.key,
                    status = %exec.status,
                    "Priority propagation did not succeed, aborting the remaining tasks"
                );
                reporter.on_priority_resource_failure(&task.resource.key, &tasks);
                return reporter;
            }
        }

        // Non-priority lane: bounded pool, no ordering guarantee. The pool
        // permit is acquired inside the worker so that submission never
        // blocks the caller.
        let mut handles = Vec::with_capacity(non_priority.len());
        for task in non_priority {
            if null_priority_async {
                reporter.on_success_or_non_priority_resource_failures(
                    &task,
                    ExecStatus::Created,
                    None,
                    None,
                    None,
                    None,
                );
            }

            let runner = Arc::clone(&self.runner);
            let pool = Arc::clone(&self.pool);
            let reporter = Arc::clone(&reporter);
            // The acting context is captured at submission time and handed to
            // the worker explicitly.
            let ctx = ctx.clone();
            let mut task = task;

            handles.push(tokio::spawn(async move {
                let permit = match pool.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(
                            resource = %task.resource.key,
                            "Worker pool no longer accepting submissions"
                        );
                        runner
                            .rejected(
                                &task,
                                "Execution rejected: worker pool shut down",
                                &reporter,
                                &ctx,
                            )
                            .await;
                        return;
                    }
                };
                let _permit = permit;

                runner.execute(&mut task, &reporter, &ctx).await;
            }));
        }

        if null_priority_async {
            // Fire and forget: every non-priority entry already reads
            // CREATED; workers finish on their own.
            return reporter;
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Non-priority propagation worker aborted");
            }
        }

        reporter
    }
}
