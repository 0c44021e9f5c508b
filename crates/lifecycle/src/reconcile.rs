//! Reconciliation: polling open tasks until they reach a terminal state.
//!
//! Each cycle lists the `open` tasks, polls the agent for each of them, and
//! applies [`pipeline::decide`]. A terminal transition is persisted before the
//! origin conversation is notified, and the store refuses a second terminal
//! transition, so a task produces at most one completion comment even when a
//! comment fails or the process restarts mid-cycle.
//!
//! Per-task problems (poll errors, store write errors, notification errors)
//! are logged and counted. They never abort the cycle or the loop.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    completion_comment, decide, AgentGateway, HostingGateway, SessionStore, StayReason,
    StoreError, Task, Transition,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Counters for one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Open tasks found at the start of the cycle.
    pub polled: usize,
    pub in_progress: usize,
    /// Tasks left open because the agent reported a status we do not know.
    pub unrecognised: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub poll_errors: usize,
    pub store_errors: usize,
    pub notified: usize,
    pub notify_failures: usize,
    /// Terminal tasks with no hosting gateway or no recorded origin.
    pub notify_skipped: usize,
}

impl CycleReport {
    fn absorb(&mut self, outcome: TaskOutcome) {
        match outcome.transition {
            Outcome::InProgress => self.in_progress += 1,
            Outcome::Unrecognised => self.unrecognised += 1,
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::PollError => self.poll_errors += 1,
            Outcome::StoreError => self.store_errors += 1,
        }
        match outcome.notification {
            Notification::NotAttempted => {}
            Notification::Posted => self.notified += 1,
            Notification::Failed => self.notify_failures += 1,
            Notification::Skipped => self.notify_skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    InProgress,
    Unrecognised,
    Succeeded,
    Failed,
    PollError,
    StoreError,
}

#[derive(Debug, Clone, Copy)]
enum Notification {
    NotAttempted,
    Posted,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy)]
struct TaskOutcome {
    transition: Outcome,
    notification: Notification,
}

impl TaskOutcome {
    fn quiet(transition: Outcome) -> Self {
        Self {
            transition,
            notification: Notification::NotAttempted,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Drives open tasks to completion and reports each outcome once.
#[derive(Clone)]
pub struct Reconciler {
    agent: Arc<dyn AgentGateway>,
    store: Arc<dyn SessionStore>,
    hosting: Option<Arc<dyn HostingGateway>>,
    concurrency: usize,
}

impl Reconciler {
    /// `hosting` is `None` when no hosting credential is configured; terminal
    /// transitions are still recorded but nobody is notified.
    pub fn new(
        agent: Arc<dyn AgentGateway>,
        store: Arc<dyn SessionStore>,
        hosting: Option<Arc<dyn HostingGateway>>,
    ) -> Self {
        Self {
            agent,
            store,
            hosting,
            concurrency: 1,
        }
    }

    /// Number of tasks polled at the same time within a cycle.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Runs one reconciliation cycle over every open task.
    ///
    /// # Errors
    ///
    /// Fails only when the open tasks cannot be listed. Everything that goes
    /// wrong for an individual task is reflected in the returned report.
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let open = self.store.list_open().await?;
        let mut report = CycleReport {
            polled: open.len(),
            ..CycleReport::default()
        };
        if open.is_empty() {
            debug!("No open tasks to reconcile");
            return Ok(report);
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        for task in open {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let span = info_span!("reconcile_task", task_id = %task.task_id());
            set.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    this.reconcile_task(task).await
                }
                .instrument(span),
            );
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => {
                    error!(error = %e, "Reconcile task panicked");
                    report.poll_errors += 1;
                }
            }
        }

        info!(
            polled = report.polled,
            succeeded = report.succeeded,
            failed = report.failed,
            in_progress = report.in_progress,
            unrecognised = report.unrecognised,
            poll_errors = report.poll_errors,
            store_errors = report.store_errors,
            notified = report.notified,
            notify_failures = report.notify_failures,
            notify_skipped = report.notify_skipped,
            "Reconciliation cycle complete"
        );
        Ok(report)
    }

    async fn reconcile_task(&self, task: Task) -> TaskOutcome {
        let task_id = task.task_id().clone();

        let status = match self.agent.get_status(&task_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Failed to poll agent session; will retry next cycle");
                return TaskOutcome::quiet(Outcome::PollError);
            }
        };

        let transition = decide(&status);
        let persisted = match &transition {
            Transition::Stay(StayReason::InProgress) => {
                debug!(status = %status.status, "Agent session still working");
                return TaskOutcome::quiet(Outcome::InProgress);
            }
            Transition::Stay(StayReason::UnrecognisedStatus(raw)) => {
                warn!(status = %raw, "Unrecognised agent status; leaving task open");
                return TaskOutcome::quiet(Outcome::Unrecognised);
            }
            Transition::Succeed { result_url } => {
                self.store
                    .mark_succeeded(&task_id, result_url.clone())
                    .await
            }
            Transition::Fail { reason } => self.store.mark_failed(&task_id, reason.clone()).await,
        };

        let updated = match persisted {
            Ok(updated) => updated,
            Err(e) => {
                error!(error = %e, "Failed to record terminal state; not notifying");
                return TaskOutcome::quiet(Outcome::StoreError);
            }
        };

        let outcome = if matches!(transition, Transition::Succeed { .. }) {
            info!(result_url = ?updated.result_url(), "Task succeeded");
            Outcome::Succeeded
        } else {
            info!(reason = ?updated.failure_reason(), "Task failed");
            Outcome::Failed
        };

        TaskOutcome {
            transition: outcome,
            notification: self.notify(&updated, &transition).await,
        }
    }

    async fn notify(&self, task: &Task, transition: &Transition) -> Notification {
        let Some(hosting) = &self.hosting else {
            debug!("No hosting credential configured; skipping notification");
            return Notification::Skipped;
        };
        let Some((repo, item)) = task.origin() else {
            warn!("Task has no recorded origin; skipping notification");
            return Notification::Skipped;
        };
        let Some(body) = completion_comment(transition) else {
            return Notification::NotAttempted;
        };

        match hosting.post_comment(repo, item, &body).await {
            Ok(()) => {
                info!(repository = %repo, item_number = %item, "Posted completion comment");
                Notification::Posted
            }
            Err(e) => {
                warn!(
                    error = %e,
                    repository = %repo,
                    item_number = %item,
                    "Failed to post completion comment"
                );
                Notification::Failed
            }
        }
    }

    /// Runs cycles back to back, `interval` apart, until `shutdown` fires.
    ///
    /// A cycle in progress when `shutdown` fires is allowed to finish.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Reconciler started");
        loop {
            if let Err(e) = self.run_cycle().await {
                error!(error = %e, "Reconciliation cycle failed");
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Reconciler stopped");
    }
}
