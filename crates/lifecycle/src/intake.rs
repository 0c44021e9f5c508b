//! Task intake: from a verified webhook payload to a persisted `open` task.
//!
//! The HTTP boundary never runs intake itself. It hands each payload to an
//! [`IntakeSender`] and answers immediately; an [`IntakeWorker`] drains the
//! queue, runs [`IntakePipeline::launch`] for each event with bounded
//! concurrency, and owns every error that comes out of it.

use std::sync::Arc;

use pipeline::{
    prompt_for, AgentGateway, DeliveryId, EventClassifier, InsertOutcome, Rejection,
    SessionStore, StoreError, Task, TaskId, Timestamp,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

// ---------------------------------------------------------------------------
// Launch outcome
// ---------------------------------------------------------------------------

/// Result of one [`IntakePipeline::launch`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// An agent session was started and recorded.
    Launched(TaskId),
    /// The event is not actionable.
    Skipped(Rejection),
    /// The agent gateway refused or failed; nothing was recorded.
    Failed(String),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Classify → build prompt → start agent session → record `open` task.
pub struct IntakePipeline {
    classifier: EventClassifier,
    agent: Arc<dyn AgentGateway>,
    store: Arc<dyn SessionStore>,
    idempotent: bool,
}

impl IntakePipeline {
    pub fn new(
        classifier: EventClassifier,
        agent: Arc<dyn AgentGateway>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            classifier,
            agent,
            store,
            idempotent: false,
        }
    }

    /// Ask the agent API to deduplicate identical session requests.
    pub fn with_idempotent_sessions(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Attempts to launch an agent task for one webhook payload.
    ///
    /// Gateway failures become [`LaunchOutcome::Failed`]. Store failures are
    /// returned as errors: at that point the remote session exists but has no
    /// local record, which the caller must surface.
    #[instrument(skip_all)]
    pub async fn launch(&self, event: &Value) -> Result<LaunchOutcome, StoreError> {
        let request = match self.classifier.classify(event) {
            Ok(request) => request,
            Err(rejection) => return Ok(LaunchOutcome::Skipped(rejection)),
        };

        info!(
            repository = %request.origin_repo(),
            item_number = %request.origin_item_number(),
            "Launching agent session for review comment"
        );

        let prompt = prompt_for(&request);
        let task_id = match self.agent.create_task(&prompt, self.idempotent).await {
            Ok(task_id) => task_id,
            Err(e) => {
                return Ok(LaunchOutcome::Failed(e.to_string()));
            }
        };

        let task = Task::open(task_id.clone(), &request, Timestamp::now());
        match self.store.insert(task).await? {
            InsertOutcome::Inserted => {
                info!(task_id = %task_id, "Recorded open task");
            }
            InsertOutcome::AlreadyPresent => {
                warn!(task_id = %task_id, "Task already recorded; keeping existing record");
            }
        }

        Ok(LaunchOutcome::Launched(task_id))
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// One verified webhook delivery waiting for intake.
#[derive(Debug, Clone)]
pub struct IntakeEvent {
    pub delivery_id: DeliveryId,
    /// Value of the `X-GitHub-Event` header.
    pub event_type: String,
    pub payload: Value,
}

/// Why an event could not be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("intake queue is full")]
    Full,
    #[error("intake worker has stopped")]
    Closed,
}

/// Producer half of the intake queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IntakeSender {
    tx: mpsc::Sender<IntakeEvent>,
}

impl IntakeSender {
    /// Queues `event` without waiting.
    pub fn submit(&self, event: IntakeEvent) -> Result<(), SubmitError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

/// Creates a bounded intake queue.
pub fn intake_queue(capacity: usize) -> (IntakeSender, mpsc::Receiver<IntakeEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IntakeSender { tx }, rx)
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Drains the intake queue, running launches concurrently up to a limit.
pub struct IntakeWorker {
    pipeline: Arc<IntakePipeline>,
    concurrency: usize,
}

impl IntakeWorker {
    pub fn new(pipeline: Arc<IntakePipeline>, concurrency: usize) -> Self {
        Self {
            pipeline,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs until every sender is dropped or `shutdown` fires.
    ///
    /// On shutdown the queue is closed, events already queued are still
    /// processed, and the call returns only after every in-flight launch has
    /// finished.
    pub async fn run(self, mut rx: mpsc::Receiver<IntakeEvent>, shutdown: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        info!(concurrency = self.concurrency, "Intake worker started");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    rx.close();
                    None
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    reap(joined);
                    continue;
                }
                event = rx.recv() => event,
            };

            let Some(event) = event else { break };
            self.dispatch(event, &semaphore, &mut in_flight).await;
        }

        // Anything still buffered was accepted by the HTTP boundary; finish it.
        while let Some(event) = rx.recv().await {
            self.dispatch(event, &semaphore, &mut in_flight).await;
        }
        while let Some(joined) = in_flight.join_next().await {
            reap(joined);
        }

        info!("Intake worker stopped");
    }

    async fn dispatch(
        &self,
        event: IntakeEvent,
        semaphore: &Arc<Semaphore>,
        in_flight: &mut JoinSet<()>,
    ) {
        let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
            error!("Intake semaphore closed; dropping event");
            return;
        };
        let pipeline = Arc::clone(&self.pipeline);
        let span = info_span!(
            "intake",
            delivery_id = %event.delivery_id,
            event_type = %event.event_type
        );
        in_flight.spawn(
            async move {
                let _permit = permit;
                process(&pipeline, &event.payload).await;
            }
            .instrument(span),
        );
    }
}

async fn process(pipeline: &IntakePipeline, payload: &Value) {
    match pipeline.launch(payload).await {
        Ok(LaunchOutcome::Launched(task_id)) => {
            info!(task_id = %task_id, "Intake launched agent session");
        }
        Ok(LaunchOutcome::Skipped(reason)) => {
            debug!(reason = %reason, "Event is not actionable, skipping");
        }
        Ok(LaunchOutcome::Failed(reason)) => {
            error!(reason = %reason, "Failed to create agent session");
        }
        Err(e) => {
            error!(
                error = %e,
                "Agent session was created but could not be recorded; it will not be reconciled"
            );
        }
    }
}

fn reap(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Intake task panicked");
    }
}
