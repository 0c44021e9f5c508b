//! review-relay orchestration.
//!
//! Two loops run against the port traits from the [`pipeline`] crate:
//!
//! - **Intake** ([`intake`]): verified webhook payloads are queued by the HTTP
//!   boundary and drained by an [`IntakeWorker`], which classifies each event,
//!   starts an agent session, and records an `open` task.
//! - **Reconciliation** ([`reconcile`]): a [`Reconciler`] periodically polls
//!   every `open` task, persists terminal transitions, and posts one completion
//!   comment per task.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** This crate sequences calls between the pure logic
//! in [`pipeline`] and the gateway and store implementations injected by the
//! composition root. It contains no wire formats and no domain rules of its
//! own.
//!
//! Both loops stop when their [`tokio_util::sync::CancellationToken`] fires.

pub mod intake;
pub mod reconcile;

#[cfg(test)]
mod testing;

pub use intake::{
    intake_queue, IntakeEvent, IntakePipeline, IntakeSender, IntakeWorker, LaunchOutcome,
    SubmitError,
};
pub use reconcile::{CycleReport, Reconciler};
