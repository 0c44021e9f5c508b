//! Core domain for review-relay.
//!
//! review-relay turns review-bot comments on GitHub pull requests into coding
//! agent sessions and reports each session's outcome back into the pull
//! request. This crate holds every domain concept, the pure decision functions,
//! and the port traits. Infrastructure crates implement the traits defined
//! here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`TaskId`, `RepositoryId`, `ItemNumber`, etc.) |
//! | [`types`] | `Task`, `TaskState`, `TaskRequest`, `Timestamp` |
//! | [`errors`] | Configuration, gateway, and store error types |
//! | [`classifier`] | Webhook event → `TaskRequest` |
//! | [`prompt`] | `TaskRequest` → agent instruction |
//! | [`transition`] | Agent status → task transition, completion comment text |
//! | [`ports`] | `AgentGateway`, `HostingGateway`, `SessionStore` |

pub mod classifier;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod prompt;
pub mod transition;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use classifier::{EventClassifier, Rejection, DEFAULT_WEB_HOST};
pub use errors::{ConfigurationError, GatewayError, RepositoryError, StoreError};
pub use identifiers::{DeliveryId, ItemNumber, RepositoryId, TaskId};
pub use ports::{AgentGateway, HostingGateway, InsertOutcome, SessionStore};
pub use prompt::{build_prompt, prompt_for};
pub use transition::{
    completion_comment, decide, AgentRunState, AgentStatusReport, StayReason, Transition,
};
pub use types::{Task, TaskRequest, TaskState, TaskStateKind, Timestamp};
