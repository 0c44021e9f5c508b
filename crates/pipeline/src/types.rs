//! Shared value types for the review-relay domain.
//!
//! [`Task`] is the persisted record of one launched agent session. Its state is
//! a sum type so that the terminal fields can only exist in the matching state:
//! a result URL lives inside [`TaskState::Succeeded`], a failure reason inside
//! [`TaskState::Failed`]. Mutation goes through [`Task::succeed`] and
//! [`Task::fail`], both of which refuse to touch a task that already left
//! [`TaskState::Open`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ItemNumber, RepositoryId, TaskId};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Task request
// ---------------------------------------------------------------------------

/// The parameters extracted from an actionable webhook event.
///
/// Produced only by [`crate::EventClassifier`]; every field is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    target_url: String,
    instruction_text: String,
    origin_repo: RepositoryId,
    origin_item_number: ItemNumber,
}

impl TaskRequest {
    /// Creates a [`TaskRequest`], returning `None` if the URL or the
    /// instruction text is empty. Whitespace is kept verbatim.
    pub fn new(
        target_url: impl Into<String>,
        instruction_text: impl Into<String>,
        origin_repo: RepositoryId,
        origin_item_number: ItemNumber,
    ) -> Option<Self> {
        let target_url = target_url.into();
        let instruction_text = instruction_text.into();
        if target_url.is_empty() || instruction_text.is_empty() {
            return None;
        }
        Some(Self {
            target_url,
            instruction_text,
            origin_repo,
            origin_item_number,
        })
    }

    /// URL of the reviewable item the agent should work on.
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// The triggering comment body, verbatim.
    pub fn instruction_text(&self) -> &str {
        &self.instruction_text
    }

    /// Repository of the originating conversation.
    pub fn origin_repo(&self) -> &RepositoryId {
        &self.origin_repo
    }

    /// Issue or pull request number of the originating conversation.
    pub fn origin_item_number(&self) -> ItemNumber {
        self.origin_item_number
    }
}

// ---------------------------------------------------------------------------
// Task state
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`Task`].
///
/// `Open` is the only non-terminal state. The terminal variants carry the data
/// that only makes sense once the agent has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// The agent session is still running (or has not been polled yet).
    Open,
    /// The agent reported completion.
    Succeeded {
        /// URL of the result (typically a new pull request), when the agent
        /// reported one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_url: Option<String>,
    },
    /// The agent reported that it could not proceed.
    Failed {
        /// Human-readable reason, as reported by the agent.
        failure_reason: String,
    },
}

impl TaskState {
    /// The field-less discriminant of this state.
    pub fn kind(&self) -> TaskStateKind {
        match self {
            Self::Open => TaskStateKind::Open,
            Self::Succeeded { .. } => TaskStateKind::Succeeded,
            Self::Failed { .. } => TaskStateKind::Failed,
        }
    }
}

/// Field-less view of [`TaskState`], used in errors and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStateKind {
    Open,
    Succeeded,
    Failed,
}

impl std::fmt::Display for TaskStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Persisted record of one launched agent session and its eventual outcome.
///
/// Identity and origin fields are fixed at construction. The origin fields are
/// optional only so that records written without them can still be loaded;
/// tasks created by intake always carry both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    task_id: TaskId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_repo: Option<RepositoryId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_item_number: Option<ItemNumber>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    instruction_text: Option<String>,

    #[serde(flatten)]
    state: TaskState,

    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Task {
    /// Creates the `open` record for a freshly launched agent session.
    pub fn open(task_id: TaskId, request: &TaskRequest, now: Timestamp) -> Self {
        Self {
            task_id,
            origin_repo: Some(request.origin_repo().clone()),
            origin_item_number: Some(request.origin_item_number()),
            instruction_text: Some(request.instruction_text().to_string()),
            state: TaskState::Open,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates an `open` record with explicitly supplied (possibly absent)
    /// origin fields.
    pub fn open_with_origin(
        task_id: TaskId,
        origin_repo: Option<RepositoryId>,
        origin_item_number: Option<ItemNumber>,
        instruction_text: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            task_id,
            origin_repo,
            origin_item_number,
            instruction_text,
            state: TaskState::Open,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn origin_repo(&self) -> Option<&RepositoryId> {
        self.origin_repo.as_ref()
    }

    pub fn origin_item_number(&self) -> Option<ItemNumber> {
        self.origin_item_number
    }

    /// The originating conversation, when both halves of it are known.
    pub fn origin(&self) -> Option<(&RepositoryId, ItemNumber)> {
        Some((self.origin_repo.as_ref()?, self.origin_item_number?))
    }

    pub fn instruction_text(&self) -> Option<&str> {
        self.instruction_text.as_deref()
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn kind(&self) -> TaskStateKind {
        self.state.kind()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, TaskState::Open)
    }

    /// The result URL; present only in the `succeeded` state.
    pub fn result_url(&self) -> Option<&str> {
        match &self.state {
            TaskState::Succeeded { result_url } => result_url.as_deref(),
            _ => None,
        }
    }

    /// The failure reason; present only in the `failed` state.
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            TaskState::Failed { failure_reason } => Some(failure_reason.as_str()),
            _ => None,
        }
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Moves the task from `open` to `succeeded`.
    ///
    /// # Errors
    ///
    /// Returns the current state kind, without modifying the task, if the
    /// task is not `open`.
    pub fn succeed(
        &mut self,
        result_url: Option<String>,
        now: Timestamp,
    ) -> Result<(), TaskStateKind> {
        self.ensure_open()?;
        let result_url = result_url.filter(|u| !u.trim().is_empty());
        self.state = TaskState::Succeeded { result_url };
        self.updated_at = now;
        Ok(())
    }

    /// Moves the task from `open` to `failed`.
    ///
    /// # Errors
    ///
    /// Returns the current state kind, without modifying the task, if the
    /// task is not `open`.
    pub fn fail(
        &mut self,
        failure_reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), TaskStateKind> {
        self.ensure_open()?;
        self.state = TaskState::Failed {
            failure_reason: failure_reason.into(),
        };
        self.updated_at = now;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), TaskStateKind> {
        match self.kind() {
            TaskStateKind::Open => Ok(()),
            other => Err(other),
        }
    }
}
