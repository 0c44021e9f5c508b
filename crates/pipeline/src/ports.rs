//! Port traits implemented by the infrastructure crates.
//!
//! | Trait | Implemented by |
//! |-------|----------------|
//! | [`AgentGateway`] | `agent` (sessions API over HTTPS) |
//! | [`HostingGateway`] | `github` (issue comments API over HTTPS) |
//! | [`SessionStore`] | `store` (whole-file JSON) |
//!
//! All traits are object safe so the composition root can hand them around as
//! `Arc<dyn Trait>`.

use async_trait::async_trait;

use crate::{AgentStatusReport, GatewayError, ItemNumber, RepositoryId, StoreError, Task, TaskId};

/// The asynchronous coding-agent API.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Starts a remote agent session working on `prompt` and returns its id.
    ///
    /// When `idempotent` is set the remote API is asked to return the existing
    /// session for an identical prompt instead of starting a second one.
    async fn create_task(&self, prompt: &str, idempotent: bool) -> Result<TaskId, GatewayError>;

    /// Fetches the current status of a session.
    async fn get_status(&self, task_id: &TaskId) -> Result<AgentStatusReport, GatewayError>;
}

/// The version-control hosting service, used to report back into the origin
/// conversation.
#[async_trait]
pub trait HostingGateway: Send + Sync {
    /// Posts `body` as a comment on issue or pull request `item` in `repo`.
    async fn post_comment(
        &self,
        repo: &RepositoryId,
        item: ItemNumber,
        body: &str,
    ) -> Result<(), GatewayError>;
}

/// Result of [`SessionStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was written.
    Inserted,
    /// A record with the same task id already existed; nothing was written.
    AlreadyPresent,
}

/// Durable collection of [`Task`] records.
///
/// Implementations guarantee that mutations never interleave (each one is a
/// complete read-modify-write of the collection) and that readers only ever
/// observe a complete collection, either before or after a mutation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts `task` unless a task with the same id is already stored.
    async fn insert(&self, task: Task) -> Result<InsertOutcome, StoreError>;

    /// Returns a single task by id.
    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Returns every stored task, in insertion order.
    async fn list(&self) -> Result<Vec<Task>, StoreError>;

    /// Returns every task still in the `open` state, in insertion order.
    async fn list_open(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.list().await?.into_iter().filter(Task::is_open).collect())
    }

    /// Moves an `open` task to `succeeded` and returns the updated record.
    ///
    /// Fails with [`StoreError::NotFound`] for an unknown id and
    /// [`StoreError::AlreadyTerminal`] for a task that is no longer open; in
    /// both cases the store is left unchanged.
    async fn mark_succeeded(
        &self,
        task_id: &TaskId,
        result_url: Option<String>,
    ) -> Result<Task, StoreError>;

    /// Moves an `open` task to `failed` and returns the updated record.
    ///
    /// Same failure contract as [`SessionStore::mark_succeeded`].
    async fn mark_failed(
        &self,
        task_id: &TaskId,
        failure_reason: String,
    ) -> Result<Task, StoreError>;
}
