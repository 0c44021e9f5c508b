//! review-relay session store adapter.
//!
//! Implements [`pipeline::SessionStore`] over a single JSON file holding a
//! pretty-printed array of [`Task`] records in insertion order.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File handling, serialisation, and write serialisation
//! live here. The [`pipeline`] crate sees only [`pipeline::SessionStore`].
//!
//! ## Consistency
//!
//! Every mutation reads the whole file, changes the collection in memory, and
//! writes the whole collection back while holding two locks: an async mutex
//! for the tasks of this process, and an exclusive advisory lock on a sidecar
//! `<store>.lock` file for every other handle on the same path, including
//! other processes (`serve --no-monitor` next to `monitor`, or
//! `reconcile-once` next to `serve`). The write goes to a uniquely named
//! sibling temp file that is then renamed over the store, so readers (which
//! take neither lock) always see a complete collection.
//!
//! A missing file is created as an empty collection. A file whose content is
//! not a valid collection is reported as [`RepositoryError::Corrupt`] on every
//! read; it is never silently treated as empty.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use pipeline::{
    InsertOutcome, RepositoryError, SessionStore, StoreError, Task, TaskId, TaskStateKind,
    Timestamp,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session store backed by one JSON file.
#[derive(Debug)]
pub struct JsonFileSessionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSessionStore {
    /// Opens the store at `path`, creating parent directories and an empty
    /// collection when the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let store = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };

        if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store.write_error(e))?;
        }

        let guard = store.lock().await?;
        let exists = tokio::fs::try_exists(&store.path)
            .await
            .map_err(|e| store.read_error(e))?;
        if !exists {
            store.write_all(&[]).await?;
            info!(path = %store.path.display(), "Created empty session store");
        }
        drop(guard);

        Ok(store)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<Task>, RepositoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.read_error(e)),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| RepositoryError::Corrupt {
            location: self.location(),
            message: e.to_string(),
        })
    }

    /// Takes the in-process mutex, then the exclusive lock on the sidecar
    /// lock file. Both are released when the guard is dropped.
    async fn lock(&self) -> Result<WriteGuard<'_>, RepositoryError> {
        let local = self.write_lock.lock().await;

        let lock_path = self.lock_path();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| RepositoryError::Write {
            location: self.location(),
            message: format!("lock task failed: {e}"),
        })?
        .map_err(|e| self.write_error(e))?;

        Ok(WriteGuard {
            file,
            _local: local,
        })
    }

    /// Replaces the file contents. Callers must hold the guard from `lock`.
    async fn write_all(&self, tasks: &[Task]) -> Result<(), RepositoryError> {
        let json = serde_json::to_string_pretty(tasks).map_err(|e| RepositoryError::Write {
            location: self.location(),
            message: e.to_string(),
        })?;

        let tmp = self.tmp_path();
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.write_error(e));
        }
        Ok(())
    }

    /// Moves an open task to a terminal state under the write lock.
    async fn transition<F>(&self, task_id: &TaskId, apply: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task, Timestamp) -> Result<(), TaskStateKind> + Send,
    {
        let _guard = self.lock().await?;
        let mut tasks = self.read_all().await?;

        let task = tasks
            .iter_mut()
            .find(|t| t.task_id() == task_id)
            .ok_or_else(|| {
                warn!(task_id = %task_id, "Task not found in session store");
                StoreError::NotFound {
                    task_id: task_id.clone(),
                }
            })?;

        apply(task, Timestamp::now()).map_err(|state| StoreError::AlreadyTerminal {
            task_id: task_id.clone(),
            state,
        })?;
        let updated = task.clone();

        self.write_all(&tasks).await?;
        Ok(updated)
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling(&format!(".tmp.{}", Uuid::new_v4()))
    }

    fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn read_error(&self, e: std::io::Error) -> RepositoryError {
        RepositoryError::Read {
            location: self.location(),
            message: e.to_string(),
        }
    }

    fn write_error(&self, e: std::io::Error) -> RepositoryError {
        RepositoryError::Write {
            location: self.location(),
            message: e.to_string(),
        }
    }
}

/// Holds both write locks for one read-modify-write.
struct WriteGuard<'a> {
    file: File,
    _local: MutexGuard<'a, ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock too; unlock first so the
        // next writer is not held up by a delayed close.
        let _ = FileExt::unlock(&self.file);
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn insert(&self, task: Task) -> Result<InsertOutcome, StoreError> {
        let _guard = self.lock().await?;
        let mut tasks = self.read_all().await?;

        if tasks.iter().any(|t| t.task_id() == task.task_id()) {
            warn!(task_id = %task.task_id(), "Task already exists in session store");
            return Ok(InsertOutcome::AlreadyPresent);
        }

        let task_id = task.task_id().clone();
        tasks.push(task);
        self.write_all(&tasks).await?;
        debug!(task_id = %task_id, total = tasks.len(), "Inserted open task");
        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .find(|t| t.task_id() == task_id))
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.read_all().await?)
    }

    async fn mark_succeeded(
        &self,
        task_id: &TaskId,
        result_url: Option<String>,
    ) -> Result<Task, StoreError> {
        let task = self
            .transition(task_id, move |task, now| task.succeed(result_url, now))
            .await?;
        info!(task_id = %task_id, result_url = ?task.result_url(), "Marked task succeeded");
        Ok(task)
    }

    async fn mark_failed(
        &self,
        task_id: &TaskId,
        failure_reason: String,
    ) -> Result<Task, StoreError> {
        let task = self
            .transition(task_id, move |task, now| task.fail(failure_reason, now))
            .await?;
        info!(task_id = %task_id, reason = ?task.failure_reason(), "Marked task failed");
        Ok(task)
    }
}
