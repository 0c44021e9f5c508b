//! In-memory gateway fakes shared by the lifecycle tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipeline::{
    AgentGateway, AgentStatusReport, GatewayError, HostingGateway, ItemNumber, RepositoryId,
    TaskId,
};
use store::JsonFileSessionStore;
use tempfile::TempDir;

pub async fn temp_store() -> (TempDir, Arc<JsonFileSessionStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileSessionStore::open(dir.path().join("sessions.json"))
        .await
        .unwrap();
    (dir, Arc::new(store))
}

enum CreateBehaviour {
    Fixed(String),
    Sequential(String),
    Fail(u16),
}

/// Agent gateway whose answers are set up front by the test.
pub struct ScriptedAgent {
    create: CreateBehaviour,
    created: AtomicUsize,
    prompts: Mutex<Vec<(String, bool)>>,
    statuses: Mutex<HashMap<String, Result<AgentStatusReport, u16>>>,
    polls: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    fn with(create: CreateBehaviour) -> Self {
        Self {
            create,
            created: AtomicUsize::new(0),
            prompts: Mutex::default(),
            statuses: Mutex::default(),
            polls: Mutex::default(),
        }
    }

    pub fn creating(task_id: &str) -> Self {
        Self::with(CreateBehaviour::Fixed(task_id.into()))
    }

    pub fn creating_sequential(prefix: &str) -> Self {
        Self::with(CreateBehaviour::Sequential(prefix.into()))
    }

    pub fn failing_create(status: u16) -> Self {
        Self::with(CreateBehaviour::Fail(status))
    }

    pub fn polling() -> Self {
        Self::creating("unused")
    }

    pub fn set_status(&self, task_id: &str, status: &str) {
        self.set_report(
            task_id,
            AgentStatusReport {
                status: status.into(),
                ..AgentStatusReport::default()
            },
        );
    }

    pub fn set_report(&self, task_id: &str, report: AgentStatusReport) {
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.into(), Ok(report));
    }

    pub fn set_poll_error(&self, task_id: &str, status: u16) {
        self.statuses
            .lock()
            .unwrap()
            .insert(task_id.into(), Err(status));
    }

    pub fn prompts(&self) -> Vec<(String, bool)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn polls(&self) -> Vec<String> {
        self.polls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentGateway for ScriptedAgent {
    async fn create_task(&self, prompt: &str, idempotent: bool) -> Result<TaskId, GatewayError> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), idempotent));
        match &self.create {
            CreateBehaviour::Fixed(id) => Ok(TaskId::new(id.clone()).unwrap()),
            CreateBehaviour::Sequential(prefix) => {
                let n = self.created.fetch_add(1, Ordering::SeqCst);
                Ok(TaskId::new(format!("{prefix}-{n}")).unwrap())
            }
            CreateBehaviour::Fail(status) => {
                Err(GatewayError::status("create_session", *status, "unavailable"))
            }
        }
    }

    async fn get_status(&self, task_id: &TaskId) -> Result<AgentStatusReport, GatewayError> {
        self.polls.lock().unwrap().push(task_id.to_string());
        match self.statuses.lock().unwrap().get(task_id.as_str()) {
            Some(Ok(report)) => Ok(report.clone()),
            Some(Err(status)) => Err(GatewayError::status("get_session", *status, "boom")),
            None => Err(GatewayError::status("get_session", 404, "unknown session")),
        }
    }
}

/// Hosting gateway that records comments and optionally refuses them.
#[derive(Default)]
pub struct RecordingHosting {
    pub fail: bool,
    comments: Mutex<Vec<(String, u64, String)>>,
}

impl RecordingHosting {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn comments(&self) -> Vec<(String, u64, String)> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostingGateway for RecordingHosting {
    async fn post_comment(
        &self,
        repo: &RepositoryId,
        item: ItemNumber,
        body: &str,
    ) -> Result<(), GatewayError> {
        self.comments
            .lock()
            .unwrap()
            .push((repo.to_string(), item.as_u64(), body.to_string()));
        if self.fail {
            Err(GatewayError::status("create_comment", 403, "forbidden"))
        } else {
            Ok(())
        }
    }
}
