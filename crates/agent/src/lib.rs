//! review-relay coding-agent adapter.
//!
//! Implements the [`pipeline::AgentGateway`] trait for a Devin-style sessions
//! API:
//!
//! | Operation | Request | Response fields used |
//! |-----------|---------|----------------------|
//! | `create_task` | `POST {base}/sessions` | `session_id` |
//! | `get_status` | `GET {base}/sessions/{id}` | `status_enum`, `structured_output`, `pull_request`, `error_message` |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, and response
//! parsing live here. The [`pipeline`] crate sees only
//! [`pipeline::AgentGateway`].
//!
//! ## Timeouts
//!
//! Every request is bounded by [`AgentApiConfig::timeout`]. A timeout surfaces
//! as [`GatewayError::Timeout`] and is otherwise handled like any other
//! gateway failure.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{AgentGateway, AgentStatusReport, ConfigurationError, GatewayError, TaskId};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// Default base URL of the agent API.
pub const DEFAULT_BASE_URL: &str = "https://api.devin.ai/v1";

const CREATE_SESSION: &str = "create_session";
const GET_SESSION: &str = "get_session";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Settings for [`AgentApiClient`].
#[derive(Debug, Clone)]
pub struct AgentApiConfig {
    /// API base URL, without a trailing `/sessions`.
    pub base_url: String,
    /// Bearer token. Required.
    pub api_key: String,
    /// Ids of secrets the agent may use (e.g. its GitHub credential).
    pub secret_ids: Vec<String>,
    /// Upper bound for every request.
    pub timeout: Duration,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    prompt: &'a str,
    secret_ids: &'a [String],
    #[serde(skip_serializing_if = "is_false")]
    idempotent: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionDetails {
    status_enum: Option<String>,
    structured_output: Option<Value>,
    pull_request: Option<Value>,
    error_message: Option<Value>,
}

impl From<SessionDetails> for AgentStatusReport {
    fn from(details: SessionDetails) -> Self {
        Self {
            status: details.status_enum.unwrap_or_default(),
            structured_output: details.structured_output.filter(|v| !v.is_null()),
            pull_request: details.pull_request.filter(|v| !v.is_null()),
            error_message: details
                .error_message
                .as_ref()
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the agent sessions API.
#[derive(Debug, Clone)]
pub struct AgentApiClient {
    http: reqwest::Client,
    base_url: Url,
    secret_ids: Vec<String>,
}

impl AgentApiClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the API key is empty or cannot be
    /// used as a header value, or the base URL is not an absolute
    /// hierarchical URL.
    pub fn new(config: AgentApiConfig) -> Result<Self, ConfigurationError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigurationError::new("agent API key is not set"));
        }
        let base_url = Url::parse(config.base_url.trim()).map_err(|e| {
            ConfigurationError::new(format!(
                "agent API base URL '{}' is invalid: {e}",
                config.base_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigurationError::new(format!(
                "agent API base URL '{}' cannot hold a path",
                config.base_url
            )));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
            .map_err(|_| ConfigurationError::new("agent API key contains invalid characters"))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigurationError::new(format!("cannot build agent HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            secret_ids: config.secret_ids,
        })
    }

    /// Appends percent-encoded `segments` to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so the segments are always editable.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn sessions_url(&self) -> Url {
        self.endpoint(&["sessions"])
    }

    fn session_url(&self, task_id: &TaskId) -> Url {
        self.endpoint(&["sessions", task_id.as_str()])
    }
}

#[async_trait]
impl AgentGateway for AgentApiClient {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn create_task(&self, prompt: &str, idempotent: bool) -> Result<TaskId, GatewayError> {
        let request = CreateSessionRequest {
            prompt,
            secret_ids: &self.secret_ids,
            idempotent,
        };

        let response = self
            .http
            .post(self.sessions_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(CREATE_SESSION, e))?;
        let body: CreateSessionResponse = read_json(CREATE_SESSION, response).await?;

        let task_id = body.session_id.and_then(TaskId::new).ok_or_else(|| {
            warn!("Agent session created but no session_id in response");
            GatewayError::MalformedResponse {
                operation: CREATE_SESSION,
                message: "response has no session_id".to_string(),
            }
        })?;

        info!(task_id = %task_id, "Agent session created");
        Ok(task_id)
    }

    #[instrument(skip(self), fields(task_id = %task_id))]
    async fn get_status(&self, task_id: &TaskId) -> Result<AgentStatusReport, GatewayError> {
        let response = self
            .http
            .get(self.session_url(task_id))
            .send()
            .await
            .map_err(|e| transport_error(GET_SESSION, e))?;
        let details: SessionDetails = read_json(GET_SESSION, response).await?;

        let report = AgentStatusReport::from(details);
        debug!(status = %report.status, "Fetched agent session status");
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

fn transport_error(operation: &'static str, e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout { operation }
    } else {
        GatewayError::Transport {
            operation,
            message: e.to_string(),
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(operation, e))?;

    if !status.is_success() {
        let err = GatewayError::status(operation, status.as_u16(), &body);
        warn!(
            status = status.as_u16(),
            excerpt = ?err.excerpt(),
            "Agent API returned an error status"
        );
        return Err(err);
    }

    serde_json::from_str(&body).map_err(|e| GatewayError::MalformedResponse {
        operation,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Recorded {
        bodies: Vec<Value>,
        auth: Vec<String>,
    }

    type Shared = Arc<Mutex<Recorded>>;

    async fn create(
        State(recorded): State<Shared>,
        headers: AxumHeaders,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let prompt = {
            let mut r = recorded.lock().unwrap();
            r.auth.push(
                headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string(),
            );
            let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
            r.bodies.push(body);
            prompt
        };
        match prompt.as_str() {
            "slow" => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                (StatusCode::OK, Json(json!({ "session_id": "devin-late" })))
            }
            "fail" => (StatusCode::BAD_GATEWAY, Json(json!({ "detail": "upstream down" }))),
            "no-id" => (StatusCode::OK, Json(json!({ "url": "https://app/x" }))),
            _ => (StatusCode::OK, Json(json!({ "session_id": "devin-123" }))),
        }
    }

    async fn status(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
        match id.as_str() {
            "slow" => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                (StatusCode::OK, Json(json!({ "status_enum": "working" })))
            }
            "team/a b" => (StatusCode::OK, Json(json!({ "status_enum": "working" }))),
            "done" => (
                StatusCode::OK,
                Json(json!({
                    "status_enum": "finished",
                    "pull_request": { "html_url": "https://github.com/o/r/pull/9" },
                    "structured_output": null
                })),
            ),
            "blocked" => (
                StatusCode::OK,
                Json(json!({ "status_enum": "blocked", "error_message": "needs access" })),
            ),
            _ => (StatusCode::NOT_FOUND, Json(json!({ "detail": "not found" }))),
        }
    }

    async fn spawn_fake_api() -> (String, Shared) {
        let recorded = Shared::default();
        let app = Router::new()
            .route("/sessions", post(create))
            .route("/sessions/:id", get(status))
            .with_state(Arc::clone(&recorded));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), recorded)
    }

    fn client_with_timeout(base_url: String, timeout: Duration) -> AgentApiClient {
        AgentApiClient::new(AgentApiConfig {
            base_url,
            api_key: "k-123".into(),
            secret_ids: vec!["secret-gh".into()],
            timeout,
        })
        .unwrap()
    }

    fn client(base_url: String) -> AgentApiClient {
        client_with_timeout(base_url, Duration::from_secs(5))
    }

    #[test]
    fn endpoints_keep_base_path_and_encode_task_id() {
        let api = client(DEFAULT_BASE_URL.to_string());
        assert_eq!(
            api.sessions_url().as_str(),
            "https://api.devin.ai/v1/sessions"
        );
        assert_eq!(
            api.session_url(&TaskId::new("team/a b").unwrap()).as_str(),
            "https://api.devin.ai/v1/sessions/team%2Fa%20b"
        );

        let trailing = client("https://api.example.com/v2/".to_string());
        assert_eq!(
            trailing.sessions_url().as_str(),
            "https://api.example.com/v2/sessions"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        let err = AgentApiClient::new(AgentApiConfig {
            base_url: "not a url".into(),
            api_key: "k".into(),
            secret_ids: vec![],
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(err.message.contains("base URL"));
    }

    #[test]
    fn rejects_missing_api_key() {
        let err = AgentApiClient::new(AgentApiConfig {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: "  ".into(),
            secret_ids: vec![],
            timeout: Duration::from_secs(1),
        })
        .unwrap_err();
        assert!(err.message.contains("API key"));
    }

    #[test]
    fn session_details_map_to_status_report() {
        let details: SessionDetails = serde_json::from_value(json!({
            "status_enum": "blocked",
            "error_message": "needs access",
            "pull_request": null
        }))
        .unwrap();
        let report = AgentStatusReport::from(details);
        assert_eq!(report.status, "blocked");
        assert_eq!(report.error_message.as_deref(), Some("needs access"));
        assert_eq!(report.pull_request, None);
    }

    #[test]
    fn idempotent_flag_is_only_sent_when_set() {
        let ids = vec!["s".to_string()];
        let plain = serde_json::to_value(CreateSessionRequest {
            prompt: "p",
            secret_ids: &ids,
            idempotent: false,
        })
        .unwrap();
        assert!(plain.get("idempotent").is_none());

        let flagged = serde_json::to_value(CreateSessionRequest {
            prompt: "p",
            secret_ids: &ids,
            idempotent: true,
        })
        .unwrap();
        assert_eq!(flagged["idempotent"], true);
    }

    #[tokio::test]
    async fn create_task_posts_prompt_with_bearer_auth() {
        let (base, recorded) = spawn_fake_api().await;
        let task_id = client(base).create_task("fix it", true).await.unwrap();

        assert_eq!(task_id.as_str(), "devin-123");
        let r = recorded.lock().unwrap();
        assert_eq!(r.auth, ["Bearer k-123"]);
        assert_eq!(r.bodies[0]["prompt"], "fix it");
        assert_eq!(r.bodies[0]["secret_ids"], json!(["secret-gh"]));
        assert_eq!(r.bodies[0]["idempotent"], true);
    }

    #[tokio::test]
    async fn create_task_maps_error_status() {
        let (base, _) = spawn_fake_api().await;
        let err = client(base).create_task("fail", false).await.unwrap_err();
        assert_eq!(err.status_code(), Some(502));
        assert!(err.excerpt().unwrap().contains("upstream down"));
    }

    #[tokio::test]
    async fn create_task_without_session_id_is_malformed() {
        let (base, _) = spawn_fake_api().await;
        let err = client(base).create_task("no-id", false).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn get_status_parses_finished_and_blocked_sessions() {
        let (base, _) = spawn_fake_api().await;
        let client = client(base);

        let done = client.get_status(&TaskId::new("done").unwrap()).await.unwrap();
        assert_eq!(done.status, "finished");
        assert_eq!(
            done.pull_request,
            Some(json!({ "html_url": "https://github.com/o/r/pull/9" }))
        );
        assert_eq!(done.structured_output, None);

        let blocked = client.get_status(&TaskId::new("blocked").unwrap()).await.unwrap();
        assert_eq!(blocked.error_message.as_deref(), Some("needs access"));

        let missing = client.get_status(&TaskId::new("gone").unwrap()).await.unwrap_err();
        assert_eq!(missing.status_code(), Some(404));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}"))
            .create_task("x", false)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport { .. }));
    }

    #[tokio::test]
    async fn task_id_is_sent_as_one_path_segment() {
        let (base, _) = spawn_fake_api().await;
        let report = client(base)
            .get_status(&TaskId::new("team/a b").unwrap())
            .await
            .unwrap();
        assert_eq!(report.status, "working");
    }

    #[tokio::test]
    async fn slow_create_is_a_timeout() {
        let (base, _) = spawn_fake_api().await;
        let err = client_with_timeout(base, Duration::from_millis(100))
            .create_task("slow", false)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { operation: CREATE_SESSION }));
    }

    #[tokio::test]
    async fn slow_status_is_a_timeout() {
        let (base, _) = spawn_fake_api().await;
        let err = client_with_timeout(base, Duration::from_millis(100))
            .get_status(&TaskId::new("slow").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { operation: GET_SESSION }));
    }
}
