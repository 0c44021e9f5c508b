//! Webhook event classification.
//!
//! [`EventClassifier::classify`] decides whether a raw GitHub webhook payload
//! warrants launching an agent task and, if so, extracts the [`TaskRequest`].
//!
//! Two comment-bearing payload shapes are recognised:
//!
//! | Shape | Event | Item number | Target URL |
//! |-------|-------|-------------|------------|
//! | issue comment | `issue_comment` | `issue.number` | `issue.pull_request.html_url`, or synthesised |
//! | review comment | `pull_request_review_comment` | `pull_request.number` | `pull_request.html_url` |
//!
//! Classification is pure: no I/O, no logging, no clock. A rejection is an
//! ordinary return value carrying the reason, which the caller may log.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use crate::{ItemNumber, RepositoryId, TaskRequest};

/// Host used when a target URL has to be synthesised and none is configured.
pub const DEFAULT_WEB_HOST: &str = "github.com";

/// The only webhook `action` that can trigger a task.
const CREATED_ACTION: &str = "created";

// ---------------------------------------------------------------------------
// Rejection reasons
// ---------------------------------------------------------------------------

/// Why an event was not turned into a [`TaskRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The payload is not an object of the expected shape (e.g. a field has
    /// the wrong JSON type).
    Malformed,
    /// `action` is absent or is not `created`.
    ActionNotCreated { action: Option<String> },
    /// `sender.login` is absent or not in the allow-list.
    SenderNotAllowed { sender: Option<String> },
    /// There is no `comment.body`.
    MissingComment,
    /// Neither an `issue` nor a `pull_request` sub-structure is present.
    UnrecognisedShape,
    /// A required value was absent or empty after extraction.
    MissingField(&'static str),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed => f.write_str("payload does not match the comment event shape"),
            Self::ActionNotCreated { action } => {
                write!(f, "action {:?} is not \"created\"", action.as_deref().unwrap_or(""))
            }
            Self::SenderNotAllowed { sender } => {
                write!(f, "sender {:?} is not an allowed bot", sender.as_deref().unwrap_or(""))
            }
            Self::MissingComment => f.write_str("payload has no comment body"),
            Self::UnrecognisedShape => {
                f.write_str("payload contains neither issue nor pull_request")
            }
            Self::MissingField(field) => write!(f, "required field {field} is missing or empty"),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload view
// ---------------------------------------------------------------------------

// Only the fields the classifier reads. Everything else in the (large) GitHub
// payload is ignored.

#[derive(Debug, Deserialize)]
struct CommentEvent {
    action: Option<String>,
    sender: Option<Sender>,
    comment: Option<Comment>,
    issue: Option<Issue>,
    pull_request: Option<PullRequest>,
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct Sender {
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Comment {
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    number: Option<u64>,
    pull_request: Option<IssuePullRequestLink>,
}

#[derive(Debug, Deserialize)]
struct IssuePullRequestLink {
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: Option<u64>,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: Option<String>,
}

/// Which of the mutually exclusive comment shapes a payload carries.
enum EventShape<'a> {
    IssueComment(&'a Issue),
    ReviewComment(&'a PullRequest),
}

impl CommentEvent {
    fn shape(&self) -> Option<EventShape<'_>> {
        if let Some(issue) = &self.issue {
            return Some(EventShape::IssueComment(issue));
        }
        self.pull_request.as_ref().map(EventShape::ReviewComment)
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Decides which webhook events launch an agent task.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    allowed_senders: BTreeSet<String>,
    web_host: String,
}

impl EventClassifier {
    /// Creates a classifier accepting comments from `allowed_senders`
    /// (exact, case-sensitive logins) and synthesising URLs on `web_host`.
    pub fn new<I, S>(allowed_senders: I, web_host: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_senders: allowed_senders.into_iter().map(Into::into).collect(),
            web_host: web_host.into(),
        }
    }

    /// The configured bot allow-list.
    pub fn allowed_senders(&self) -> impl Iterator<Item = &str> {
        self.allowed_senders.iter().map(String::as_str)
    }

    /// Classifies one webhook payload.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] reason when the event is not actionable.
    pub fn classify(&self, event: &Value) -> Result<TaskRequest, Rejection> {
        let event = CommentEvent::deserialize(event).map_err(|_| Rejection::Malformed)?;

        if event.action.as_deref() != Some(CREATED_ACTION) {
            return Err(Rejection::ActionNotCreated {
                action: event.action,
            });
        }

        let sender = event.sender.as_ref().and_then(|s| s.login.clone());
        match &sender {
            Some(login) if self.allowed_senders.contains(login) => {}
            _ => return Err(Rejection::SenderNotAllowed { sender }),
        }

        let body = event
            .comment
            .as_ref()
            .and_then(|c| c.body.as_deref())
            .ok_or(Rejection::MissingComment)?;

        let shape = event.shape().ok_or(Rejection::UnrecognisedShape)?;

        let repo = event
            .repository
            .as_ref()
            .and_then(|r| r.full_name.clone())
            .and_then(RepositoryId::new)
            .ok_or(Rejection::MissingField("repository.full_name"))?;

        let (number, url) = match shape {
            EventShape::IssueComment(issue) => {
                let number = issue
                    .number
                    .and_then(ItemNumber::new)
                    .ok_or(Rejection::MissingField("issue.number"))?;
                let url = issue
                    .pull_request
                    .as_ref()
                    .and_then(|pr| non_empty(pr.html_url.as_deref()))
                    .map(str::to_string)
                    .unwrap_or_else(|| self.pull_request_url(&repo, number));
                (number, url)
            }
            EventShape::ReviewComment(pr) => {
                let number = pr
                    .number
                    .and_then(ItemNumber::new)
                    .ok_or(Rejection::MissingField("pull_request.number"))?;
                let url = non_empty(pr.html_url.as_deref())
                    .ok_or(Rejection::MissingField("pull_request.html_url"))?;
                (number, url.to_string())
            }
        };

        TaskRequest::new(url, body, repo, number).ok_or(Rejection::MissingField("comment.body"))
    }

    fn pull_request_url(&self, repo: &RepositoryId, number: ItemNumber) -> String {
        format!("https://{}/{}/pull/{}", self.web_host, repo, number)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
