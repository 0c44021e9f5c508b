//! Task state machine.
//!
//! The reconciliation loop feeds each polled [`AgentStatusReport`] through
//! [`decide`] and persists whatever [`Transition`] comes back. The function is
//! pure; persistence and notification are the caller's job.
//!
//! ```text
//!            working / unrecognised
//!               ┌─────┐
//!               ▼     │
//!             ┌──────────┐   finished   ┌────────────┐
//!             │   open   │─────────────▶│ succeeded  │
//!             └──────────┘              └────────────┘
//!                   │        blocked    ┌────────────┐
//!                   └──────────────────▶│   failed   │
//!                                       └────────────┘
//! ```

use serde_json::Value;

/// Failure reason recorded when a blocked agent reports no message.
pub const DEFAULT_BLOCKED_REASON: &str = "Session blocked";

// ---------------------------------------------------------------------------
// Agent status
// ---------------------------------------------------------------------------

/// Status of a remote agent session as reported by the agent gateway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStatusReport {
    /// Raw status string (e.g. `"working"`, `"finished"`, `"blocked"`).
    pub status: String,
    /// Free-form structured output produced by the agent, if any.
    pub structured_output: Option<Value>,
    /// Pull request the agent opened, if any.
    pub pull_request: Option<Value>,
    /// Error message accompanying a blocked session.
    pub error_message: Option<String>,
}

/// Interpretation of [`AgentStatusReport::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentRunState {
    Working,
    Finished,
    Blocked,
    /// Any status this system does not know; treated like `Working`.
    Unrecognised(String),
}

impl AgentRunState {
    /// Parses a status string case-insensitively.
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "working" => Self::Working,
            "finished" => Self::Finished,
            "blocked" => Self::Blocked,
            _ => Self::Unrecognised(status.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// What should happen to an `open` task given its latest agent status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Leave the task open; nothing is persisted.
    Stay(StayReason),
    /// Move the task to `succeeded`.
    Succeed { result_url: Option<String> },
    /// Move the task to `failed`.
    Fail { reason: String },
}

/// Why a task stays open. Kept apart so logs and counters can tell the
/// expected case from a status string nobody recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StayReason {
    InProgress,
    UnrecognisedStatus(String),
}

/// Maps an agent status report to the transition an `open` task should take.
pub fn decide(report: &AgentStatusReport) -> Transition {
    match AgentRunState::parse(&report.status) {
        AgentRunState::Working => Transition::Stay(StayReason::InProgress),
        AgentRunState::Unrecognised(raw) => Transition::Stay(StayReason::UnrecognisedStatus(raw)),
        AgentRunState::Finished => Transition::Succeed {
            result_url: result_url(report),
        },
        AgentRunState::Blocked => Transition::Fail {
            reason: report
                .error_message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_BLOCKED_REASON)
                .to_string(),
        },
    }
}

/// Finds the result URL in a finished report.
///
/// Checked in order: `structured_output.pull_request_url`,
/// `structured_output.pr_url`, `pull_request.html_url`, `pull_request.url`.
/// Non-string and empty values are skipped.
pub fn result_url(report: &AgentStatusReport) -> Option<String> {
    let structured = report.structured_output.as_ref();
    let pull_request = report.pull_request.as_ref();

    [
        (structured, "pull_request_url"),
        (structured, "pr_url"),
        (pull_request, "html_url"),
        (pull_request, "url"),
    ]
    .into_iter()
    .find_map(|(doc, key)| string_field(doc?, key))
}

fn string_field(doc: &Value, key: &str) -> Option<String> {
    doc.as_object()?
        .get(key)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Notification text
// ---------------------------------------------------------------------------

/// Comment posted to the origin conversation after a terminal transition.
///
/// Returns `None` for [`Transition::Stay`], which never notifies.
pub fn completion_comment(transition: &Transition) -> Option<String> {
    match transition {
        Transition::Stay(_) => None,
        Transition::Succeed {
            result_url: Some(url),
        } => Some(format!(
            "✅ The agent has opened a pull request with the fix.\n\nPlease review: {url}"
        )),
        Transition::Succeed { result_url: None } => Some(
            concat!(
                "✅ The agent session has completed.\n\n",
                "No result URL was available for the new pull request."
            )
            .to_string(),
        ),
        Transition::Fail { reason } => Some(format!(
            "❌ The agent session could not complete the fix.\n\nReason: {reason}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn report(status: &str) -> AgentStatusReport {
        AgentStatusReport {
            status: status.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn working_stays_open() {
        assert_eq!(decide(&report("working")), Transition::Stay(StayReason::InProgress));
    }

    #[test]
    fn status_is_case_insensitive() {
        assert_eq!(decide(&report("WORKING")), Transition::Stay(StayReason::InProgress));
        assert!(matches!(decide(&report("Finished")), Transition::Succeed { .. }));
    }

    #[test]
    fn unknown_status_stays_open_but_is_distinguishable() {
        assert_eq!(
            decide(&report("suspend_requested")),
            Transition::Stay(StayReason::UnrecognisedStatus("suspend_requested".into()))
        );
        assert_eq!(
            decide(&report("")),
            Transition::Stay(StayReason::UnrecognisedStatus(String::new()))
        );
    }

    #[test]
    fn finished_with_pull_request_html_url() {
        let mut r = report("finished");
        r.pull_request = Some(json!({ "html_url": "https://host/o/r/pull/9" }));
        assert_eq!(
            decide(&r),
            Transition::Succeed {
                result_url: Some("https://host/o/r/pull/9".into())
            }
        );
    }

    #[test]
    fn structured_output_wins_over_pull_request() {
        let mut r = report("finished");
        r.structured_output = Some(json!({ "pr_url": "https://host/o/r/pull/1" }));
        r.pull_request = Some(json!({ "html_url": "https://host/o/r/pull/2" }));
        assert_eq!(result_url(&r).as_deref(), Some("https://host/o/r/pull/1"));

        r.structured_output = Some(json!({
            "pull_request_url": "https://host/o/r/pull/3",
            "pr_url": "https://host/o/r/pull/1"
        }));
        assert_eq!(result_url(&r).as_deref(), Some("https://host/o/r/pull/3"));
    }

    #[test]
    fn falls_back_to_pull_request_url_key_and_skips_junk() {
        let mut r = report("finished");
        r.structured_output = Some(json!("plain text output"));
        r.pull_request = Some(json!({ "html_url": "", "url": "https://api/o/r/pulls/4" }));
        assert_eq!(result_url(&r).as_deref(), Some("https://api/o/r/pulls/4"));

        r.pull_request = Some(json!({ "html_url": 42 }));
        assert_eq!(result_url(&r), None);
    }

    #[test]
    fn finished_without_any_url_still_succeeds() {
        assert_eq!(decide(&report("finished")), Transition::Succeed { result_url: None });
    }

    #[test]
    fn blocked_uses_error_message_or_default() {
        let mut r = report("blocked");
        r.error_message = Some("needs access".into());
        assert_eq!(decide(&r), Transition::Fail { reason: "needs access".into() });

        r.error_message = None;
        assert_eq!(
            decide(&r),
            Transition::Fail {
                reason: DEFAULT_BLOCKED_REASON.into()
            }
        );
    }

    #[test]
    fn comments_embed_url_or_reason() {
        let ok = completion_comment(&Transition::Succeed {
            result_url: Some("https://host/o/r/pull/9".into()),
        })
        .unwrap();
        assert!(ok.contains("https://host/o/r/pull/9"));

        let no_url = completion_comment(&Transition::Succeed { result_url: None }).unwrap();
        assert!(no_url.contains("No result URL"));

        let failed = completion_comment(&Transition::Fail {
            reason: "needs access".into(),
        })
        .unwrap();
        assert!(failed.contains("needs access"));

        assert_eq!(completion_comment(&Transition::Stay(StayReason::InProgress)), None);
    }
}
