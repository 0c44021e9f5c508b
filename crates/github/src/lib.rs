//! review-relay GitHub adapter.
//!
//! Implements the [`pipeline::HostingGateway`] trait over the GitHub REST API
//! using a token (personal access token or app installation token).
//!
//! Comments go to the issue-comments endpoint,
//! `POST /repos/{owner}/{repo}/issues/{number}/comments`, which serves both
//! issues and pull requests because GitHub numbers them from one sequence.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Wire formats
//! and authentication are handled here; the [`pipeline`] crate never sees them.
//!
//! ## Missing token
//!
//! Posting comments is optional. The composition root only builds a
//! [`GitHubClient`] when a token is configured; without one the lifecycle code
//! has no hosting gateway and skips notification.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{ConfigurationError, GatewayError, HostingGateway, ItemNumber, RepositoryId};
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Default GitHub REST API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

const CREATE_COMMENT: &str = "create_comment";
const USER_AGENT: &str = concat!("review-relay/", env!("CARGO_PKG_VERSION"));

/// Settings for [`GitHubClient`].
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// REST API root (override for GitHub Enterprise Server).
    pub api_base_url: String,
    /// Token used for `Authorization: Bearer`.
    pub token: String,
    /// Upper bound for every request.
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

/// GitHub REST client used to report task outcomes.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base_url: String,
}

impl GitHubClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the token is empty or not a valid
    /// header value.
    pub fn new(config: GitHubConfig) -> Result<Self, ConfigurationError> {
        if config.token.trim().is_empty() {
            return Err(ConfigurationError::new("GitHub token is not set"));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token.trim()))
            .map_err(|_| ConfigurationError::new("GitHub token contains invalid characters"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigurationError::new(format!("cannot build GitHub HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    fn comments_url(&self, owner: &str, name: &str, item: ItemNumber) -> String {
        format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base_url, owner, name, item
        )
    }
}

#[async_trait]
impl HostingGateway for GitHubClient {
    #[instrument(skip(self, body), fields(repository = %repo, item_number = %item))]
    async fn post_comment(
        &self,
        repo: &RepositoryId,
        item: ItemNumber,
        body: &str,
    ) -> Result<(), GatewayError> {
        let (owner, name) = repo
            .owner_and_name()
            .ok_or_else(|| GatewayError::InvalidRequest {
                operation: CREATE_COMMENT,
                message: format!("repository {repo} is not in owner/repo form"),
            })?;

        let response = self
            .http
            .post(self.comments_url(owner, name, item))
            .json(&CreateCommentRequest { body })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout {
                        operation: CREATE_COMMENT,
                    }
                } else {
                    GatewayError::Transport {
                        operation: CREATE_COMMENT,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = GatewayError::status(CREATE_COMMENT, status.as_u16(), &text);
            warn!(status = status.as_u16(), excerpt = ?err.excerpt(), "GitHub rejected comment");
            return Err(err);
        }

        info!("Comment created");
        Ok(())
    }
}
