//! Process configuration.
//!
//! Every setting is a command-line flag backed by an environment variable, so
//! a container deployment can configure the relay through its environment
//! alone. Values are validated here, once, and turned into the typed settings
//! the adapters expect; a bad value is a [`ConfigurationError`] before any
//! component starts.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use agent::AgentApiConfig;
use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use github::GitHubConfig;
use pipeline::{ConfigurationError, EventClassifier};

#[derive(Parser, Debug)]
#[command(name = "review-relay", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    /// Log output format.
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Json, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the webhook server, the intake worker, and the reconciliation loop.
    Serve {
        /// Do not run the reconciliation loop in this process.
        #[arg(long)]
        no_monitor: bool,
    },
    /// Run only the reconciliation loop.
    Monitor,
    /// Run one reconciliation cycle and print its report.
    ReconcileOnce,
    /// Print the stored tasks.
    Sessions {
        /// Only show tasks that are still open.
        #[arg(long)]
        open: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Agent API key.
    #[arg(long, env = "AGENT_API_KEY", hide_env_values = true)]
    pub agent_api_key: Option<String>,

    #[arg(long, env = "AGENT_API_BASE_URL", default_value = agent::DEFAULT_BASE_URL)]
    pub agent_api_base_url: String,

    /// Secret ids attached to every agent session (comma-separated).
    #[arg(long, env = "AGENT_SECRET_IDS", value_delimiter = ',')]
    pub agent_secret_ids: Vec<String>,

    /// Ask the agent API to deduplicate identical session requests.
    #[arg(long, env = "AGENT_IDEMPOTENT", value_parser = FalseyValueParser::new())]
    pub agent_idempotent: bool,

    /// Shared secret for `X-Hub-Signature-256`.
    #[arg(long, env = "GITHUB_WEBHOOK_SECRET", hide_env_values = true)]
    pub github_webhook_secret: Option<String>,

    /// Token for posting completion comments. Without it nothing is posted.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    #[arg(long, env = "GITHUB_API_BASE_URL", default_value = github::DEFAULT_API_BASE_URL)]
    pub github_api_base_url: String,

    /// Host used when a pull request URL has to be synthesised.
    #[arg(long, env = "GITHUB_WEB_HOST", default_value = pipeline::DEFAULT_WEB_HOST)]
    pub github_web_host: String,

    /// Review bot logins whose comments start agent sessions (comma-separated).
    #[arg(
        long,
        env = "TARGET_BOT_USERNAMES",
        value_delimiter = ',',
        default_values = ["Code-Rabbit-App", "cursor-bug-bot"]
    )]
    pub target_bot_usernames: Vec<String>,

    #[arg(long, env = "SESSION_DB_PATH", default_value = "data/pending_sessions.json")]
    pub session_db_path: PathBuf,

    /// Seconds between reconciliation cycles.
    #[arg(long, env = "MONITOR_POLL_INTERVAL", default_value_t = 30)]
    pub monitor_poll_interval: u64,

    /// Per-request timeout for outbound HTTP calls, in seconds.
    #[arg(long, env = "HTTP_TIMEOUT", default_value_t = 30)]
    pub http_timeout: u64,

    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8000")]
    pub bind_address: String,

    #[arg(long, env = "INTAKE_QUEUE_CAPACITY", default_value_t = 256)]
    pub intake_queue_capacity: usize,

    #[arg(long, env = "INTAKE_CONCURRENCY", default_value_t = 8)]
    pub intake_concurrency: usize,

    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = 4)]
    pub reconcile_concurrency: usize,
}

impl Settings {
    pub fn agent_config(&self) -> Result<AgentApiConfig, ConfigurationError> {
        let api_key = required(self.agent_api_key.as_deref(), "AGENT_API_KEY")?;
        Ok(AgentApiConfig {
            base_url: non_empty(&self.agent_api_base_url, "AGENT_API_BASE_URL")?,
            api_key,
            secret_ids: trimmed(&self.agent_secret_ids),
            timeout: self.http_timeout()?,
        })
    }

    /// `None` when no token is configured.
    pub fn github_config(&self) -> Result<Option<GitHubConfig>, ConfigurationError> {
        let Some(token) = self
            .github_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            return Ok(None);
        };
        Ok(Some(GitHubConfig {
            api_base_url: non_empty(&self.github_api_base_url, "GITHUB_API_BASE_URL")?,
            token: token.to_string(),
            timeout: self.http_timeout()?,
        }))
    }

    pub fn webhook_secret(&self) -> Result<String, ConfigurationError> {
        required(self.github_webhook_secret.as_deref(), "GITHUB_WEBHOOK_SECRET")
    }

    pub fn classifier(&self) -> Result<EventClassifier, ConfigurationError> {
        let bots = trimmed(&self.target_bot_usernames);
        if bots.is_empty() {
            return Err(ConfigurationError::new("TARGET_BOT_USERNAMES is empty"));
        }
        let host = non_empty(&self.github_web_host, "GITHUB_WEB_HOST")?;
        Ok(EventClassifier::new(bots, host))
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigurationError> {
        self.bind_address.trim().parse().map_err(|e| {
            ConfigurationError::new(format!(
                "BIND_ADDRESS '{}' is not a socket address: {e}",
                self.bind_address
            ))
        })
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigurationError> {
        positive(self.monitor_poll_interval, "MONITOR_POLL_INTERVAL").map(Duration::from_secs)
    }

    pub fn http_timeout(&self) -> Result<Duration, ConfigurationError> {
        positive(self.http_timeout, "HTTP_TIMEOUT").map(Duration::from_secs)
    }

    pub fn intake_queue_capacity(&self) -> Result<usize, ConfigurationError> {
        positive(self.intake_queue_capacity, "INTAKE_QUEUE_CAPACITY")
    }

    pub fn intake_concurrency(&self) -> Result<usize, ConfigurationError> {
        positive(self.intake_concurrency, "INTAKE_CONCURRENCY")
    }

    pub fn reconcile_concurrency(&self) -> Result<usize, ConfigurationError> {
        positive(self.reconcile_concurrency, "RECONCILE_CONCURRENCY")
    }
}

fn required(value: Option<&str>, name: &str) -> Result<String, ConfigurationError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigurationError::new(format!("{name} is not set")))
}

fn non_empty(value: &str, name: &str) -> Result<String, ConfigurationError> {
    required(Some(value), name)
}

fn positive<T>(value: T, name: &str) -> Result<T, ConfigurationError>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigurationError::new(format!(
            "{name} must be greater than zero, got {value}"
        )))
    }
}

fn trimmed(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
