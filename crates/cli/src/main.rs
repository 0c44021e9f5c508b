//! review-relay entry point.
//!
//! This binary is the composition root for the whole system:
//!
//! 1. **Parse configuration** from flags and environment ([`config`]).
//! 2. **Wire observability** ([`telemetry`]): every `tracing` span and event
//!    emitted by the workspace crates flows through the subscriber installed
//!    here.
//! 3. **Construct infrastructure**: the JSON session store, the agent API
//!    client, and (when a token is configured) the GitHub client. Each is built
//!    once and handed to the lifecycle components as `Arc<dyn Trait>`.
//! 4. **Run the selected subcommand** until it completes or Ctrl-C / SIGTERM
//!    cancels the shared shutdown token.

mod config;
mod telemetry;

use std::sync::Arc;

use agent::AgentApiClient;
use anyhow::Context;
use clap::Parser;
use github::GitHubClient;
use lifecycle::{intake_queue, IntakePipeline, IntakeWorker, Reconciler};
use listener::AppState;
use pipeline::{AgentGateway, HostingGateway, SessionStore};
use store::JsonFileSessionStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Cli, Command, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let telemetry = telemetry::init(cli.log_format)?;

    let result = run(cli).await;
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "review-relay exited with an error");
    }

    telemetry.shutdown();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = cli.settings;
    match cli.command {
        Command::Serve { no_monitor } => serve(&settings, !no_monitor).await,
        Command::Monitor => monitor(&settings).await,
        Command::ReconcileOnce => reconcile_once(&settings).await,
        Command::Sessions { open } => sessions(&settings, open).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn serve(settings: &Settings, run_monitor: bool) -> anyhow::Result<()> {
    let secret = settings.webhook_secret()?;
    let classifier = settings.classifier()?;
    let address = settings.bind_address()?;
    let queue_capacity = settings.intake_queue_capacity()?;
    let intake_concurrency = settings.intake_concurrency()?;
    let poll_interval = settings.poll_interval()?;

    let store = open_store(settings).await?;
    let agent = build_agent(settings)?;
    let reconciler = build_reconciler(settings, Arc::clone(&agent), Arc::clone(&store))?;

    let tcp = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let pipeline = Arc::new(
        IntakePipeline::new(classifier, agent, store)
            .with_idempotent_sessions(settings.agent_idempotent),
    );
    let (sender, receiver) = intake_queue(queue_capacity);
    let worker = tokio::spawn(
        IntakeWorker::new(pipeline, intake_concurrency).run(receiver, shutdown.clone()),
    );

    let monitor = if run_monitor {
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            reconciler.run(poll_interval, shutdown).await;
        }))
    } else {
        info!("Reconciliation loop disabled for this process");
        None
    };

    let served = listener::serve(tcp, AppState::new(secret, sender), shutdown.clone()).await;

    // The server may also stop on its own error; make sure the other loops follow.
    shutdown.cancel();
    worker.await.context("intake worker panicked")?;
    if let Some(monitor) = monitor {
        monitor.await.context("reconciliation loop panicked")?;
    }

    served.context("webhook server failed")
}

async fn monitor(settings: &Settings) -> anyhow::Result<()> {
    let poll_interval = settings.poll_interval()?;
    let store = open_store(settings).await?;
    let reconciler = build_reconciler(settings, build_agent(settings)?, store)?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    reconciler.run(poll_interval, shutdown).await;
    Ok(())
}

async fn reconcile_once(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let reconciler = build_reconciler(settings, build_agent(settings)?, store)?;

    let report = reconciler
        .run_cycle()
        .await
        .context("reconciliation cycle failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn sessions(settings: &Settings, only_open: bool) -> anyhow::Result<()> {
    let store = open_store(settings).await?;
    let tasks = if only_open {
        store.list_open().await?
    } else {
        store.list().await?
    };
    println!("{}", serde_json::to_string_pretty(&tasks)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn SessionStore>> {
    let store = JsonFileSessionStore::open(&settings.session_db_path)
        .await
        .with_context(|| {
            format!(
                "failed to open session store at {}",
                settings.session_db_path.display()
            )
        })?;
    Ok(Arc::new(store))
}

fn build_agent(settings: &Settings) -> anyhow::Result<Arc<dyn AgentGateway>> {
    Ok(Arc::new(AgentApiClient::new(settings.agent_config()?)?))
}

fn build_hosting(settings: &Settings) -> anyhow::Result<Option<Arc<dyn HostingGateway>>> {
    match settings.github_config()? {
        Some(config) => Ok(Some(Arc::new(GitHubClient::new(config)?))),
        None => {
            warn!("GITHUB_TOKEN is not set; completion comments will not be posted");
            Ok(None)
        }
    }
}

fn build_reconciler(
    settings: &Settings,
    agent: Arc<dyn AgentGateway>,
    store: Arc<dyn SessionStore>,
) -> anyhow::Result<Reconciler> {
    Ok(Reconciler::new(agent, store, build_hosting(settings)?)
        .with_concurrency(settings.reconcile_concurrency()?))
}

/// Cancels `shutdown` on Ctrl-C, or SIGTERM on Unix.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
        info!("Shutdown requested");
        shutdown.cancel();
    });
}
