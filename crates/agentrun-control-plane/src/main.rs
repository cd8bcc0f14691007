//! AgentRun Server
//!
//! Runs the HTTP API, the event subscriber and a pool of workers in one
//! process around a shared in-process broker.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use agentrun_broker::{MemoryBroker, TaskStreamService};
use agentrun_control_plane::{http, serve, AppState, Config, EventSubscriber, WebhookDispatcher};
use agentrun_llm::AnthropicClient;
use agentrun_store::{InMemoryTaskRunRepository, InMemoryWebhookRepository};
use agentrun_worker::{AgentLoop, CancellationRegistry, TaskExecutor, WorkerPool};

/// AgentRun control plane server.
#[derive(Parser, Debug)]
#[command(name = "agentrun-server", about = "AgentRun task execution server")]
struct Args {
    /// HTTP server address
    #[arg(long, env = "AGENTRUN_HTTP_ADDR", default_value = "127.0.0.1:3000")]
    http_addr: SocketAddr,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: String,

    /// Root directory for run workspaces and logs
    #[arg(long, env = "AGENTRUN_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Consumer group shared by the workers
    #[arg(long, env = "AGENTRUN_CONSUMER_GROUP", default_value = "workers")]
    consumer_group: String,

    /// Number of workers in this process
    #[arg(long, env = "AGENTRUN_WORKERS", default_value = "2")]
    workers: usize,

    /// Model used by the agent loop
    #[arg(long, env = "AGENTRUN_MODEL", default_value = "claude-sonnet-4-20250514")]
    model: String,

    /// Maximum output tokens per model call
    #[arg(long, env = "AGENTRUN_MAX_TOKENS", default_value = "4096")]
    max_tokens: u32,
}

impl Args {
    fn into_config(self) -> (Config, String) {
        let mut config = Config {
            http_addr: self.http_addr,
            workers: self.workers,
            ..Default::default()
        };
        config.worker.consumer_group = self.consumer_group;
        config.worker.data_dir = self.data_dir;
        config.worker.agent.model = self.model;
        config.worker.agent.max_tokens = self.max_tokens;
        (config, self.anthropic_api_key)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let (config, api_key) = Args::parse().into_config();

    info!(
        http_addr = %config.http_addr,
        workers = config.workers,
        model = %config.worker.agent.model,
        data_dir = %config.worker.data_dir.display(),
        "Starting AgentRun server"
    );

    // Shared collaborators
    let broker = Arc::new(MemoryBroker::new());
    let runs = Arc::new(InMemoryTaskRunRepository::new());
    let webhooks = Arc::new(InMemoryWebhookRepository::new());
    let cancellations = Arc::new(CancellationRegistry::new());

    // Workers
    let model = Arc::new(AnthropicClient::new(api_key)?);
    let agent = AgentLoop::new(model, config.worker.agent.clone())
        .with_human_input_timeout(config.worker.human_input_timeout);
    let executor = Arc::new(TaskExecutor::new(
        broker.clone(),
        runs.clone(),
        agent,
        config.worker.data_dir.clone(),
    ));
    let pool = WorkerPool::spawn(
        config.workers,
        config.worker.clone(),
        broker.clone(),
        runs.clone(),
        executor,
        cancellations.clone(),
    );

    // Webhooks
    let dispatcher = Arc::new(WebhookDispatcher::new(webhooks.clone(), config.webhooks.clone())?);
    let subscriber = EventSubscriber::new(
        broker.clone(),
        runs.clone(),
        dispatcher.clone(),
        config.subscriber.clone(),
    );
    let subscriber_shutdown = CancellationToken::new();
    let subscriber_handle = tokio::spawn(subscriber.run(subscriber_shutdown.clone()));

    // HTTP
    let state = AppState::new(
        broker.clone(),
        runs,
        webhooks,
        cancellations,
        dispatcher,
        config.relay.clone(),
    );
    let listener = TcpListener::bind(config.http_addr).await?;
    info!("HTTP server listening on {}", config.http_addr);

    let result = serve(listener, http::create_router(state), pool, shutdown_signal()).await;
    if let Err(e) = &result {
        error!(error = %e, "HTTP server error");
    }

    subscriber_shutdown.cancel();
    if let Err(e) = subscriber_handle.await {
        error!(error = %e, "Event subscriber task failed");
    }
    broker.close().await;

    info!("AgentRun server stopped");
    result.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
