//! Rollguard - autonomous rollback controller entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rollguard::config::{Config, DEFAULT_CONFIG_PATH};
use rollguard::executor::RollbackExecutor;
use rollguard::metrics::ControllerMetrics;
use rollguard::orchestrator::KubeOrchestrator;
use rollguard::reconciler::{run_workload_watcher, Reconciler};
use rollguard::registry::StateRegistry;
use rollguard::retry::RetryPolicy;
use rollguard::server::{operator_router, OperatorState};
use rollguard::slo::SloEvaluator;
use rollguard::telemetry::{PrometheusClient, TelemetryQuerier};
use rollguard::WORKLOAD_NAMESPACE;

/// Autonomous rollback controller for SLO-guarded progressive delivery
#[derive(Parser, Debug)]
#[command(name = "rollguard", version, about, long_about = None)]
struct Cli {
    /// Path to the controller configuration file
    #[arg(long, env = "CONTROLLER_CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Operator HTTP listen address (health, readiness, metrics)
    #[arg(long, default_value = "0.0.0.0:8081")]
    listen_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting autonomous deployment controller");

    // Startup failures are fatal by design: a controller that cannot read
    // its config or reach its control planes must not pretend to guard
    // anything.
    let config = Config::load(&cli.config).context("failed to load configuration")?;

    let metrics = Arc::new(ControllerMetrics::new().context("failed to register metrics")?);

    let telemetry: Arc<dyn TelemetryQuerier> = Arc::new(
        PrometheusClient::new(&config.azure_monitor)
            .context("failed to create telemetry client")?,
    );

    let client = Client::try_default()
        .await
        .context("failed to create orchestrator client")?;
    let orchestrator = Arc::new(KubeOrchestrator::new(client.clone(), WORKLOAD_NAMESPACE));

    let registry = Arc::new(StateRegistry::new());
    let evaluator = SloEvaluator::new(
        telemetry.clone(),
        config.slos.clone(),
        RetryPolicy::with_attempts(config.azure_monitor.retry_attempts),
        metrics.clone(),
    );
    let executor = RollbackExecutor::new(
        orchestrator.clone(),
        registry.clone(),
        metrics.clone(),
        config.cross_cluster.clone(),
    );
    let reconciler = Reconciler::new(
        orchestrator,
        evaluator,
        executor,
        registry.clone(),
        config.slos.clone(),
    );

    let shutdown = CancellationToken::new();

    // Operator surface
    let listener = tokio::net::TcpListener::bind(cli.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen_addr))?;
    tracing::info!(addr = %cli.listen_addr, "Operator HTTP server listening");
    let router = operator_router(OperatorState {
        telemetry,
        metrics: metrics.clone(),
    });
    let server = {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                tracing::error!(error = %e, "Operator HTTP server error");
            }
        })
    };

    // Watcher keeps the registry aligned with the orchestrator
    let watcher = {
        let token = shutdown.clone();
        let registry = registry.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            run_workload_watcher(client, WORKLOAD_NAMESPACE, registry, metrics, token).await;
        })
    };

    // Signal handling drives cancellation through every task
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received shutdown signal");
                token.cancel();
            }
        });
    }

    reconciler.run(shutdown.clone()).await;

    shutdown.cancel();
    let _ = watcher.await;
    let _ = server.await;

    tracing::info!("Controller shut down");
    Ok(())
}
