use bankings_core::{RetentionPolicy, WorkflowConfig};
use bankings_service::{build_router, ServiceConfig, ServiceState, DEFAULT_SECRET};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RetentionMode {
    /// Keep completed records until a result arrives.
    Retain,
    /// Drop records as soon as they complete.
    Remove,
}

impl From<RetentionMode> for RetentionPolicy {
    fn from(mode: RetentionMode) -> Self {
        match mode {
            RetentionMode::Retain => RetentionPolicy::RetainUntilResult,
            RetentionMode::Remove => RetentionPolicy::RemoveOnCompletion,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "bankingsd", version, about = "Synthetic account number provisioning service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080", env = "BANKINGS_LISTEN")]
    listen: SocketAddr,
    /// Shared secret expected in the Authorization header.
    #[arg(long, default_value = DEFAULT_SECRET, env = "BANKINGS_SECRET", hide_env_values = true)]
    secret: String,
    /// Delay before a provisioned record is completed.
    #[arg(long, default_value_t = 5000, env = "BANKINGS_FINALIZE_AFTER_MS")]
    finalize_after_ms: u64,
    /// What happens to a record once it completes.
    #[arg(long, value_enum, default_value_t = RetentionMode::Retain, env = "BANKINGS_RETENTION")]
    retention: RetentionMode,
    /// Base URL of the apps_accs service. Completions are only logged when unset.
    #[arg(long, env = "BANKINGS_DOWNSTREAM_URL")]
    downstream_url: Option<String>,
    /// Upper bound on pending completion tasks.
    #[arg(
        long,
        default_value_t = 1024,
        env = "BANKINGS_MAX_IN_FLIGHT",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_in_flight: u32,
    /// How long shutdown waits for running completions.
    #[arg(long, default_value_t = 10_000, env = "BANKINGS_SHUTDOWN_GRACE_MS")]
    shutdown_grace_ms: u64,
}

impl Cli {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            secret: self.secret.clone(),
            downstream_url: self.downstream_url.clone(),
            workflow: WorkflowConfig {
                finalize_after: Duration::from_millis(self.finalize_after_ms),
                retention: self.retention.into(),
                max_in_flight: self.max_in_flight as usize,
                shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "bankings_service=info,bankings_core=info,bankings_adapters=info,info".to_string()
        }))
        .init();

    let cli = Cli::parse();
    let config = cli.service_config();
    info!(
        finalize_after_ms = cli.finalize_after_ms,
        retention = config.workflow.retention.label(),
        max_in_flight = config.workflow.max_in_flight,
        downstream = config.downstream_url.as_deref().unwrap_or("log-only"),
        "starting bankings-service"
    );

    let state = ServiceState::bootstrap(config)?;
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("bankings-service REST listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    info!("bankings-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received terminate signal, initiating graceful shutdown");
        }
    }
}
