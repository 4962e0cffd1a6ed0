use clap::{Parser, ValueEnum};
use openfinance_core::orchestrator::SagaOrchestrator;
use openfinance_core::outbox::OutboxDispatcher;
use openfinance_service::{build_router, ServiceConfig, ServiceState, StorageBackend};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "openfinanced", version, about = "Open Finance resource server")]
struct Cli {
    /// REST socket address to bind, e.g. 0.0.0.0:8443
    #[arg(long, default_value = "127.0.0.1:8443")]
    listen: SocketAddr,
    /// Event store / outbox persistence backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = StorageMode::Auto, env = "OPENFINANCE_STORAGE")]
    storage: StorageMode,
    /// PostgreSQL url for event-store/outbox persistence.
    #[arg(long, env = "OPENFINANCE_DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections.
    #[arg(long, default_value_t = 5, env = "OPENFINANCE_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
    /// Audience the security envelope requires on every access token's `aud` claim.
    #[arg(long, default_value = "https://openfinance.example/resource", env = "OPENFINANCE_AUDIENCE")]
    audience: String,
    /// Base URL this service is reachable at, used to reconstruct DPoP `htu` targets.
    #[arg(long, default_value = "https://openfinance.example", env = "OPENFINANCE_PUBLIC_BASE_URL")]
    public_base_url: String,
    /// Interval, in seconds, between transactional-outbox dispatch sweeps.
    #[arg(long, default_value_t = 2, env = "OPENFINANCE_OUTBOX_INTERVAL_SECONDS")]
    outbox_interval_seconds: u64,
}

fn resolve_storage(cli: &Cli) -> anyhow::Result<(StorageBackend, Option<String>)> {
    let resolved_url = cli.database_url.clone().or_else(|| std::env::var("DATABASE_URL").ok());

    let backend = match cli.storage {
        StorageMode::Memory => StorageBackend::Memory,
        StorageMode::Postgres => {
            if resolved_url.is_none() {
                anyhow::bail!("storage=postgres requires --database-url or DATABASE_URL");
            }
            StorageBackend::Postgres
        }
        StorageMode::Auto => {
            if resolved_url.is_some() {
                StorageBackend::Postgres
            } else {
                StorageBackend::Memory
            }
        }
    };

    Ok((backend, resolved_url))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "openfinance_service=info,info".to_string()))
        .init();

    let cli = Cli::parse();
    let (storage, database_url) = resolve_storage(&cli)?;

    let mut config = ServiceConfig {
        storage,
        database_url,
        pg_max_connections: cli.pg_max_connections,
        expected_audience: cli.audience,
        public_base_url: cli.public_base_url,
        ..ServiceConfig::default()
    };
    config.settings = openfinance_core::PlatformSettings::default();

    let state = ServiceState::bootstrap(config).await?;
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("openfinance-service listening on {}", listener.local_addr()?);

    let rest_task = tokio::spawn(async move { axum::serve(listener, app).await.map_err(anyhow::Error::from) });

    let outbox_dispatcher = OutboxDispatcher::new(state.outbox.clone(), state.bus.clone());
    let outbox_interval = Duration::from_secs(cli.outbox_interval_seconds.max(1));
    let outbox_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(outbox_interval);
        loop {
            ticker.tick().await;
            if let Err(error) = outbox_dispatcher.dispatch_pending().await {
                warn!(%error, "outbox dispatch sweep failed");
            }
        }
    });

    let saga_orchestrator = SagaOrchestrator::new(state.sagas.clone(), state.settings.saga_max_transient_retries);
    let saga_interval = Duration::from_secs(state.settings.saga_timeout_monitor_interval_seconds.max(1));
    let saga_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(saga_interval);
        loop {
            ticker.tick().await;
            match saga_orchestrator.run_timeout_sweep(chrono::Utc::now()).await {
                Ok(timed_out) if !timed_out.is_empty() => {
                    info!(count = timed_out.len(), "timed-out sagas compensated")
                }
                Ok(_) => {}
                Err(error) => warn!(%error, "saga timeout sweep failed"),
            }
        }
    });

    tokio::select! {
        rest = rest_task => rest??,
        outbox = outbox_task => outbox?,
        saga = saga_task => saga?,
    }

    Ok(())
}
