use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{TournamentConfig, UpstreamConfig};
use crate::db::connect_to_postgres_db;
use crate::tournament::{SystemClock, TournamentService};
use crate::upstream::{
    run_dispatch_loop, IdentityVerifier, LocalDispatcher, SharedSecretVerifier, TaskDispatcher,
    TransitionHandler, Upstreams,
};

use super::routes::{ServerContext, TournamentServer};

const LOG_TARGET: &str = "server::bootstrap";

pub struct ServerConfig {
    pub bind: SocketAddr,
    /// In-memory storage when absent.
    pub database_url: Option<String>,
    pub tournament: TournamentConfig,
    pub upstream: UpstreamConfig,
    pub identity_secret: String,
    pub admin_key: Option<String>,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    config
        .tournament
        .validate()
        .context("invalid tournament config")?;
    config
        .upstream
        .validate()
        .context("invalid upstream config")?;

    let (dispatcher, task_rx) = LocalDispatcher::channel();
    let dispatcher: Arc<dyn TaskDispatcher> = Arc::new(dispatcher);
    let upstreams = Upstreams::http(&config.upstream, dispatcher)
        .context("failed to build upstream clients")?;
    let tournament_config = Arc::new(config.tournament);
    let dispatch_retry = tournament_config.dispatch_retry;

    let service = match &config.database_url {
        Some(url) => {
            let db = connect_to_postgres_db(url).await?;
            TournamentService::from_sea_orm(db, Arc::clone(&tournament_config), upstreams)
        }
        None => {
            warn!(
                target: LOG_TARGET,
                "no DATABASE_URL configured; tournaments are kept in memory"
            );
            TournamentService::in_memory(
                Arc::clone(&tournament_config),
                upstreams,
                Arc::new(SystemClock),
            )
        }
    };
    let service = Arc::new(service);

    let handler: Arc<dyn TransitionHandler> = service.clone();
    let _dispatch = run_dispatch_loop(task_rx, handler, Arc::new(SystemClock), dispatch_retry);

    if config.admin_key.is_none() {
        warn!(
            target: LOG_TARGET,
            "no admin key configured; internal routes are disabled"
        );
    }
    let identity: Arc<dyn IdentityVerifier> =
        Arc::new(SharedSecretVerifier::new(config.identity_secret));
    let context = Arc::new(ServerContext {
        ops: service,
        identity,
        admin_key: config.admin_key,
    });
    let router = TournamentServer::new(context).into_router();
    let make_service = router.into_make_service();

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(
        target: LOG_TARGET,
        %local_addr,
        persistent = config.database_url.is_some(),
        "tournament server listening"
    );

    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target: LOG_TARGET,
            error = %err,
            "failed to install ctrl-c handler"
        );
    }
    info!(target: LOG_TARGET, "shutdown signal received");
}
