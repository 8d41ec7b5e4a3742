use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use vote_tournaments::config::{TournamentConfig, UpstreamConfig};
use vote_tournaments::server::{run_server, ServerConfig};

const DEFAULT_BIND: &str = "127.0.0.1:4000";

#[derive(Debug, Parser)]
#[command(name = "tournament_server")]
#[command(about = "Serve the vote tournament HTTP API", long_about = None)]
struct Args {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "SERVER_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// SeaORM-compatible Postgres URL; tournaments stay in memory without it
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "BALANCE_BASE_URL", default_value = "http://127.0.0.1:8081")]
    balance_url: String,

    #[arg(long, env = "BALANCE_TOKEN", default_value = "")]
    balance_token: String,

    #[arg(long, env = "PAYOUT_BASE_URL", default_value = "http://127.0.0.1:8082")]
    payout_url: String,

    #[arg(long, env = "PAYOUT_TOKEN", default_value = "")]
    payout_token: String,

    #[arg(long, env = "TICKER_URL", default_value = "https://blockchain.info/ticker")]
    ticker_url: String,

    #[arg(long, env = "VIDEO_ORACLE_URL", default_value = "http://127.0.0.1:8083")]
    oracle_url: String,

    /// Secret the bearer tokens are signed with
    #[arg(long, env = "IDENTITY_SECRET")]
    identity_secret: String,

    /// Key expected in `x-admin-key` on internal routes
    #[arg(long, env = "ADMIN_KEY")]
    admin_key: Option<String>,

    /// JSON array replacing the built-in vote option catalog
    #[arg(long, env = "TOURNAMENT_OPTIONS_FILE")]
    options_file: Option<PathBuf>,

    /// Optional RNG seed for deterministic shard routing and seeding
    #[arg(long, env = "SERVER_RNG_SEED")]
    rng_seed: Option<u64>,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "SERVER_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;
    let config = build_config(args).context("failed to build server config")?;
    run_server(config).await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn build_config(args: Args) -> Result<ServerConfig> {
    let mut tournament = TournamentConfig {
        rng_seed: args.rng_seed,
        ..TournamentConfig::default()
    };
    if let Some(path) = &args.options_file {
        tournament
            .load_options(path)
            .with_context(|| format!("failed to load options from {}", path.display()))?;
    }

    let upstream = UpstreamConfig {
        balance_base_url: args.balance_url,
        balance_token: args.balance_token,
        payout_base_url: args.payout_url,
        payout_token: args.payout_token,
        ticker_url: args.ticker_url,
        oracle_base_url: args.oracle_url,
        ..UpstreamConfig::default()
    };

    Ok(ServerConfig {
        bind: args.bind,
        database_url: args.database_url.filter(|url| !url.is_empty()),
        tournament,
        upstream,
        identity_secret: args.identity_secret,
        admin_key: args.admin_key.filter(|key| !key.is_empty()),
    })
}
