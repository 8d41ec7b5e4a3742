use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tournament::retry::RetryPolicy;
use crate::tournament::types::OptionId;

/// One votable reaction in smiley tournaments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDef {
    pub id: OptionId,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub click_animation: Option<String>,
    #[serde(default)]
    pub image_fallback: Option<String>,
}

fn default_true() -> bool {
    true
}

impl OptionDef {
    pub fn new(id: impl Into<OptionId>) -> Self {
        Self {
            id: id.into(),
            image_url: None,
            is_active: true,
            click_animation: None,
            image_fallback: None,
        }
    }
}

pub const DEFAULT_OPTION_IDS: [&str; 6] = ["laugh", "heart", "fire", "surprise", "rocket", "puke"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read option catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid option catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Domain tunables, built once at start and shared read-only.
#[derive(Debug, Clone)]
pub struct TournamentConfig {
    pub initial_diamonds: i64,
    pub shard_count: u32,
    pub seed_option_count: usize,
    pub seed_vote_count: i64,
    /// Options never picked as cold-start seeds.
    pub seed_excluded: Vec<OptionId>,
    /// Fewer players than this triggers the full refund path.
    pub min_players: u32,
    pub leaderboard_top: u32,
    pub overfetch_factor: u64,
    pub retry: RetryPolicy,
    /// Redelivery policy of the local transition dispatcher.
    pub dispatch_retry: RetryPolicy,
    pub payout_claim_lease: Duration,
    /// Currency the prize map is denominated in; also the ticker key.
    pub prize_currency: String,
    pub payout_currency: String,
    /// Smallest-unit exponent of the payout currency.
    pub payout_decimals: u32,
    pub my_tournaments_window_days: i64,
    pub oracle_concurrency: usize,
    /// Offset used for the default "today" in listings (IST).
    pub listing_utc_offset_minutes: i32,
    pub options: Vec<OptionDef>,
    /// Fixed seed for shard routing and seeding; entropy when `None`.
    pub rng_seed: Option<u64>,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            initial_diamonds: 20,
            shard_count: 5,
            seed_option_count: 3,
            seed_vote_count: 1000,
            seed_excluded: vec!["heart".to_string()],
            min_players: 2,
            leaderboard_top: 10,
            overfetch_factor: 50,
            retry: RetryPolicy::default(),
            dispatch_retry: RetryPolicy {
                max_attempts: 6,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
            },
            payout_claim_lease: Duration::from_secs(5 * 60),
            prize_currency: "INR".to_string(),
            payout_currency: "ckBTC".to_string(),
            payout_decimals: 8,
            my_tournaments_window_days: 7,
            oracle_concurrency: 5,
            listing_utc_offset_minutes: 5 * 60 + 30,
            options: DEFAULT_OPTION_IDS.iter().map(|id| OptionDef::new(*id)).collect(),
            rng_seed: None,
        }
    }
}

impl TournamentConfig {
    pub fn option(&self, id: &str) -> Option<&OptionDef> {
        self.options.iter().find(|option| option.id == id)
    }

    pub fn active_option(&self, id: &str) -> Option<&OptionDef> {
        self.option(id).filter(|option| option.is_active)
    }

    /// Replaces the option catalog with a JSON array of [`OptionDef`].
    pub fn load_options(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.options = serde_json::from_str(&raw)?;
        Ok(())
    }

    pub fn payout_claim_lease_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.payout_claim_lease)
            .unwrap_or_else(|_| chrono::Duration::minutes(5))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::Invalid("shard_count must be positive".into()));
        }
        if self.initial_diamonds <= 0 {
            return Err(ConfigError::Invalid(
                "initial_diamonds must be positive".into(),
            ));
        }
        if self.options.is_empty() {
            return Err(ConfigError::Invalid("option catalog is empty".into()));
        }
        if self.retry.max_attempts == 0 || self.dispatch_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry policies need at least one attempt".into(),
            ));
        }
        if self.oracle_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "oracle_concurrency must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Endpoints and credentials of the remote collaborators.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub balance_base_url: String,
    pub balance_token: String,
    pub balance_timeout: Duration,
    pub payout_base_url: String,
    pub payout_token: String,
    pub payout_timeout: Duration,
    pub ticker_url: String,
    pub ticker_timeout: Duration,
    pub oracle_base_url: String,
    pub oracle_timeout: Duration,
}

impl UpstreamConfig {
    /// Every endpoint must be an absolute http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, raw) in [
            ("balance_base_url", &self.balance_base_url),
            ("payout_base_url", &self.payout_base_url),
            ("ticker_url", &self.ticker_url),
            ("oracle_base_url", &self.oracle_base_url),
        ] {
            let parsed = url::Url::parse(raw)
                .map_err(|err| ConfigError::Invalid(format!("{name}: {err}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "{name}: unsupported scheme {}",
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            balance_base_url: "http://127.0.0.1:8081".to_string(),
            balance_token: String::new(),
            balance_timeout: Duration::from_secs(30),
            payout_base_url: "http://127.0.0.1:8082".to_string(),
            payout_token: String::new(),
            payout_timeout: Duration::from_secs(60),
            ticker_url: "https://blockchain.info/ticker".to_string(),
            ticker_timeout: Duration::from_secs(10),
            oracle_base_url: "http://127.0.0.1:8083".to_string(),
            oracle_timeout: Duration::from_secs(60),
        }
    }
}
