use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{derive_status, effective_status, TournamentStatus};

pub type TournamentId = String;
pub type PrincipalId = String;
pub type VideoId = String;
pub type OptionId = String;
/// Entry-currency units (coins).
pub type Coins = i64;
/// Diamonds are the per-tournament vote lives.
pub type Diamonds = i64;
/// 1-based leaderboard position -> prize amount in the prize currency.
pub type PrizeMap = BTreeMap<u32, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentKind {
    /// Majority vote over emoji reactions.
    Smiley,
    /// Binary vote against a precomputed AI verdict.
    HotOrNot,
}

impl TournamentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentKind::Smiley => "smiley",
            TournamentKind::HotOrNot => "hot_or_not",
        }
    }
}

impl fmt::Display for TournamentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "smiley" => Ok(TournamentKind::Smiley),
            "hot_or_not" | "hotornot" | "hot-or-not" => Ok(TournamentKind::HotOrNot),
            other => Err(format!("unknown tournament type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub title: String,
    pub kind: TournamentKind,
    /// Calendar date (YYYY-MM-DD) the tournament belongs to.
    pub date: String,
    pub start_epoch_ms: i64,
    pub end_epoch_ms: i64,
    pub entry_cost: Coins,
    pub total_prize_pool: u64,
    pub prize_map: PrizeMap,
    pub status: TournamentStatus,
    pub participant_count: i64,
    pub settlement_result: Option<SettlementResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tournament {
    pub fn derived_status(&self, now_ms: i64) -> TournamentStatus {
        derive_status(self.start_epoch_ms, self.end_epoch_ms, now_ms)
    }

    pub fn effective_status(&self, now_ms: i64) -> TournamentStatus {
        effective_status(self.status, self.start_epoch_ms, self.end_epoch_ms, now_ms)
    }

    /// Highest position that carries a prize (K for the top-K query).
    pub fn max_prize_position(&self) -> u32 {
        self.prize_map.keys().next_back().copied().unwrap_or(0)
    }

    pub fn prize_for(&self, position: u32) -> Option<u64> {
        self.prize_map.get(&position).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Registered,
    Refunded,
    Rewarded,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "registered",
            RegistrationStatus::Refunded => "refunded",
            RegistrationStatus::Rewarded => "rewarded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub tournament_id: TournamentId,
    pub principal_id: PrincipalId,
    pub coins_paid: Coins,
    pub diamonds: Diamonds,
    pub wins: i64,
    pub losses: i64,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
    /// Last activity. `None` until the first vote lands.
    pub updated_at: Option<DateTime<Utc>>,
    /// Lease marker held while a payout or refund RPC is in flight.
    pub payout_claimed_at: Option<DateTime<Utc>>,
    /// Set just before a payout or refund RPC and cleared only once its
    /// outcome is known. Unlike the claim it never expires.
    pub payout_attempted_at: Option<DateTime<Utc>>,
    pub prize_position: Option<u32>,
    pub prize_amount: Option<u64>,
    pub payout_amount: Option<u64>,
    pub prize_sent_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Registration {
    pub fn new(
        tournament_id: TournamentId,
        principal_id: PrincipalId,
        coins_paid: Coins,
        diamonds: Diamonds,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            tournament_id,
            principal_id,
            coins_paid,
            diamonds,
            wins: 0,
            losses: 0,
            status: RegistrationStatus::Registered,
            registered_at: at,
            updated_at: None,
            payout_claimed_at: None,
            payout_attempted_at: None,
            prize_position: None,
            prize_amount: None,
            payout_amount: None,
            prize_sent_at: None,
            refunded_at: None,
        }
    }

    pub fn games_played(&self) -> i64 {
        self.wins + self.losses
    }

    pub fn has_played(&self) -> bool {
        self.games_played() > 0
    }

    /// Whether another settlement run currently holds the payout lease.
    pub fn claim_is_held(&self, now: DateTime<Utc>, lease: chrono::Duration) -> bool {
        matches!(self.payout_claimed_at, Some(at) if now - at < lease)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Hot,
    Not,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Hot => "hot",
            Verdict::Not => "not",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hot" => Some(Verdict::Hot),
            "not" => Some(Verdict::Not),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub tournament_id: TournamentId,
    pub video_id: VideoId,
    /// Precomputed AI verdict (hot/not tournaments only).
    pub ai_verdict: Option<Verdict>,
    /// Up to five candidate emoji ids suggested by the oracle.
    pub candidates: Vec<OptionId>,
    pub top_pick: Option<OptionId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
        }
    }

    pub fn diamond_delta(&self) -> Diamonds {
        match self {
            Outcome::Win => 1,
            Outcome::Loss => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoteKey {
    pub tournament_id: TournamentId,
    pub principal_id: PrincipalId,
    pub video_id: VideoId,
}

impl VoteKey {
    pub fn new(
        tournament_id: impl Into<TournamentId>,
        principal_id: impl Into<PrincipalId>,
        video_id: impl Into<VideoId>,
    ) -> Self {
        Self {
            tournament_id: tournament_id.into(),
            principal_id: principal_id.into(),
            video_id: video_id.into(),
        }
    }

    /// Composite document id, `{principal}_{video}` scoped by tournament.
    pub fn document_id(&self) -> String {
        format!("{}_{}", self.principal_id, self.video_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub tournament_id: TournamentId,
    pub principal_id: PrincipalId,
    pub video_id: VideoId,
    pub option_id: OptionId,
    pub outcome: Option<Outcome>,
    pub at: DateTime<Utc>,
}

impl Vote {
    pub fn key(&self) -> VoteKey {
        VoteKey::new(
            self.tournament_id.clone(),
            self.principal_id.clone(),
            self.video_id.clone(),
        )
    }
}

/// Counts per option for one shard of a video's tally.
pub type ShardCounts = BTreeMap<OptionId, i64>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyShard {
    pub index: u32,
    pub counts: ShardCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerReason {
    Init,
    Win,
    Loss,
    Airdrop,
    TapRecharge,
    TournamentEntry,
    TournamentRefund,
    Rollback,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::Init => "INIT",
            LedgerReason::Win => "WIN",
            LedgerReason::Loss => "LOSS",
            LedgerReason::Airdrop => "AIRDROP",
            LedgerReason::TapRecharge => "TAP_RECHARGE",
            LedgerReason::TournamentEntry => "TOURNAMENT_ENTRY",
            LedgerReason::TournamentRefund => "TOURNAMENT_REFUND",
            LedgerReason::Rollback => "ROLLBACK",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            LedgerReason::Init,
            LedgerReason::Win,
            LedgerReason::Loss,
            LedgerReason::Airdrop,
            LedgerReason::TapRecharge,
            LedgerReason::TournamentEntry,
            LedgerReason::TournamentRefund,
            LedgerReason::Rollback,
        ]
        .into_iter()
        .find(|reason| reason.as_str() == value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerContext {
    pub tournament_id: Option<TournamentId>,
    pub video_id: Option<VideoId>,
}

impl LedgerContext {
    pub fn tournament(id: impl Into<TournamentId>) -> Self {
        Self {
            tournament_id: Some(id.into()),
            video_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub principal_id: PrincipalId,
    pub delta: i64,
    pub reason: LedgerReason,
    pub tournament_id: Option<TournamentId>,
    pub video_id: Option<VideoId>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBalance {
    pub principal_id: PrincipalId,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

/// Audit record of a successful prize payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardEvent {
    pub id: Uuid,
    pub tournament_id: TournamentId,
    pub principal_id: PrincipalId,
    pub position: u32,
    pub prize_amount: u64,
    pub payout_amount: u64,
    pub payout_currency: String,
    pub rate: Option<f64>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    Prizes,
    InsufficientPlayers,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutAction {
    Reward,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Sent,
    AlreadySent,
    /// Another run holds the claim, or a remote call went out without its
    /// outcome being recorded.
    InFlight,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementDetail {
    pub principal_id: PrincipalId,
    pub action: PayoutAction,
    pub position: Option<u32>,
    /// Prize amount (rewards) or coins returned (refunds).
    pub amount: u64,
    pub payout_amount: Option<u64>,
    pub status: PayoutStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub kind: SettlementKind,
    pub success: bool,
    pub players_who_played: u32,
    pub rewards_sent: u32,
    pub rewards_failed: u32,
    pub refunds_sent: u32,
    pub refunds_failed: u32,
    /// Sum of prize amounts delivered, in the prize currency.
    pub total_paid: u64,
    pub total_refunded: u64,
    pub payout_currency: Option<String>,
    pub rate: Option<f64>,
    pub details: Vec<SettlementDetail>,
    pub settled_at: DateTime<Utc>,
}
