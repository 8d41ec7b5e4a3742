use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ::sea_orm::DbErr;

use super::status::TournamentStatus;
use super::types::{
    LedgerEntry, PrincipalId, Registration, RewardEvent, SettlementResult, TallyShard, Tournament,
    TournamentId, TournamentKind, UserBalance, Video, VideoId, Vote, VoteKey,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic or serializable conflict. Safe to retry the whole transaction.
    #[error("transaction conflict")]
    Conflict,
    #[error("{0} already exists")]
    AlreadyExists(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TournamentFilter {
    /// Exact calendar date.
    pub date: Option<String>,
    /// Inclusive lower bound on the calendar date.
    pub date_from: Option<String>,
    pub kind: Option<TournamentKind>,
    pub limit: Option<u64>,
}

#[async_trait]
pub trait TournamentStorage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn TournamentStorageTxn + Send>, StoreError>;
}

/// One unit of work against the tournament store.
///
/// Reads observe the transaction's own pending writes. `commit` fails with
/// [`StoreError::Conflict`] when a document read by the transaction was
/// replaced concurrently; increments (tally shards, participant count) are
/// commutative and never invalidate readers.
#[async_trait]
pub trait TournamentStorageTxn: Send {
    async fn load_tournament(
        &mut self,
        id: &TournamentId,
    ) -> Result<Option<Tournament>, StoreError>;

    async fn insert_tournament(&mut self, tournament: Tournament) -> Result<(), StoreError>;

    /// Targeted update of the status column (and the settlement result when given).
    async fn update_tournament_status(
        &mut self,
        id: &TournamentId,
        status: TournamentStatus,
        settlement_result: Option<SettlementResult>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn increment_participant_count(
        &mut self,
        id: &TournamentId,
        by: i64,
    ) -> Result<(), StoreError>;

    /// Tournaments matching the filter, ordered by start time.
    async fn list_tournaments(
        &mut self,
        filter: &TournamentFilter,
    ) -> Result<Vec<Tournament>, StoreError>;

    async fn load_registration(
        &mut self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<Option<Registration>, StoreError>;

    async fn insert_registration(&mut self, registration: Registration) -> Result<(), StoreError>;

    async fn update_registration(&mut self, registration: Registration) -> Result<(), StoreError>;

    async fn list_registrations(
        &mut self,
        tournament_id: &TournamentId,
    ) -> Result<Vec<Registration>, StoreError>;

    /// Registrations ordered by diamonds descending, at most `limit` rows.
    async fn top_registrations(
        &mut self,
        tournament_id: &TournamentId,
        limit: u64,
    ) -> Result<Vec<Registration>, StoreError>;

    /// Every registration holding at least `min_diamonds`, ordered by
    /// diamonds descending.
    async fn registrations_with_min_diamonds(
        &mut self,
        tournament_id: &TournamentId,
        min_diamonds: i64,
    ) -> Result<Vec<Registration>, StoreError>;

    async fn load_video(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
    ) -> Result<Option<Video>, StoreError>;

    async fn insert_video(&mut self, video: Video) -> Result<(), StoreError>;

    async fn load_vote(&mut self, key: &VoteKey) -> Result<Option<Vote>, StoreError>;

    async fn insert_vote(&mut self, vote: Vote) -> Result<(), StoreError>;

    async fn update_vote(&mut self, vote: Vote) -> Result<(), StoreError>;

    /// Shards of the video's tally ordered by index; empty when never initialized.
    async fn load_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
    ) -> Result<Vec<TallyShard>, StoreError>;

    async fn init_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
        shards: Vec<TallyShard>,
    ) -> Result<(), StoreError>;

    async fn increment_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
        shard: u32,
        option_id: &str,
        by: i64,
    ) -> Result<(), StoreError>;

    async fn load_balance(
        &mut self,
        principal_id: &PrincipalId,
    ) -> Result<Option<UserBalance>, StoreError>;

    async fn store_balance(&mut self, balance: UserBalance) -> Result<(), StoreError>;

    async fn append_ledger_entry(&mut self, entry: LedgerEntry) -> Result<(), StoreError>;

    async fn ledger_entries(
        &mut self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn append_reward_event(&mut self, event: RewardEvent) -> Result<(), StoreError>;

    async fn reward_events(
        &mut self,
        tournament_id: &TournamentId,
    ) -> Result<Vec<RewardEvent>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>);
}

pub mod in_memory;
pub mod sea_orm;

pub use in_memory::InMemoryTournamentStorage;
pub use sea_orm::SeaOrmTournamentStorage;
