use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sea_orm::DatabaseConnection;

use crate::config::TournamentConfig;
use crate::upstream::{TransitionHandler, TransitionTask, Upstreams};

use super::clock::{Clock, SystemClock};
use super::creation::{CreateTournament, CreatedTournament};
use super::error::TournamentError;
use super::lifecycle::TransitionReport;
use super::query::{LeaderboardView, ListQuery, TournamentStatusView, TournamentSummary};
use super::registration::RegisterOutcome;
use super::status::TournamentStatus;
use super::storage::{
    InMemoryTournamentStorage, SeaOrmTournamentStorage, TournamentStorage,
    TournamentStorageTxn,
};
use super::types::{PrincipalId, SettlementResult, TournamentId};
use super::voting::{VoteOutcome, VoteRequest};

/// Client and operator facing operations.
#[async_trait]
pub trait TournamentOps: Send + Sync {
    async fn list(&self, query: ListQuery) -> Result<Vec<TournamentSummary>, TournamentError>;

    async fn status(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<TournamentStatusView, TournamentError>;

    async fn register(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<RegisterOutcome, TournamentError>;

    async fn vote(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
        request: VoteRequest,
    ) -> Result<VoteOutcome, TournamentError>;

    async fn leaderboard(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<LeaderboardView, TournamentError>;

    async fn my_tournaments(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<TournamentSummary>, TournamentError>;

    async fn create(&self, request: CreateTournament)
        -> Result<CreatedTournament, TournamentError>;

    async fn advance_status(
        &self,
        tournament_id: &TournamentId,
        target: TournamentStatus,
    ) -> Result<TransitionReport, TournamentError>;

    async fn settle(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<SettlementResult, TournamentError>;
}

pub struct TournamentService {
    pub(crate) storage: Arc<dyn TournamentStorage>,
    pub(crate) config: Arc<TournamentConfig>,
    pub(crate) upstreams: Upstreams,
    pub(crate) clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
}

impl TournamentService {
    pub fn new(
        storage: Arc<dyn TournamentStorage>,
        config: Arc<TournamentConfig>,
        upstreams: Upstreams,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            storage,
            config,
            upstreams,
            clock,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_sea_orm(
        connection: DatabaseConnection,
        config: Arc<TournamentConfig>,
        upstreams: Upstreams,
    ) -> Self {
        let storage =
            Arc::new(SeaOrmTournamentStorage::new(connection)) as Arc<dyn TournamentStorage>;
        Self::new(storage, config, upstreams, Arc::new(SystemClock))
    }

    pub fn in_memory(
        config: Arc<TournamentConfig>,
        upstreams: Upstreams,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let storage = Arc::new(InMemoryTournamentStorage::new()) as Arc<dyn TournamentStorage>;
        Self::new(storage, config, upstreams, clock)
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn TournamentStorage> {
        &self.storage
    }

    /// Runs `f` against the service RNG. Never hold the guard across an await.
    pub(crate) fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock();
        f(&mut rng)
    }

    pub(crate) async fn begin(
        &self,
    ) -> Result<Box<dyn TournamentStorageTxn + Send>, TournamentError> {
        Ok(self.storage.begin().await?)
    }
}

/// Commits on success, rolls back on error.
pub(crate) async fn finish<T>(
    txn: Box<dyn TournamentStorageTxn + Send>,
    result: Result<T, TournamentError>,
) -> Result<T, TournamentError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            txn.rollback().await;
            Err(err)
        }
    }
}

/// Read-only unit of work; always rolled back.
pub(crate) async fn release<T>(
    txn: Box<dyn TournamentStorageTxn + Send>,
    result: Result<T, TournamentError>,
) -> Result<T, TournamentError> {
    txn.rollback().await;
    result
}

pub(crate) fn require_id(code: &'static str, field: &str, value: &str) -> Result<(), TournamentError> {
    if value.trim().is_empty() {
        return Err(TournamentError::validation(code, format!("{field} required")));
    }
    Ok(())
}

#[async_trait]
impl TournamentOps for TournamentService {
    async fn list(&self, query: ListQuery) -> Result<Vec<TournamentSummary>, TournamentError> {
        TournamentService::list(self, query).await
    }

    async fn status(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<TournamentStatusView, TournamentError> {
        TournamentService::status(self, tournament_id).await
    }

    async fn register(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<RegisterOutcome, TournamentError> {
        TournamentService::register(self, tournament_id, principal_id).await
    }

    async fn vote(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
        request: VoteRequest,
    ) -> Result<VoteOutcome, TournamentError> {
        TournamentService::vote(self, tournament_id, principal_id, request).await
    }

    async fn leaderboard(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<LeaderboardView, TournamentError> {
        TournamentService::leaderboard(self, tournament_id, principal_id).await
    }

    async fn my_tournaments(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<TournamentSummary>, TournamentError> {
        TournamentService::my_tournaments(self, principal_id).await
    }

    async fn create(
        &self,
        request: CreateTournament,
    ) -> Result<CreatedTournament, TournamentError> {
        TournamentService::create(self, request).await
    }

    async fn advance_status(
        &self,
        tournament_id: &TournamentId,
        target: TournamentStatus,
    ) -> Result<TransitionReport, TournamentError> {
        TournamentService::advance_status(self, tournament_id, target).await
    }

    async fn settle(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<SettlementResult, TournamentError> {
        TournamentService::settle(self, tournament_id).await
    }
}

#[async_trait]
impl TransitionHandler for TournamentService {
    async fn deliver(&self, task: &TransitionTask) -> Result<(), TournamentError> {
        self.advance_status(&task.tournament_id, task.status)
            .await
            .map(|_| ())
    }
}
