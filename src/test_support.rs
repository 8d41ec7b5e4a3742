#![allow(dead_code)]

//! In-process fakes of the remote collaborators plus a service harness.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sea_orm::DbErr;

use crate::config::TournamentConfig;
use crate::tournament::clock::ManualClock;
use crate::tournament::creation::{CreateTournament, CreatedTournament};
use crate::tournament::retry::RetryPolicy;
use crate::tournament::service::TournamentService;
use crate::tournament::status::TournamentStatus;
use crate::tournament::storage::{
    InMemoryTournamentStorage, StoreError, TournamentFilter, TournamentStorage,
    TournamentStorageTxn,
};
use crate::tournament::types::{
    LedgerEntry, PrincipalId, PrizeMap, Registration, RegistrationStatus, RewardEvent,
    SettlementResult, TallyShard, Tournament, TournamentId, TournamentKind, UserBalance, Verdict,
    Video, VideoId, Vote, VoteKey,
};
use crate::upstream::{
    BalanceGateway, PayoutGateway, PayoutRequest, PriceOracle, TaskDispatcher, TransitionTask,
    UpstreamError, Upstreams, VideoAnalysis, VideoOracle,
};

/// 2026-10-18T00:00:00Z.
pub const T0_MS: i64 = 1_792_281_600_000;
pub const MINUTE_MS: i64 = 60_000;

#[derive(Default)]
pub struct FakeBalance {
    pub calls: Mutex<Vec<(PrincipalId, i64)>>,
    pub fail_debits: AtomicBool,
    pub fail_credits: AtomicBool,
}

impl FakeBalance {
    pub fn calls(&self) -> Vec<(PrincipalId, i64)> {
        self.calls.lock().clone()
    }

    pub fn net_for(&self, principal_id: &str) -> i64 {
        self.calls
            .lock()
            .iter()
            .filter(|(pid, _)| pid == principal_id)
            .map(|(_, delta)| delta)
            .sum()
    }
}

#[async_trait]
impl BalanceGateway for FakeBalance {
    async fn update_balance(
        &self,
        principal_id: &PrincipalId,
        delta: i64,
    ) -> Result<(), UpstreamError> {
        // Lets concurrent callers interleave around the remote call.
        tokio::task::yield_now().await;
        let failing = if delta < 0 {
            &self.fail_debits
        } else {
            &self.fail_credits
        };
        if failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status {
                service: "balance",
                status: 500,
                body: "unavailable".into(),
            });
        }
        self.calls.lock().push((principal_id.clone(), delta));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePayout {
    pub transfers: Mutex<Vec<PayoutRequest>>,
    pub fail_all: AtomicBool,
    pub fail_for: Mutex<HashSet<PrincipalId>>,
}

impl FakePayout {
    pub fn transfers(&self) -> Vec<PayoutRequest> {
        self.transfers.lock().clone()
    }
}

#[async_trait]
impl PayoutGateway for FakePayout {
    async fn transfer(&self, request: &PayoutRequest) -> Result<(), UpstreamError> {
        if self.fail_all.load(Ordering::SeqCst)
            || self.fail_for.lock().contains(&request.recipient_principal)
        {
            return Err(UpstreamError::Rejected {
                service: "payout",
                reason: Some("insufficient funds".into()),
            });
        }
        self.transfers.lock().push(request.clone());
        Ok(())
    }
}

/// Ticker with a settable quote; `None` behaves like a missing currency.
pub struct FakePrice {
    pub price: Mutex<Option<f64>>,
    pub requests: Mutex<u32>,
}

impl FakePrice {
    pub fn quoting(price: f64) -> Self {
        Self {
            price: Mutex::new(Some(price)),
            requests: Mutex::new(0),
        }
    }

    pub fn set(&self, price: Option<f64>) {
        *self.price.lock() = price;
    }

    pub fn requests(&self) -> u32 {
        *self.requests.lock()
    }
}

#[async_trait]
impl PriceOracle for FakePrice {
    async fn last_price(&self, currency: &str) -> Result<f64, UpstreamError> {
        *self.requests.lock() += 1;
        (*self.price.lock()).ok_or_else(|| UpstreamError::MissingPrice {
            currency: currency.to_string(),
        })
    }
}

/// Oracle answering from a table; unknown videos get `default_verdict`
/// (hot-or-not) or no candidates (smiley).
pub struct FakeVideoOracle {
    pub answers: Mutex<HashMap<VideoId, VideoAnalysis>>,
    pub default_verdict: Verdict,
    pub failing: Mutex<HashSet<VideoId>>,
}

impl Default for FakeVideoOracle {
    fn default() -> Self {
        Self {
            answers: Mutex::new(HashMap::new()),
            default_verdict: Verdict::Hot,
            failing: Mutex::new(HashSet::new()),
        }
    }
}

impl FakeVideoOracle {
    pub fn answer(&self, analysis: VideoAnalysis) {
        self.answers
            .lock()
            .insert(analysis.video_id.clone(), analysis);
    }

    pub fn fail(&self, video_id: &str) {
        self.failing.lock().insert(video_id.to_string());
    }
}

#[async_trait]
impl VideoOracle for FakeVideoOracle {
    async fn analyze(
        &self,
        kind: TournamentKind,
        video_id: &VideoId,
    ) -> Result<VideoAnalysis, UpstreamError> {
        if self.failing.lock().contains(video_id) {
            return Err(UpstreamError::Timeout {
                service: "video_oracle",
            });
        }
        if let Some(answer) = self.answers.lock().get(video_id) {
            return Ok(answer.clone());
        }
        Ok(match kind {
            TournamentKind::HotOrNot => VideoAnalysis {
                verdict: Some(self.default_verdict),
                ..VideoAnalysis::empty(video_id.clone())
            },
            TournamentKind::Smiley => VideoAnalysis::empty(video_id.clone()),
        })
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub tasks: Mutex<Vec<TransitionTask>>,
    pub fail: AtomicBool,
}

impl RecordingDispatcher {
    pub fn tasks(&self) -> Vec<TransitionTask> {
        self.tasks.lock().clone()
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn schedule(&self, task: TransitionTask) -> Result<(), UpstreamError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpstreamError::Dispatch("queue unavailable".into()));
        }
        self.tasks.lock().push(task);
        Ok(())
    }
}

/// Deterministic config: fixed RNG seed, retries without sleeping.
pub fn test_config() -> TournamentConfig {
    TournamentConfig {
        rng_seed: Some(0x7a11_e5),
        retry: RetryPolicy::no_delay(5),
        dispatch_retry: RetryPolicy::no_delay(3),
        ..TournamentConfig::default()
    }
}

/// A service on in-memory storage wired to fakes, with a manual clock at
/// [`T0_MS`].
pub struct Harness {
    pub service: Arc<TournamentService>,
    pub clock: Arc<ManualClock>,
    pub balance: Arc<FakeBalance>,
    pub payout: Arc<FakePayout>,
    pub price: Arc<FakePrice>,
    pub video: Arc<FakeVideoOracle>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: TournamentConfig) -> Self {
        Self::with_storage(config, Arc::new(InMemoryTournamentStorage::new()))
    }

    pub fn with_storage(config: TournamentConfig, storage: Arc<dyn TournamentStorage>) -> Self {
        let clock = Arc::new(ManualClock::at_ms(T0_MS));
        let balance = Arc::new(FakeBalance::default());
        let payout = Arc::new(FakePayout::default());
        // 1 BTC = 5,000,000 INR.
        let price = Arc::new(FakePrice::quoting(5_000_000.0));
        let video = Arc::new(FakeVideoOracle::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let upstreams = Upstreams {
            balance: balance.clone(),
            payout: payout.clone(),
            price: price.clone(),
            video: video.clone(),
            dispatcher: dispatcher.clone(),
        };
        let service = Arc::new(TournamentService::new(
            storage,
            Arc::new(config),
            upstreams,
            clock.clone(),
        ));
        Self {
            service,
            clock,
            balance,
            payout,
            price,
            video,
            dispatcher,
        }
    }

    /// Creates a tournament running from `T0 + 10m` to `T0 + 40m`.
    pub async fn create(
        &self,
        kind: TournamentKind,
        entry_cost: i64,
        prize_map: PrizeMap,
        videos: &[&str],
    ) -> CreatedTournament {
        self.service
            .create(CreateTournament {
                id: None,
                title: "Daily Clash".into(),
                kind,
                date: None,
                start_epoch_ms: T0_MS + 10 * MINUTE_MS,
                end_epoch_ms: T0_MS + 40 * MINUTE_MS,
                entry_cost,
                prize_map,
                total_prize_pool: None,
                video_ids: videos.iter().map(|v| v.to_string()).collect(),
            })
            .await
            .expect("create tournament")
    }

    pub fn go_live(&self) {
        self.clock.set_ms(T0_MS + 15 * MINUTE_MS);
    }

    pub fn go_past_end(&self) {
        self.clock.set_ms(T0_MS + 45 * MINUTE_MS);
    }
}

/// In-memory storage whose writes of a terminal registration status
/// (`rewarded` / `refunded`) fail while `fail_terminal_writes` is set.
#[derive(Default)]
pub struct FlakyStorage {
    inner: InMemoryTournamentStorage,
    pub fail_terminal_writes: Arc<AtomicBool>,
}

#[async_trait]
impl TournamentStorage for FlakyStorage {
    async fn begin(&self) -> Result<Box<dyn TournamentStorageTxn + Send>, StoreError> {
        Ok(Box::new(FlakyTxn {
            inner: self.inner.begin().await?,
            fail_terminal_writes: self.fail_terminal_writes.clone(),
        }))
    }
}

struct FlakyTxn {
    inner: Box<dyn TournamentStorageTxn + Send>,
    fail_terminal_writes: Arc<AtomicBool>,
}

#[async_trait]
impl TournamentStorageTxn for FlakyTxn {
    async fn load_tournament(
        &mut self,
        id: &TournamentId,
    ) -> Result<Option<Tournament>, StoreError> {
        self.inner.load_tournament(id).await
    }

    async fn insert_tournament(&mut self, tournament: Tournament) -> Result<(), StoreError> {
        self.inner.insert_tournament(tournament).await
    }

    async fn update_tournament_status(
        &mut self,
        id: &TournamentId,
        status: TournamentStatus,
        settlement_result: Option<SettlementResult>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .update_tournament_status(id, status, settlement_result, at)
            .await
    }

    async fn increment_participant_count(
        &mut self,
        id: &TournamentId,
        by: i64,
    ) -> Result<(), StoreError> {
        self.inner.increment_participant_count(id, by).await
    }

    async fn list_tournaments(
        &mut self,
        filter: &TournamentFilter,
    ) -> Result<Vec<Tournament>, StoreError> {
        self.inner.list_tournaments(filter).await
    }

    async fn load_registration(
        &mut self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<Option<Registration>, StoreError> {
        self.inner.load_registration(tournament_id, principal_id).await
    }

    async fn insert_registration(&mut self, registration: Registration) -> Result<(), StoreError> {
        self.inner.insert_registration(registration).await
    }

    async fn update_registration(&mut self, registration: Registration) -> Result<(), StoreError> {
        if registration.status != RegistrationStatus::Registered
            && self.fail_terminal_writes.load(Ordering::SeqCst)
        {
            return Err(StoreError::Database(DbErr::Custom("disk full".into())));
        }
        self.inner.update_registration(registration).await
    }

    async fn list_registrations(
        &mut self,
        tournament_id: &TournamentId,
    ) -> Result<Vec<Registration>, StoreError> {
        self.inner.list_registrations(tournament_id).await
    }

    async fn top_registrations(
        &mut self,
        tournament_id: &TournamentId,
        limit: u64,
    ) -> Result<Vec<Registration>, StoreError> {
        self.inner.top_registrations(tournament_id, limit).await
    }

    async fn registrations_with_min_diamonds(
        &mut self,
        tournament_id: &TournamentId,
        min_diamonds: i64,
    ) -> Result<Vec<Registration>, StoreError> {
        self.inner
            .registrations_with_min_diamonds(tournament_id, min_diamonds)
            .await
    }

    async fn load_video(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
    ) -> Result<Option<Video>, StoreError> {
        self.inner.load_video(tournament_id, video_id).await
    }

    async fn insert_video(&mut self, video: Video) -> Result<(), StoreError> {
        self.inner.insert_video(video).await
    }

    async fn load_vote(&mut self, key: &VoteKey) -> Result<Option<Vote>, StoreError> {
        self.inner.load_vote(key).await
    }

    async fn insert_vote(&mut self, vote: Vote) -> Result<(), StoreError> {
        self.inner.insert_vote(vote).await
    }

    async fn update_vote(&mut self, vote: Vote) -> Result<(), StoreError> {
        self.inner.update_vote(vote).await
    }

    async fn load_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
    ) -> Result<Vec<TallyShard>, StoreError> {
        self.inner.load_tally(tournament_id, video_id).await
    }

    async fn init_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
        shards: Vec<TallyShard>,
    ) -> Result<(), StoreError> {
        self.inner.init_tally(tournament_id, video_id, shards).await
    }

    async fn increment_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
        shard: u32,
        option_id: &str,
        by: i64,
    ) -> Result<(), StoreError> {
        self.inner
            .increment_tally(tournament_id, video_id, shard, option_id, by)
            .await
    }

    async fn load_balance(
        &mut self,
        principal_id: &PrincipalId,
    ) -> Result<Option<UserBalance>, StoreError> {
        self.inner.load_balance(principal_id).await
    }

    async fn store_balance(&mut self, balance: UserBalance) -> Result<(), StoreError> {
        self.inner.store_balance(balance).await
    }

    async fn append_ledger_entry(&mut self, entry: LedgerEntry) -> Result<(), StoreError> {
        self.inner.append_ledger_entry(entry).await
    }

    async fn ledger_entries(
        &mut self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.ledger_entries(principal_id).await
    }

    async fn append_reward_event(&mut self, event: RewardEvent) -> Result<(), StoreError> {
        self.inner.append_reward_event(event).await
    }

    async fn reward_events(
        &mut self,
        tournament_id: &TournamentId,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        self.inner.reward_events(tournament_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) {
        self.inner.rollback().await
    }
}
