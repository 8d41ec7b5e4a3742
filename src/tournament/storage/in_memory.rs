use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::tournament::status::TournamentStatus;
use crate::tournament::types::{
    LedgerEntry, PrincipalId, Registration, RewardEvent, SettlementResult, ShardCounts,
    TallyShard, Tournament, TournamentId, UserBalance, Video, VideoId, Vote, VoteKey,
};

use super::{StoreError, TournamentFilter, TournamentStorage, TournamentStorageTxn};

type RegistrationKey = (TournamentId, PrincipalId);
type VideoKey = (TournamentId, VideoId);
type Tally = BTreeMap<u32, ShardCounts>;

/// Documents whose replacement invalidates a concurrent reader.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum DocKey {
    Tournament(TournamentId),
    Registration(RegistrationKey),
    Video(VideoKey),
    Tally(VideoKey),
    Vote(VoteKey),
    Balance(PrincipalId),
}

#[derive(Default)]
struct Inner {
    tournaments: HashMap<TournamentId, Tournament>,
    registrations: HashMap<RegistrationKey, Registration>,
    videos: HashMap<VideoKey, Video>,
    tallies: HashMap<VideoKey, Tally>,
    votes: HashMap<VoteKey, Vote>,
    balances: HashMap<PrincipalId, UserBalance>,
    ledger: Vec<LedgerEntry>,
    rewards: Vec<RewardEvent>,
    versions: HashMap<DocKey, u64>,
}

impl Inner {
    fn version(&self, key: &DocKey) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: DocKey) {
        *self.versions.entry(key).or_insert(0) += 1;
    }

    fn apply(&mut self, write: PendingWrite) -> Result<(), StoreError> {
        match write {
            PendingWrite::PutTournament(tournament) => {
                self.bump(DocKey::Tournament(tournament.id.clone()));
                self.tournaments.insert(tournament.id.clone(), tournament);
            }
            PendingWrite::TournamentStatus {
                id,
                status,
                settlement_result,
                at,
            } => {
                let tournament = self
                    .tournaments
                    .get_mut(&id)
                    .ok_or(StoreError::NotFound("tournament"))?;
                tournament.status = status;
                if settlement_result.is_some() {
                    tournament.settlement_result = settlement_result;
                }
                tournament.updated_at = at;
                self.bump(DocKey::Tournament(id));
            }
            PendingWrite::ParticipantCount { id, by } => {
                let tournament = self
                    .tournaments
                    .get_mut(&id)
                    .ok_or(StoreError::NotFound("tournament"))?;
                tournament.participant_count += by;
            }
            PendingWrite::PutRegistration(registration) => {
                let key = (
                    registration.tournament_id.clone(),
                    registration.principal_id.clone(),
                );
                self.bump(DocKey::Registration(key.clone()));
                self.registrations.insert(key, registration);
            }
            PendingWrite::PutVideo(video) => {
                let key = (video.tournament_id.clone(), video.video_id.clone());
                self.bump(DocKey::Video(key.clone()));
                self.videos.insert(key, video);
            }
            PendingWrite::InitTally { key, shards } => {
                self.bump(DocKey::Tally(key.clone()));
                let tally = self.tallies.entry(key).or_default();
                for shard in shards {
                    tally.insert(shard.index, shard.counts);
                }
            }
            PendingWrite::IncrementTally {
                key,
                shard,
                option_id,
                by,
            } => {
                *self
                    .tallies
                    .entry(key)
                    .or_default()
                    .entry(shard)
                    .or_default()
                    .entry(option_id)
                    .or_insert(0) += by;
            }
            PendingWrite::PutVote(vote) => {
                let key = vote.key();
                self.bump(DocKey::Vote(key.clone()));
                self.votes.insert(key, vote);
            }
            PendingWrite::PutBalance(balance) => {
                self.bump(DocKey::Balance(balance.principal_id.clone()));
                self.balances.insert(balance.principal_id.clone(), balance);
            }
            PendingWrite::AppendLedger(entry) => self.ledger.push(entry),
            PendingWrite::AppendReward(event) => self.rewards.push(event),
        }
        Ok(())
    }
}

enum PendingWrite {
    PutTournament(Tournament),
    TournamentStatus {
        id: TournamentId,
        status: TournamentStatus,
        settlement_result: Option<SettlementResult>,
        at: DateTime<Utc>,
    },
    ParticipantCount {
        id: TournamentId,
        by: i64,
    },
    PutRegistration(Registration),
    PutVideo(Video),
    InitTally {
        key: VideoKey,
        shards: Vec<TallyShard>,
    },
    IncrementTally {
        key: VideoKey,
        shard: u32,
        option_id: String,
        by: i64,
    },
    PutVote(Vote),
    PutBalance(UserBalance),
    AppendLedger(LedgerEntry),
    AppendReward(RewardEvent),
}

/// Documents already written by the transaction, served back to its own reads.
#[derive(Default)]
struct Staged {
    tournaments: HashMap<TournamentId, Tournament>,
    registrations: HashMap<RegistrationKey, Registration>,
    videos: HashMap<VideoKey, Video>,
    tallies: HashMap<VideoKey, Tally>,
    votes: HashMap<VoteKey, Vote>,
    balances: HashMap<PrincipalId, UserBalance>,
    ledger: Vec<LedgerEntry>,
    rewards: Vec<RewardEvent>,
}

/// Process-local store with optimistic concurrency control.
///
/// Every transaction remembers the version of each document it read and
/// fails at commit if any of them moved in the meantime.
#[derive(Clone)]
pub struct InMemoryTournamentStorage {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryTournamentStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

impl Default for InMemoryTournamentStorage {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InMemoryTournamentTxn {
    inner: Arc<RwLock<Inner>>,
    reads: HashMap<DocKey, u64>,
    writes: Vec<PendingWrite>,
    staged: Staged,
}

#[async_trait]
impl TournamentStorage for InMemoryTournamentStorage {
    async fn begin(&self) -> Result<Box<dyn TournamentStorageTxn + Send>, StoreError> {
        Ok(Box::new(InMemoryTournamentTxn {
            inner: Arc::clone(&self.inner),
            reads: HashMap::new(),
            writes: Vec::new(),
            staged: Staged::default(),
        }))
    }
}

impl InMemoryTournamentTxn {
    /// Reads committed state and pins the document version on first access.
    fn read_committed<T>(&mut self, key: DocKey, read: impl FnOnce(&Inner) -> T) -> T {
        let inner = Arc::clone(&self.inner);
        let guard = inner.read();
        let value = read(&guard);
        let version = guard.version(&key);
        drop(guard);
        self.reads.entry(key).or_insert(version);
        value
    }

    fn view_tournament(&mut self, id: &TournamentId) -> Option<Tournament> {
        if let Some(staged) = self.staged.tournaments.get(id) {
            return Some(staged.clone());
        }
        self.read_committed(DocKey::Tournament(id.clone()), |inner| {
            inner.tournaments.get(id).cloned()
        })
    }

    fn view_registration(&mut self, key: &RegistrationKey) -> Option<Registration> {
        if let Some(staged) = self.staged.registrations.get(key) {
            return Some(staged.clone());
        }
        self.read_committed(DocKey::Registration(key.clone()), |inner| {
            inner.registrations.get(key).cloned()
        })
    }

    fn view_video(&mut self, key: &VideoKey) -> Option<Video> {
        if let Some(staged) = self.staged.videos.get(key) {
            return Some(staged.clone());
        }
        self.read_committed(DocKey::Video(key.clone()), |inner| {
            inner.videos.get(key).cloned()
        })
    }

    fn view_vote(&mut self, key: &VoteKey) -> Option<Vote> {
        if let Some(staged) = self.staged.votes.get(key) {
            return Some(staged.clone());
        }
        self.read_committed(DocKey::Vote(key.clone()), |inner| {
            inner.votes.get(key).cloned()
        })
    }

    fn view_balance(&mut self, principal_id: &PrincipalId) -> Option<UserBalance> {
        if let Some(staged) = self.staged.balances.get(principal_id) {
            return Some(staged.clone());
        }
        self.read_committed(DocKey::Balance(principal_id.clone()), |inner| {
            inner.balances.get(principal_id).cloned()
        })
    }

    /// Staged copy of a tally; increments never pin the tally version.
    fn staged_tally(&mut self, key: &VideoKey) -> &mut Tally {
        if !self.staged.tallies.contains_key(key) {
            let committed = self.inner.read().tallies.get(key).cloned().unwrap_or_default();
            self.staged.tallies.insert(key.clone(), committed);
        }
        self.staged.tallies.entry(key.clone()).or_default()
    }

    fn merged_registrations(&self, tournament_id: &TournamentId) -> Vec<Registration> {
        let mut merged: HashMap<PrincipalId, Registration> = self
            .inner
            .read()
            .registrations
            .iter()
            .filter(|((tid, _), _)| tid == tournament_id)
            .map(|((_, pid), reg)| (pid.clone(), reg.clone()))
            .collect();
        for ((tid, pid), reg) in &self.staged.registrations {
            if tid == tournament_id {
                merged.insert(pid.clone(), reg.clone());
            }
        }
        merged.into_values().collect()
    }
}

fn by_diamonds_desc(regs: &mut [Registration]) {
    regs.sort_by(|a, b| {
        b.diamonds
            .cmp(&a.diamonds)
            .then_with(|| a.principal_id.cmp(&b.principal_id))
    });
}

#[async_trait]
impl TournamentStorageTxn for InMemoryTournamentTxn {
    async fn load_tournament(
        &mut self,
        id: &TournamentId,
    ) -> Result<Option<Tournament>, StoreError> {
        Ok(self.view_tournament(id))
    }

    async fn insert_tournament(&mut self, tournament: Tournament) -> Result<(), StoreError> {
        if self.view_tournament(&tournament.id).is_some() {
            return Err(StoreError::AlreadyExists("tournament"));
        }
        self.staged
            .tournaments
            .insert(tournament.id.clone(), tournament.clone());
        self.writes.push(PendingWrite::PutTournament(tournament));
        Ok(())
    }

    async fn update_tournament_status(
        &mut self,
        id: &TournamentId,
        status: TournamentStatus,
        settlement_result: Option<SettlementResult>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tournament = self
            .view_tournament(id)
            .ok_or(StoreError::NotFound("tournament"))?;
        tournament.status = status;
        if settlement_result.is_some() {
            tournament.settlement_result = settlement_result.clone();
        }
        tournament.updated_at = at;
        self.staged.tournaments.insert(id.clone(), tournament);
        self.writes.push(PendingWrite::TournamentStatus {
            id: id.clone(),
            status,
            settlement_result,
            at,
        });
        Ok(())
    }

    async fn increment_participant_count(
        &mut self,
        id: &TournamentId,
        by: i64,
    ) -> Result<(), StoreError> {
        let mut tournament = self
            .view_tournament(id)
            .ok_or(StoreError::NotFound("tournament"))?;
        tournament.participant_count += by;
        self.staged.tournaments.insert(id.clone(), tournament);
        self.writes.push(PendingWrite::ParticipantCount { id: id.clone(), by });
        Ok(())
    }

    async fn list_tournaments(
        &mut self,
        filter: &TournamentFilter,
    ) -> Result<Vec<Tournament>, StoreError> {
        let mut merged: HashMap<TournamentId, Tournament> = self.inner.read().tournaments.clone();
        for (id, staged) in &self.staged.tournaments {
            merged.insert(id.clone(), staged.clone());
        }
        let mut rows: Vec<Tournament> = merged
            .into_values()
            .filter(|t| filter.date.as_ref().map_or(true, |d| &t.date == d))
            .filter(|t| filter.date_from.as_ref().map_or(true, |d| &t.date >= d))
            .filter(|t| filter.kind.map_or(true, |k| t.kind == k))
            .collect();
        rows.sort_by(|a, b| {
            a.start_epoch_ms
                .cmp(&b.start_epoch_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = filter.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn load_registration(
        &mut self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(self.view_registration(&(tournament_id.clone(), principal_id.clone())))
    }

    async fn insert_registration(&mut self, registration: Registration) -> Result<(), StoreError> {
        let key = (
            registration.tournament_id.clone(),
            registration.principal_id.clone(),
        );
        if self.view_registration(&key).is_some() {
            return Err(StoreError::AlreadyExists("registration"));
        }
        self.staged.registrations.insert(key, registration.clone());
        self.writes.push(PendingWrite::PutRegistration(registration));
        Ok(())
    }

    async fn update_registration(&mut self, registration: Registration) -> Result<(), StoreError> {
        let key = (
            registration.tournament_id.clone(),
            registration.principal_id.clone(),
        );
        if self.view_registration(&key).is_none() {
            return Err(StoreError::NotFound("registration"));
        }
        self.staged.registrations.insert(key, registration.clone());
        self.writes.push(PendingWrite::PutRegistration(registration));
        Ok(())
    }

    async fn list_registrations(
        &mut self,
        tournament_id: &TournamentId,
    ) -> Result<Vec<Registration>, StoreError> {
        let mut regs = self.merged_registrations(tournament_id);
        regs.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.principal_id.cmp(&b.principal_id))
        });
        Ok(regs)
    }

    async fn top_registrations(
        &mut self,
        tournament_id: &TournamentId,
        limit: u64,
    ) -> Result<Vec<Registration>, StoreError> {
        let mut regs = self.merged_registrations(tournament_id);
        by_diamonds_desc(&mut regs);
        regs.truncate(limit as usize);
        Ok(regs)
    }

    async fn registrations_with_min_diamonds(
        &mut self,
        tournament_id: &TournamentId,
        min_diamonds: i64,
    ) -> Result<Vec<Registration>, StoreError> {
        let mut regs: Vec<Registration> = self
            .merged_registrations(tournament_id)
            .into_iter()
            .filter(|reg| reg.diamonds >= min_diamonds)
            .collect();
        by_diamonds_desc(&mut regs);
        Ok(regs)
    }

    async fn load_video(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
    ) -> Result<Option<Video>, StoreError> {
        Ok(self.view_video(&(tournament_id.clone(), video_id.clone())))
    }

    async fn insert_video(&mut self, video: Video) -> Result<(), StoreError> {
        let key = (video.tournament_id.clone(), video.video_id.clone());
        if self.view_video(&key).is_some() {
            return Err(StoreError::AlreadyExists("video"));
        }
        self.staged.videos.insert(key, video.clone());
        self.writes.push(PendingWrite::PutVideo(video));
        Ok(())
    }

    async fn load_vote(&mut self, key: &VoteKey) -> Result<Option<Vote>, StoreError> {
        Ok(self.view_vote(key))
    }

    async fn insert_vote(&mut self, vote: Vote) -> Result<(), StoreError> {
        let key = vote.key();
        if self.view_vote(&key).is_some() {
            return Err(StoreError::AlreadyExists("vote"));
        }
        self.staged.votes.insert(key, vote.clone());
        self.writes.push(PendingWrite::PutVote(vote));
        Ok(())
    }

    async fn update_vote(&mut self, vote: Vote) -> Result<(), StoreError> {
        let key = vote.key();
        if self.view_vote(&key).is_none() {
            return Err(StoreError::NotFound("vote"));
        }
        self.staged.votes.insert(key, vote.clone());
        self.writes.push(PendingWrite::PutVote(vote));
        Ok(())
    }

    async fn load_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
    ) -> Result<Vec<TallyShard>, StoreError> {
        let key = (tournament_id.clone(), video_id.clone());
        let tally = match self.staged.tallies.get(&key) {
            Some(staged) => staged.clone(),
            None => self.read_committed(DocKey::Tally(key.clone()), |inner| {
                inner.tallies.get(&key).cloned().unwrap_or_default()
            }),
        };
        Ok(tally
            .into_iter()
            .map(|(index, counts)| TallyShard { index, counts })
            .collect())
    }

    async fn init_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
        shards: Vec<TallyShard>,
    ) -> Result<(), StoreError> {
        let key = (tournament_id.clone(), video_id.clone());
        let tally = self.staged_tally(&key);
        for shard in &shards {
            tally.insert(shard.index, shard.counts.clone());
        }
        self.writes.push(PendingWrite::InitTally { key, shards });
        Ok(())
    }

    async fn increment_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
        shard: u32,
        option_id: &str,
        by: i64,
    ) -> Result<(), StoreError> {
        let key = (tournament_id.clone(), video_id.clone());
        *self
            .staged_tally(&key)
            .entry(shard)
            .or_default()
            .entry(option_id.to_string())
            .or_insert(0) += by;
        self.writes.push(PendingWrite::IncrementTally {
            key,
            shard,
            option_id: option_id.to_string(),
            by,
        });
        Ok(())
    }

    async fn load_balance(
        &mut self,
        principal_id: &PrincipalId,
    ) -> Result<Option<UserBalance>, StoreError> {
        Ok(self.view_balance(principal_id))
    }

    async fn store_balance(&mut self, balance: UserBalance) -> Result<(), StoreError> {
        self.staged
            .balances
            .insert(balance.principal_id.clone(), balance.clone());
        self.writes.push(PendingWrite::PutBalance(balance));
        Ok(())
    }

    async fn append_ledger_entry(&mut self, entry: LedgerEntry) -> Result<(), StoreError> {
        self.staged.ledger.push(entry.clone());
        self.writes.push(PendingWrite::AppendLedger(entry));
        Ok(())
    }

    async fn ledger_entries(
        &mut self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut entries: Vec<LedgerEntry> = self
            .inner
            .read()
            .ledger
            .iter()
            .filter(|entry| &entry.principal_id == principal_id)
            .cloned()
            .collect();
        entries.extend(
            self.staged
                .ledger
                .iter()
                .filter(|entry| &entry.principal_id == principal_id)
                .cloned(),
        );
        Ok(entries)
    }

    async fn append_reward_event(&mut self, event: RewardEvent) -> Result<(), StoreError> {
        self.staged.rewards.push(event.clone());
        self.writes.push(PendingWrite::AppendReward(event));
        Ok(())
    }

    async fn reward_events(
        &mut self,
        tournament_id: &TournamentId,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let mut events: Vec<RewardEvent> = self
            .inner
            .read()
            .rewards
            .iter()
            .filter(|event| &event.tournament_id == tournament_id)
            .cloned()
            .collect();
        events.extend(
            self.staged
                .rewards
                .iter()
                .filter(|event| &event.tournament_id == tournament_id)
                .cloned(),
        );
        Ok(events)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTournamentTxn {
            inner,
            reads,
            writes,
            ..
        } = *self;
        let mut guard = inner.write();
        if reads
            .iter()
            .any(|(key, seen)| guard.version(key) != *seen)
        {
            return Err(StoreError::Conflict);
        }
        for write in writes {
            guard.apply(write)?;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) {}
}
