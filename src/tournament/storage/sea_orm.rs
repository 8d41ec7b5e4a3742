use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IsolationLevel, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};

use crate::db::entity::sea_orm_active_enums::{
    RegistrationStatus as DbRegistrationStatus, TournamentKind as DbTournamentKind,
    TournamentStatus as DbTournamentStatus, VoteOutcome as DbVoteOutcome,
};
use crate::db::entity::{
    ledger_transactions, registrations, reward_events, tally_shards, tournaments, user_balances,
    videos, votes,
};
use crate::tournament::status::TournamentStatus;
use crate::tournament::types::{
    LedgerEntry, LedgerReason, Outcome, PrincipalId, Registration, RegistrationStatus,
    RewardEvent, SettlementResult, ShardCounts, TallyShard, Tournament, TournamentId,
    TournamentKind, UserBalance, Verdict, Video, VideoId, Vote, VoteKey,
};

use super::{StoreError, TournamentFilter, TournamentStorage, TournamentStorageTxn};

/// Postgres-backed store. Every transaction runs at SERIALIZABLE isolation.
pub struct SeaOrmTournamentStorage {
    connection: DatabaseConnection,
}

impl SeaOrmTournamentStorage {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

pub struct SeaOrmTournamentTxn {
    txn: DatabaseTransaction,
}

#[async_trait]
impl TournamentStorage for SeaOrmTournamentStorage {
    async fn begin(&self) -> Result<Box<dyn TournamentStorageTxn + Send>, StoreError> {
        let txn = self
            .connection
            .begin_with_config(Some(IsolationLevel::Serializable), None)
            .await?;
        Ok(Box::new(SeaOrmTournamentTxn { txn }))
    }
}

/// Serialization failures, deadlocks and unique violations are retryable conflicts.
fn classify(err: DbErr) -> StoreError {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return StoreError::Conflict;
    }
    let text = err.to_string();
    if text.contains("40001") || text.contains("could not serialize") || text.contains("deadlock")
    {
        return StoreError::Conflict;
    }
    StoreError::Database(err)
}

#[async_trait]
impl TournamentStorageTxn for SeaOrmTournamentTxn {
    async fn load_tournament(
        &mut self,
        id: &TournamentId,
    ) -> Result<Option<Tournament>, StoreError> {
        let record = tournaments::Entity::find_by_id(id.clone())
            .one(&self.txn)
            .await
            .map_err(classify)?;
        record.map(tournament_from_model).transpose()
    }

    async fn insert_tournament(&mut self, tournament: Tournament) -> Result<(), StoreError> {
        let prize_map = to_json(&tournament.prize_map)?;
        let settlement_result = tournament
            .settlement_result
            .as_ref()
            .map(to_json)
            .transpose()?;
        let model = tournaments::ActiveModel {
            id: Set(tournament.id),
            title: Set(tournament.title),
            kind: Set(kind_to_db(tournament.kind)),
            date: Set(tournament.date),
            start_epoch_ms: Set(tournament.start_epoch_ms),
            end_epoch_ms: Set(tournament.end_epoch_ms),
            entry_cost: Set(tournament.entry_cost),
            total_prize_pool: Set(u64_to_i64(tournament.total_prize_pool)?),
            prize_map: Set(prize_map),
            status: Set(status_to_db(tournament.status)),
            participant_count: Set(tournament.participant_count),
            settlement_result: Set(settlement_result),
            created_at: Set(tournament.created_at),
            updated_at: Set(tournament.updated_at),
        };
        match tournaments::Entity::insert(model).exec(&self.txn).await {
            Ok(_) => Ok(()),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(StoreError::AlreadyExists("tournament"))
            }
            Err(err) => Err(classify(err)),
        }
    }

    async fn update_tournament_status(
        &mut self,
        id: &TournamentId,
        status: TournamentStatus,
        settlement_result: Option<SettlementResult>,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut model = tournaments::ActiveModel {
            id: Set(id.clone()),
            status: Set(status_to_db(status)),
            updated_at: Set(at),
            ..Default::default()
        };
        if let Some(result) = settlement_result.as_ref() {
            model.settlement_result = Set(Some(to_json(result)?));
        }
        match model.update(&self.txn).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StoreError::NotFound("tournament")),
            Err(err) => Err(classify(err)),
        }
    }

    async fn increment_participant_count(
        &mut self,
        id: &TournamentId,
        by: i64,
    ) -> Result<(), StoreError> {
        let result = tournaments::Entity::update_many()
            .col_expr(
                tournaments::Column::ParticipantCount,
                Expr::col(tournaments::Column::ParticipantCount).add(by),
            )
            .filter(tournaments::Column::Id.eq(id.clone()))
            .exec(&self.txn)
            .await
            .map_err(classify)?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound("tournament"));
        }
        Ok(())
    }

    async fn list_tournaments(
        &mut self,
        filter: &TournamentFilter,
    ) -> Result<Vec<Tournament>, StoreError> {
        let mut query = tournaments::Entity::find();
        if let Some(date) = &filter.date {
            query = query.filter(tournaments::Column::Date.eq(date.clone()));
        }
        if let Some(date_from) = &filter.date_from {
            query = query.filter(tournaments::Column::Date.gte(date_from.clone()));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(tournaments::Column::Kind.eq(kind_to_db(kind)));
        }
        query = query
            .order_by_asc(tournaments::Column::StartEpochMs)
            .order_by_asc(tournaments::Column::Id);
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }
        let rows = query.all(&self.txn).await.map_err(classify)?;
        rows.into_iter().map(tournament_from_model).collect()
    }

    async fn load_registration(
        &mut self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<Option<Registration>, StoreError> {
        let record =
            registrations::Entity::find_by_id((tournament_id.clone(), principal_id.clone()))
                .one(&self.txn)
                .await
                .map_err(classify)?;
        record.map(registration_from_model).transpose()
    }

    async fn insert_registration(&mut self, registration: Registration) -> Result<(), StoreError> {
        let model = registration_to_active(registration)?;
        registrations::Entity::insert(model)
            .exec(&self.txn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update_registration(&mut self, registration: Registration) -> Result<(), StoreError> {
        let model = registration_to_active(registration)?;
        match model.update(&self.txn).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StoreError::NotFound("registration")),
            Err(err) => Err(classify(err)),
        }
    }

    async fn list_registrations(
        &mut self,
        tournament_id: &TournamentId,
    ) -> Result<Vec<Registration>, StoreError> {
        let rows = registrations::Entity::find()
            .filter(registrations::Column::TournamentId.eq(tournament_id.clone()))
            .order_by_asc(registrations::Column::RegisteredAt)
            .order_by_asc(registrations::Column::PrincipalId)
            .all(&self.txn)
            .await
            .map_err(classify)?;
        rows.into_iter().map(registration_from_model).collect()
    }

    async fn top_registrations(
        &mut self,
        tournament_id: &TournamentId,
        limit: u64,
    ) -> Result<Vec<Registration>, StoreError> {
        let rows = registrations::Entity::find()
            .filter(registrations::Column::TournamentId.eq(tournament_id.clone()))
            .order_by_desc(registrations::Column::Diamonds)
            .order_by_asc(registrations::Column::PrincipalId)
            .limit(limit)
            .all(&self.txn)
            .await
            .map_err(classify)?;
        rows.into_iter().map(registration_from_model).collect()
    }

    async fn registrations_with_min_diamonds(
        &mut self,
        tournament_id: &TournamentId,
        min_diamonds: i64,
    ) -> Result<Vec<Registration>, StoreError> {
        let rows = registrations::Entity::find()
            .filter(registrations::Column::TournamentId.eq(tournament_id.clone()))
            .filter(registrations::Column::Diamonds.gte(min_diamonds))
            .order_by_desc(registrations::Column::Diamonds)
            .order_by_asc(registrations::Column::PrincipalId)
            .all(&self.txn)
            .await
            .map_err(classify)?;
        rows.into_iter().map(registration_from_model).collect()
    }

    async fn load_video(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
    ) -> Result<Option<Video>, StoreError> {
        let record = videos::Entity::find_by_id((tournament_id.clone(), video_id.clone()))
            .one(&self.txn)
            .await
            .map_err(classify)?;
        record.map(video_from_model).transpose()
    }

    async fn insert_video(&mut self, video: Video) -> Result<(), StoreError> {
        let model = videos::ActiveModel {
            tournament_id: Set(video.tournament_id),
            video_id: Set(video.video_id),
            ai_verdict: Set(video.ai_verdict.map(|v| v.as_str().to_string())),
            candidates: Set(to_json(&video.candidates)?),
            top_pick: Set(video.top_pick),
            created_at: Set(video.created_at),
        };
        videos::Entity::insert(model)
            .exec(&self.txn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn load_vote(&mut self, key: &VoteKey) -> Result<Option<Vote>, StoreError> {
        let record = votes::Entity::find_by_id((
            key.tournament_id.clone(),
            key.principal_id.clone(),
            key.video_id.clone(),
        ))
        .one(&self.txn)
        .await
        .map_err(classify)?;
        Ok(record.map(vote_from_model))
    }

    async fn insert_vote(&mut self, vote: Vote) -> Result<(), StoreError> {
        votes::Entity::insert(vote_to_active(vote))
            .exec(&self.txn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn update_vote(&mut self, vote: Vote) -> Result<(), StoreError> {
        match vote_to_active(vote).update(&self.txn).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => Err(StoreError::NotFound("vote")),
            Err(err) => Err(classify(err)),
        }
    }

    async fn load_tally(
        &mut self,
        tournament_id: &TournamentId,
        video_id: &VideoId,
    ) -> Result<Vec<TallyShard>, StoreError> {
        let rows = tally_shards::Entity::find()
            .filter(tally_shards::Column::TournamentId.eq(tournament_id.clone()))
            .filter(tally_shards::Column::VideoId.eq(video_id.clone()))
            .all(&self.txn)
            .await
            .map_err(classify)?;
        let mut shards: BTreeMap<u32, ShardCounts> = BTreeMap::new();
        for row in rows {
            let index = u32::try_from(row.shard_index)
                .map_err(|_| StoreError::corrupt("negative shard index"))?;
            shards
                .entry(index)
                .or_default()
                .insert(row.option_id, row.count);
        }
        Ok(shards
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
        let mut models = Vec::new();
        for shard in shards {
            let shard_index = i32::try_from(shard.index)
                .map_err(|_| StoreError::corrupt("shard index overflow"))?;
            for (option_id, count) in shard.counts {
                models.push(tally_shards::ActiveModel {
                    tournament_id: Set(tournament_id.clone()),
                    video_id: Set(video_id.clone()),
                    shard_index: Set(shard_index),
                    option_id: Set(option_id),
                    count: Set(count),
                });
            }
        }
        if models.is_empty() {
            return Ok(());
        }
        tally_shards::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    tally_shards::Column::TournamentId,
                    tally_shards::Column::VideoId,
                    tally_shards::Column::ShardIndex,
                    tally_shards::Column::OptionId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .do_nothing()
            .exec(&self.txn)
            .await
            .map_err(classify)?;
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
        let shard_index =
            i32::try_from(shard).map_err(|_| StoreError::corrupt("shard index overflow"))?;
        let model = tally_shards::ActiveModel {
            tournament_id: Set(tournament_id.clone()),
            video_id: Set(video_id.clone()),
            shard_index: Set(shard_index),
            option_id: Set(option_id.to_string()),
            count: Set(by),
        };
        tally_shards::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    tally_shards::Column::TournamentId,
                    tally_shards::Column::VideoId,
                    tally_shards::Column::ShardIndex,
                    tally_shards::Column::OptionId,
                ])
                .value(
                    tally_shards::Column::Count,
                    Expr::col((tally_shards::Entity, tally_shards::Column::Count)).add(by),
                )
                .to_owned(),
            )
            .exec(&self.txn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn load_balance(
        &mut self,
        principal_id: &PrincipalId,
    ) -> Result<Option<UserBalance>, StoreError> {
        let record = user_balances::Entity::find_by_id(principal_id.clone())
            .one(&self.txn)
            .await
            .map_err(classify)?;
        Ok(record.map(|model| UserBalance {
            principal_id: model.principal_id,
            balance: model.balance,
            updated_at: model.updated_at,
        }))
    }

    async fn store_balance(&mut self, balance: UserBalance) -> Result<(), StoreError> {
        let model = user_balances::ActiveModel {
            principal_id: Set(balance.principal_id),
            balance: Set(balance.balance),
            updated_at: Set(balance.updated_at),
        };
        user_balances::Entity::insert(model)
            .on_conflict(
                OnConflict::column(user_balances::Column::PrincipalId)
                    .update_columns([
                        user_balances::Column::Balance,
                        user_balances::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.txn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn append_ledger_entry(&mut self, entry: LedgerEntry) -> Result<(), StoreError> {
        let model = ledger_transactions::ActiveModel {
            id: Set(entry.id),
            principal_id: Set(entry.principal_id),
            delta: Set(entry.delta),
            reason: Set(entry.reason.as_str().to_string()),
            tournament_id: Set(entry.tournament_id),
            video_id: Set(entry.video_id),
            at: Set(entry.at),
        };
        ledger_transactions::Entity::insert(model)
            .exec(&self.txn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn ledger_entries(
        &mut self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = ledger_transactions::Entity::find()
            .filter(ledger_transactions::Column::PrincipalId.eq(principal_id.clone()))
            .order_by_asc(ledger_transactions::Column::At)
            .all(&self.txn)
            .await
            .map_err(classify)?;
        rows.into_iter()
            .map(|model| {
                let reason = LedgerReason::parse(&model.reason).ok_or_else(|| {
                    StoreError::corrupt(format!("unknown ledger reason {}", model.reason))
                })?;
                Ok(LedgerEntry {
                    id: model.id,
                    principal_id: model.principal_id,
                    delta: model.delta,
                    reason,
                    tournament_id: model.tournament_id,
                    video_id: model.video_id,
                    at: model.at,
                })
            })
            .collect()
    }

    async fn append_reward_event(&mut self, event: RewardEvent) -> Result<(), StoreError> {
        let model = reward_events::ActiveModel {
            id: Set(event.id),
            tournament_id: Set(event.tournament_id),
            principal_id: Set(event.principal_id),
            position: Set(i32::try_from(event.position)
                .map_err(|_| StoreError::corrupt("position overflow"))?),
            prize_amount: Set(u64_to_i64(event.prize_amount)?),
            payout_amount: Set(u64_to_i64(event.payout_amount)?),
            payout_currency: Set(event.payout_currency),
            rate: Set(event.rate),
            at: Set(event.at),
        };
        reward_events::Entity::insert(model)
            .exec(&self.txn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn reward_events(
        &mut self,
        tournament_id: &TournamentId,
    ) -> Result<Vec<RewardEvent>, StoreError> {
        let rows = reward_events::Entity::find()
            .filter(reward_events::Column::TournamentId.eq(tournament_id.clone()))
            .order_by_asc(reward_events::Column::Position)
            .all(&self.txn)
            .await
            .map_err(classify)?;
        rows.into_iter()
            .map(|model| {
                Ok(RewardEvent {
                    id: model.id,
                    tournament_id: model.tournament_id,
                    principal_id: model.principal_id,
                    position: i32_to_u32(model.position)?,
                    prize_amount: i64_to_u64(model.prize_amount)?,
                    payout_amount: i64_to_u64(model.payout_amount)?,
                    payout_currency: model.payout_currency,
                    rate: model.rate,
                    at: model.at,
                })
            })
            .collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) {
        let _ = self.txn.rollback().await;
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|err| StoreError::corrupt(err.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|err| StoreError::corrupt(err.to_string()))
}

fn u64_to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::corrupt("amount exceeds database range"))
}

fn i64_to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::corrupt("negative amount"))
}

fn i32_to_u32(value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::corrupt("negative position"))
}

fn status_to_db(status: TournamentStatus) -> DbTournamentStatus {
    match status {
        TournamentStatus::Scheduled => DbTournamentStatus::Scheduled,
        TournamentStatus::Live => DbTournamentStatus::Live,
        TournamentStatus::Ended => DbTournamentStatus::Ended,
        TournamentStatus::Settled => DbTournamentStatus::Settled,
        TournamentStatus::Cancelled => DbTournamentStatus::Cancelled,
    }
}

fn status_from_db(status: DbTournamentStatus) -> TournamentStatus {
    match status {
        DbTournamentStatus::Scheduled => TournamentStatus::Scheduled,
        DbTournamentStatus::Live => TournamentStatus::Live,
        DbTournamentStatus::Ended => TournamentStatus::Ended,
        DbTournamentStatus::Settled => TournamentStatus::Settled,
        DbTournamentStatus::Cancelled => TournamentStatus::Cancelled,
    }
}

fn kind_to_db(kind: TournamentKind) -> DbTournamentKind {
    match kind {
        TournamentKind::Smiley => DbTournamentKind::Smiley,
        TournamentKind::HotOrNot => DbTournamentKind::HotOrNot,
    }
}

fn kind_from_db(kind: DbTournamentKind) -> TournamentKind {
    match kind {
        DbTournamentKind::Smiley => TournamentKind::Smiley,
        DbTournamentKind::HotOrNot => TournamentKind::HotOrNot,
    }
}

fn registration_status_to_db(status: RegistrationStatus) -> DbRegistrationStatus {
    match status {
        RegistrationStatus::Registered => DbRegistrationStatus::Registered,
        RegistrationStatus::Refunded => DbRegistrationStatus::Refunded,
        RegistrationStatus::Rewarded => DbRegistrationStatus::Rewarded,
    }
}

fn registration_status_from_db(status: DbRegistrationStatus) -> RegistrationStatus {
    match status {
        DbRegistrationStatus::Registered => RegistrationStatus::Registered,
        DbRegistrationStatus::Refunded => RegistrationStatus::Refunded,
        DbRegistrationStatus::Rewarded => RegistrationStatus::Rewarded,
    }
}

fn tournament_from_model(model: tournaments::Model) -> Result<Tournament, StoreError> {
    Ok(Tournament {
        id: model.id,
        title: model.title,
        kind: kind_from_db(model.kind),
        date: model.date,
        start_epoch_ms: model.start_epoch_ms,
        end_epoch_ms: model.end_epoch_ms,
        entry_cost: model.entry_cost,
        total_prize_pool: i64_to_u64(model.total_prize_pool)?,
        prize_map: from_json(model.prize_map)?,
        status: status_from_db(model.status),
        participant_count: model.participant_count,
        settlement_result: model.settlement_result.map(from_json).transpose()?,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn registration_from_model(model: registrations::Model) -> Result<Registration, StoreError> {
    Ok(Registration {
        tournament_id: model.tournament_id,
        principal_id: model.principal_id,
        coins_paid: model.coins_paid,
        diamonds: model.diamonds,
        wins: model.wins,
        losses: model.losses,
        status: registration_status_from_db(model.status),
        registered_at: model.registered_at,
        updated_at: model.updated_at,
        payout_claimed_at: model.payout_claimed_at,
        payout_attempted_at: model.payout_attempted_at,
        prize_position: model.prize_position.map(i32_to_u32).transpose()?,
        prize_amount: model.prize_amount.map(i64_to_u64).transpose()?,
        payout_amount: model.payout_amount.map(i64_to_u64).transpose()?,
        prize_sent_at: model.prize_sent_at,
        refunded_at: model.refunded_at,
    })
}

fn registration_to_active(reg: Registration) -> Result<registrations::ActiveModel, StoreError> {
    Ok(registrations::ActiveModel {
        tournament_id: Set(reg.tournament_id),
        principal_id: Set(reg.principal_id),
        coins_paid: Set(reg.coins_paid),
        diamonds: Set(reg.diamonds),
        wins: Set(reg.wins),
        losses: Set(reg.losses),
        status: Set(registration_status_to_db(reg.status)),
        registered_at: Set(reg.registered_at),
        updated_at: Set(reg.updated_at),
        payout_claimed_at: Set(reg.payout_claimed_at),
        payout_attempted_at: Set(reg.payout_attempted_at),
        prize_position: Set(reg
            .prize_position
            .map(|p| i32::try_from(p).map_err(|_| StoreError::corrupt("position overflow")))
            .transpose()?),
        prize_amount: Set(reg.prize_amount.map(u64_to_i64).transpose()?),
        payout_amount: Set(reg.payout_amount.map(u64_to_i64).transpose()?),
        prize_sent_at: Set(reg.prize_sent_at),
        refunded_at: Set(reg.refunded_at),
    })
}

fn video_from_model(model: videos::Model) -> Result<Video, StoreError> {
    Ok(Video {
        tournament_id: model.tournament_id,
        video_id: model.video_id,
        ai_verdict: model.ai_verdict.as_deref().and_then(Verdict::parse),
        candidates: from_json(model.candidates)?,
        top_pick: model.top_pick,
        created_at: model.created_at,
    })
}

fn vote_from_model(model: votes::Model) -> Vote {
    Vote {
        tournament_id: model.tournament_id,
        principal_id: model.principal_id,
        video_id: model.video_id,
        option_id: model.option_id,
        outcome: model.outcome.map(|outcome| match outcome {
            DbVoteOutcome::Win => Outcome::Win,
            DbVoteOutcome::Loss => Outcome::Loss,
        }),
        at: model.at,
    }
}

fn vote_to_active(vote: Vote) -> votes::ActiveModel {
    votes::ActiveModel {
        tournament_id: Set(vote.tournament_id),
        principal_id: Set(vote.principal_id),
        video_id: Set(vote.video_id),
        option_id: Set(vote.option_id),
        outcome: Set(vote.outcome.map(|outcome| match outcome {
            Outcome::Win => DbVoteOutcome::Win,
            Outcome::Loss => DbVoteOutcome::Loss,
        })),
        at: Set(vote.at),
    }
}
