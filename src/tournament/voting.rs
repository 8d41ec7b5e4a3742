use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OptionDef;

use super::error::TournamentError;
use super::leaderboard::{position_of, top_n};
use super::retry::retry_on_conflict;
use super::service::{finish, release, require_id, TournamentService};
use super::status::TournamentStatus;
use super::storage::TournamentStorageTxn;
use super::tally::{aggregate, choose_shard, determine_outcome, seed_shards};
use super::types::{
    Diamonds, OptionId, Outcome, PrincipalId, Registration, ShardCounts, Tournament,
    TournamentId, TournamentKind, Verdict, Video, VideoId, Vote, VoteKey,
};

const LOG_TARGET: &str = "tournament::voting";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub video_id: VideoId,
    /// Emoji id in smiley tournaments, `hot`/`not` in hot-or-not ones.
    pub option_id: OptionId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteOutcome {
    pub outcome: Outcome,
    pub diamonds: Diamonds,
    pub diamond_delta: Diamonds,
    pub wins: i64,
    pub losses: i64,
    pub position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<OptionDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_verdict: Option<Verdict>,
}

/// Shared gate of both voting modes: live tournament, registered voter with
/// diamonds left, first vote on this video.
async fn check_voter(
    txn: &mut (dyn TournamentStorageTxn + Send),
    key: &VoteKey,
    now_ms: i64,
) -> Result<(Tournament, Registration), TournamentError> {
    let tournament = txn
        .load_tournament(&key.tournament_id)
        .await?
        .ok_or_else(|| TournamentError::TournamentNotFound(key.tournament_id.clone()))?;
    let status = tournament.effective_status(now_ms);
    if status != TournamentStatus::Live {
        return Err(TournamentError::TournamentNotLive(status));
    }
    let registration = txn
        .load_registration(&key.tournament_id, &key.principal_id)
        .await?
        .ok_or(TournamentError::NotRegistered)?;
    if registration.diamonds <= 0 {
        return Err(TournamentError::NoDiamonds);
    }
    if txn.load_vote(key).await?.is_some() {
        return Err(TournamentError::DuplicateVote);
    }
    Ok((tournament, registration))
}

/// Applies an outcome to the voter's stats. Diamonds never drop below zero.
fn apply_outcome(registration: &mut Registration, outcome: Outcome, at: chrono::DateTime<chrono::Utc>) {
    match outcome {
        Outcome::Win => {
            registration.wins += 1;
            registration.diamonds += 1;
        }
        Outcome::Loss => {
            registration.losses += 1;
            registration.diamonds = (registration.diamonds - 1).max(0);
        }
    }
    registration.updated_at = Some(at);
}

impl TournamentService {
    pub async fn vote(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
        request: VoteRequest,
    ) -> Result<VoteOutcome, TournamentError> {
        require_id("MISSING_TOURNAMENT_ID", "tournament_id", tournament_id)?;
        require_id("MISSING_PRINCIPAL_ID", "principal_id", principal_id)?;
        require_id("MISSING_VIDEO_ID", "video_id", &request.video_id)?;
        require_id("MISSING_OPTION_ID", "option_id", &request.option_id)?;

        let kind = {
            let mut txn = self.begin().await?;
            let loaded = txn.load_tournament(tournament_id).await.map_err(TournamentError::from);
            let tournament = release(txn, loaded)
                .await?
                .ok_or_else(|| TournamentError::TournamentNotFound(tournament_id.clone()))?;
            tournament.kind
        };

        let key = VoteKey::new(
            tournament_id.clone(),
            principal_id.clone(),
            request.video_id.trim(),
        );
        let option_id = request.option_id.trim();
        let (outcome, registration, option, ai_verdict) = match kind {
            TournamentKind::Smiley => {
                let (outcome, registration, option) = self.vote_majority(&key, option_id).await?;
                (outcome, registration, Some(option), None)
            }
            TournamentKind::HotOrNot => {
                let (outcome, registration, verdict) = self.vote_against_ai(&key, option_id).await?;
                (outcome, registration, None, Some(verdict))
            }
        };

        let position = self.position_after_vote(tournament_id, principal_id).await?;
        info!(
            target: LOG_TARGET,
            tournament_id = %tournament_id,
            principal_id = %principal_id,
            video_id = %key.video_id,
            outcome = outcome.as_str(),
            diamonds = registration.diamonds,
            position,
            "vote recorded"
        );

        Ok(VoteOutcome {
            outcome,
            diamonds: registration.diamonds,
            diamond_delta: outcome.diamond_delta(),
            wins: registration.wins,
            losses: registration.losses,
            position,
            option,
            ai_verdict,
        })
    }

    /// Smiley mode: record the vote and bump one shard in one transaction,
    /// aggregate outside it, then apply the outcome in a second transaction.
    async fn vote_majority(
        &self,
        key: &VoteKey,
        option_id: &str,
    ) -> Result<(Outcome, Registration, OptionDef), TournamentError> {
        let option = self
            .config
            .active_option(option_id)
            .cloned()
            .ok_or_else(|| {
                TournamentError::validation(
                    "OPTION_NOT_ALLOWED",
                    format!("option {option_id:?} is not allowed"),
                )
            })?;

        retry_on_conflict(&self.config.retry, "vote.record", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                let now = self.clock.now();
                check_voter(txn.as_mut(), key, now.timestamp_millis()).await?;
                self.ensure_tally(txn.as_mut(), key, now).await?;
                txn.insert_vote(Vote {
                    tournament_id: key.tournament_id.clone(),
                    principal_id: key.principal_id.clone(),
                    video_id: key.video_id.clone(),
                    option_id: option_id.to_string(),
                    outcome: None,
                    at: now,
                })
                .await?;
                let shard = self.with_rng(|rng| choose_shard(self.config.shard_count, rng));
                txn.increment_tally(&key.tournament_id, &key.video_id, shard, option_id, 1)
                    .await?;
                Ok(())
            }
            .await;
            finish(txn, result).await
        })
        .await?;

        let totals = self.video_totals(key).await?;
        let outcome = determine_outcome(option_id, &totals);
        debug!(
            target: LOG_TARGET,
            video_id = %key.video_id,
            option_id,
            chosen = totals.get(option_id).copied().unwrap_or(0),
            outcome = outcome.as_str(),
            "majority outcome"
        );

        let registration = self.record_outcome(key, outcome).await?;
        Ok((outcome, registration, option))
    }

    /// Hot-or-not mode: compare against the stored AI verdict in one transaction.
    async fn vote_against_ai(
        &self,
        key: &VoteKey,
        choice: &str,
    ) -> Result<(Outcome, Registration, Verdict), TournamentError> {
        let choice = Verdict::parse(choice).ok_or_else(|| {
            TournamentError::validation("INVALID_VOTE", "vote must be \"hot\" or \"not\"")
        })?;

        retry_on_conflict(&self.config.retry, "vote.ai", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                let now = self.clock.now();
                let (_, mut registration) =
                    check_voter(txn.as_mut(), key, now.timestamp_millis()).await?;
                let video = txn
                    .load_video(&key.tournament_id, &key.video_id)
                    .await?
                    .ok_or_else(|| TournamentError::VideoNotFound(key.video_id.clone()))?;
                let verdict = video.ai_verdict.ok_or_else(|| {
                    TournamentError::internal(format!(
                        "video {} has no ai verdict",
                        key.video_id
                    ))
                })?;
                let outcome = if choice == verdict {
                    Outcome::Win
                } else {
                    Outcome::Loss
                };

                txn.insert_vote(Vote {
                    tournament_id: key.tournament_id.clone(),
                    principal_id: key.principal_id.clone(),
                    video_id: key.video_id.clone(),
                    option_id: choice.as_str().to_string(),
                    outcome: Some(outcome),
                    at: now,
                })
                .await?;
                apply_outcome(&mut registration, outcome, now);
                txn.update_registration(registration.clone()).await?;
                Ok((outcome, registration, verdict))
            }
            .await;
            finish(txn, result).await
        })
        .await
    }

    /// Lazily creates the video and seeds its shards on the first vote.
    async fn ensure_tally(
        &self,
        txn: &mut (dyn TournamentStorageTxn + Send),
        key: &VoteKey,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), TournamentError> {
        if !txn
            .load_tally(&key.tournament_id, &key.video_id)
            .await?
            .is_empty()
        {
            return Ok(());
        }

        let video = match txn.load_video(&key.tournament_id, &key.video_id).await? {
            Some(video) => video,
            None => {
                let video = Video {
                    tournament_id: key.tournament_id.clone(),
                    video_id: key.video_id.clone(),
                    ai_verdict: None,
                    candidates: Vec::new(),
                    top_pick: None,
                    created_at: now,
                };
                txn.insert_video(video.clone()).await?;
                video
            }
        };

        let catalog: Vec<OptionId> = self.config.options.iter().map(|o| o.id.clone()).collect();
        let active: Vec<OptionId> = self
            .config
            .options
            .iter()
            .filter(|o| o.is_active)
            .map(|o| o.id.clone())
            .collect();
        let pool = if video.candidates.is_empty() {
            &active
        } else {
            &video.candidates
        };
        let mut universe = catalog;
        for candidate in &video.candidates {
            if !universe.contains(candidate) {
                universe.push(candidate.clone());
            }
        }

        let shards = self.with_rng(|rng| {
            seed_shards(
                &universe,
                pool,
                &self.config.seed_excluded,
                self.config.seed_option_count,
                self.config.seed_vote_count,
                self.config.shard_count,
                rng,
            )
        });
        debug!(
            target: LOG_TARGET,
            tournament_id = %key.tournament_id,
            video_id = %key.video_id,
            shards = shards.len(),
            "initialized tally"
        );
        txn.init_tally(&key.tournament_id, &key.video_id, shards)
            .await?;
        Ok(())
    }

    async fn video_totals(&self, key: &VoteKey) -> Result<ShardCounts, TournamentError> {
        let mut txn = self.begin().await?;
        let shards = txn
            .load_tally(&key.tournament_id, &key.video_id)
            .await
            .map_err(TournamentError::from);
        let shards = release(txn, shards).await?;
        Ok(aggregate(&shards))
    }

    async fn record_outcome(
        &self,
        key: &VoteKey,
        outcome: Outcome,
    ) -> Result<Registration, TournamentError> {
        retry_on_conflict(&self.config.retry, "vote.outcome", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                let now = self.clock.now();
                let mut vote = txn
                    .load_vote(key)
                    .await?
                    .ok_or_else(|| TournamentError::internal("vote vanished before outcome"))?;
                vote.outcome = Some(outcome);
                txn.update_vote(vote).await?;

                let mut registration = txn
                    .load_registration(&key.tournament_id, &key.principal_id)
                    .await?
                    .ok_or(TournamentError::NotRegistered)?;
                apply_outcome(&mut registration, outcome, now);
                txn.update_registration(registration.clone()).await?;
                Ok(registration)
            }
            .await;
            finish(txn, result).await
        })
        .await
    }

    async fn position_after_vote(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<u32, TournamentError> {
        let mut txn = self.begin().await?;
        let result = async {
            let top = top_n(
                txn.as_mut(),
                tournament_id,
                self.config.leaderboard_top,
                self.config.overfetch_factor,
            )
            .await?;
            let row = position_of(
                txn.as_mut(),
                tournament_id,
                principal_id,
                &top,
            )
            .await?;
            Ok(row.map(|row| row.position).unwrap_or(0))
        }
        .await;
        release(txn, result).await
    }
}
