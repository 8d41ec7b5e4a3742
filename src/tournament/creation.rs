use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::upstream::{analyze_batch, TransitionTask, VideoAnalysis};

use super::error::TournamentError;
use super::query::local_date;
use super::retry::retry_on_conflict;
use super::service::{finish, release, TournamentService};
use super::status::TournamentStatus;
use super::storage::StoreError;
use super::types::{
    Coins, PrizeMap, Tournament, TournamentId, TournamentKind, Verdict, Video, VideoId,
};

const LOG_TARGET: &str = "tournament::creation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTournament {
    /// Derived from date, window and kind when absent.
    #[serde(default)]
    pub id: Option<TournamentId>,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: TournamentKind,
    /// Defaults to the listing-zone date of the start time.
    #[serde(default)]
    pub date: Option<String>,
    pub start_epoch_ms: i64,
    pub end_epoch_ms: i64,
    pub entry_cost: Coins,
    pub prize_map: PrizeMap,
    #[serde(default)]
    pub total_prize_pool: Option<u64>,
    pub video_ids: Vec<VideoId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedTournament {
    pub tournament: Tournament,
    pub video_count: usize,
    /// Videos whose analysis failed and got a fallback.
    pub fallback_count: usize,
    pub scheduled: bool,
}

/// Id of a tournament: `<date>-<start>-<end>-<kind>`.
pub fn derive_tournament_id(
    date: &str,
    start_epoch_ms: i64,
    end_epoch_ms: i64,
    kind: TournamentKind,
) -> TournamentId {
    format!("{date}-{start_epoch_ms}-{end_epoch_ms}-{}", kind.as_str())
}

fn validate(request: &CreateTournament) -> Result<Vec<VideoId>, TournamentError> {
    if request.title.trim().is_empty() {
        return Err(TournamentError::validation("MISSING_TITLE", "title required"));
    }
    if request.start_epoch_ms >= request.end_epoch_ms {
        return Err(TournamentError::validation(
            "INVALID_WINDOW",
            "start_epoch_ms must be before end_epoch_ms",
        ));
    }
    if request.entry_cost < 0 {
        return Err(TournamentError::validation(
            "INVALID_ENTRY_COST",
            "entry_cost must not be negative",
        ));
    }
    if request.prize_map.contains_key(&0) {
        return Err(TournamentError::validation(
            "INVALID_PRIZE_MAP",
            "prize positions start at 1",
        ));
    }
    let mut seen = BTreeSet::new();
    let videos: Vec<VideoId> = request
        .video_ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect();
    if videos.is_empty() {
        return Err(TournamentError::validation(
            "MISSING_VIDEOS",
            "at least one video is required",
        ));
    }
    Ok(videos)
}

impl TournamentService {
    /// Creates a tournament with analysed videos and schedules its transitions.
    pub async fn create(
        &self,
        request: CreateTournament,
    ) -> Result<CreatedTournament, TournamentError> {
        let video_ids = validate(&request)?;
        let date = match &request.date {
            Some(date) if !date.trim().is_empty() => date.trim().to_string(),
            _ => local_date(request.start_epoch_ms, self.config.listing_utc_offset_minutes),
        };
        let id = request
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| {
                derive_tournament_id(
                    &date,
                    request.start_epoch_ms,
                    request.end_epoch_ms,
                    request.kind,
                )
            });

        let mut txn = self.begin().await?;
        let existing = txn.load_tournament(&id).await.map_err(TournamentError::from);
        if release(txn, existing).await?.is_some() {
            return Err(TournamentError::TournamentExists(id));
        }

        let analyses = analyze_batch(
            self.upstreams.video.as_ref(),
            request.kind,
            &video_ids,
            self.config.oracle_concurrency,
        )
        .await;
        let mut fallback_count = 0;
        let analyses: Vec<VideoAnalysis> = analyses
            .into_iter()
            .map(|(video_id, result)| match result {
                Ok(analysis) => analysis,
                Err(_) => {
                    fallback_count += 1;
                    self.fallback_analysis(request.kind, video_id)
                }
            })
            .collect();

        let now = self.clock.now();
        let tournament = Tournament {
            id: id.clone(),
            title: request.title.trim().to_string(),
            kind: request.kind,
            date,
            start_epoch_ms: request.start_epoch_ms,
            end_epoch_ms: request.end_epoch_ms,
            entry_cost: request.entry_cost,
            total_prize_pool: request
                .total_prize_pool
                .unwrap_or_else(|| request.prize_map.values().sum()),
            prize_map: request.prize_map.clone(),
            status: TournamentStatus::Scheduled,
            participant_count: 0,
            settlement_result: None,
            created_at: now,
            updated_at: now,
        };
        let videos: Vec<Video> = analyses
            .into_iter()
            .map(|analysis| Video {
                tournament_id: id.clone(),
                video_id: analysis.video_id,
                ai_verdict: analysis.verdict,
                candidates: analysis.candidates,
                top_pick: analysis.top_pick,
                created_at: now,
            })
            .collect();

        let stored = (&tournament, &videos);
        retry_on_conflict(&self.config.retry, "create", || async move {
            let (tournament, videos) = stored;
            let mut txn = self.begin().await?;
            let result = async {
                txn.insert_tournament(tournament.clone())
                    .await
                    .map_err(|err| match err {
                        StoreError::AlreadyExists(_) => {
                            TournamentError::TournamentExists(tournament.id.clone())
                        }
                        other => TournamentError::Store(other),
                    })?;
                for video in videos {
                    txn.insert_video(video.clone()).await?;
                }
                Ok(())
            }
            .await;
            finish(txn, result).await
        })
        .await?;

        let scheduled = self.schedule_transitions(&tournament).await;
        info!(
            target: LOG_TARGET,
            tournament_id = %tournament.id,
            kind = tournament.kind.as_str(),
            videos = videos.len(),
            fallback_count,
            scheduled,
            "tournament created"
        );

        Ok(CreatedTournament {
            tournament,
            video_count: videos.len(),
            fallback_count,
            scheduled,
        })
    }

    fn fallback_analysis(&self, kind: TournamentKind, video_id: VideoId) -> VideoAnalysis {
        match kind {
            TournamentKind::HotOrNot => {
                let verdict = if self.with_rng(|rng| rng.gen_bool(0.5)) {
                    Verdict::Hot
                } else {
                    Verdict::Not
                };
                VideoAnalysis {
                    verdict: Some(verdict),
                    ..VideoAnalysis::empty(video_id)
                }
            }
            TournamentKind::Smiley => VideoAnalysis::empty(video_id),
        }
    }

    /// Queues the live and ended transitions. Failures are logged only.
    async fn schedule_transitions(&self, tournament: &Tournament) -> bool {
        let tasks = [
            (TournamentStatus::Live, tournament.start_epoch_ms),
            (TournamentStatus::Ended, tournament.end_epoch_ms),
        ];
        let mut all_scheduled = true;
        for (status, run_at_ms) in tasks {
            let task = TransitionTask {
                tournament_id: tournament.id.clone(),
                status,
                run_at_ms,
            };
            if let Err(err) = self.upstreams.dispatcher.schedule(task).await {
                all_scheduled = false;
                warn!(
                    target: LOG_TARGET,
                    tournament_id = %tournament.id,
                    status = %status,
                    error = %err,
                    "failed to schedule transition"
                );
            }
        }
        all_scheduled
    }
}
