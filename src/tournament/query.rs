use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use super::error::TournamentError;
use super::leaderboard::{position_of, top_n, LeaderboardRow};
use super::service::{release, TournamentService};
use super::status::TournamentStatus;
use super::storage::TournamentFilter;
use super::types::{
    Coins, Diamonds, PrincipalId, PrizeMap, Registration, RegistrationStatus, Tournament,
    TournamentId, TournamentKind,
};

/// Calendar date (`YYYY-MM-DD`) of `epoch_ms` in a fixed UTC offset.
pub fn local_date(epoch_ms: i64, offset_minutes: i32) -> String {
    let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix());
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .unwrap_or_default()
        .with_timezone(&offset)
        .format("%Y-%m-%d")
        .to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub status: Option<TournamentStatus>,
    #[serde(default, rename = "type")]
    pub kind: Option<TournamentKind>,
    #[serde(default)]
    pub principal_id: Option<PrincipalId>,
    #[serde(default)]
    pub tournament_id: Option<TournamentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub diamonds: Diamonds,
    pub wins: i64,
    pub losses: i64,
    pub status: RegistrationStatus,
}

impl From<&Registration> for UserStats {
    fn from(registration: &Registration) -> Self {
        Self {
            diamonds: registration.diamonds,
            wins: registration.wins,
            losses: registration.losses,
            status: registration.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentSummary {
    pub id: TournamentId,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: TournamentKind,
    pub date: String,
    pub start_epoch_ms: i64,
    pub end_epoch_ms: i64,
    pub entry_cost: Coins,
    pub total_prize_pool: u64,
    pub prize_map: PrizeMap,
    pub status: TournamentStatus,
    pub participant_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_left_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_registered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_stats: Option<UserStats>,
}

fn time_left(tournament: &Tournament, status: TournamentStatus, now_ms: i64) -> Option<i64> {
    (status == TournamentStatus::Live).then(|| (tournament.end_epoch_ms - now_ms).max(0))
}

fn summarize(
    tournament: Tournament,
    now_ms: i64,
    registration: Option<Option<&Registration>>,
) -> TournamentSummary {
    let status = tournament.effective_status(now_ms);
    TournamentSummary {
        time_left_ms: time_left(&tournament, status, now_ms),
        is_registered: registration.map(|r| r.is_some()),
        user_stats: registration.flatten().map(UserStats::from),
        id: tournament.id,
        title: tournament.title,
        kind: tournament.kind,
        date: tournament.date,
        start_epoch_ms: tournament.start_epoch_ms,
        end_epoch_ms: tournament.end_epoch_ms,
        entry_cost: tournament.entry_cost,
        total_prize_pool: tournament.total_prize_pool,
        prize_map: tournament.prize_map,
        status,
        participant_count: tournament.participant_count,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TournamentStatusView {
    pub tournament_id: TournamentId,
    pub status: TournamentStatus,
    pub participant_count: i64,
    pub start_epoch_ms: i64,
    pub end_epoch_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_left_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    #[serde(flatten)]
    pub row: LeaderboardRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prize: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardView {
    pub tournament_id: TournamentId,
    pub status: TournamentStatus,
    pub prize_currency: String,
    pub rows: Vec<LeaderboardEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<LeaderboardEntry>,
}

impl TournamentService {
    fn today(&self) -> String {
        local_date(self.clock.now_ms(), self.config.listing_utc_offset_minutes)
    }

    pub async fn list(&self, query: ListQuery) -> Result<Vec<TournamentSummary>, TournamentError> {
        let now_ms = self.clock.now_ms();
        let principal = query
            .principal_id
            .as_ref()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let mut txn = self.begin().await?;
        let result = async {
            let tournaments = match query.tournament_id.as_ref().filter(|id| !id.is_empty()) {
                Some(id) => txn.load_tournament(id).await?.into_iter().collect(),
                None => {
                    let filter = TournamentFilter {
                        date: Some(query.date.clone().unwrap_or_else(|| self.today())),
                        kind: query.kind,
                        ..TournamentFilter::default()
                    };
                    txn.list_tournaments(&filter).await?
                }
            };

            let mut registrations = HashMap::new();
            if let Some(principal) = &principal {
                for tournament in &tournaments {
                    if let Some(registration) =
                        txn.load_registration(&tournament.id, principal).await?
                    {
                        registrations.insert(tournament.id.clone(), registration);
                    }
                }
            }
            Ok::<_, TournamentError>((tournaments, registrations))
        }
        .await;
        let (tournaments, registrations): (Vec<Tournament>, HashMap<TournamentId, Registration>) =
            release(txn, result).await?;

        let mut summaries: Vec<TournamentSummary> = tournaments
            .into_iter()
            .filter(|t| query.kind.map_or(true, |kind| t.kind == kind))
            .map(|tournament| {
                let registration = principal
                    .as_ref()
                    .map(|_| registrations.get(&tournament.id));
                summarize(tournament, now_ms, registration)
            })
            .filter(|summary| query.status.map_or(true, |status| summary.status == status))
            .collect();
        summaries.sort_by(|a, b| {
            a.status
                .list_priority()
                .cmp(&b.status.list_priority())
                .then(a.start_epoch_ms.cmp(&b.start_epoch_ms))
        });
        Ok(summaries)
    }

    pub async fn status(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<TournamentStatusView, TournamentError> {
        let tournament = self.load_tournament(tournament_id).await?;
        let now_ms = self.clock.now_ms();
        let status = tournament.effective_status(now_ms);
        Ok(TournamentStatusView {
            time_left_ms: time_left(&tournament, status, now_ms),
            tournament_id: tournament.id,
            status,
            participant_count: tournament.participant_count,
            start_epoch_ms: tournament.start_epoch_ms,
            end_epoch_ms: tournament.end_epoch_ms,
        })
    }

    /// Recent tournaments the user registered for and played in, newest first.
    pub async fn my_tournaments(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<TournamentSummary>, TournamentError> {
        super::service::require_id("MISSING_PRINCIPAL_ID", "principal_id", principal_id)?;
        let now = self.clock.now();
        let date_from = local_date(
            (now - Duration::days(self.config.my_tournaments_window_days)).timestamp_millis(),
            self.config.listing_utc_offset_minutes,
        );

        let mut txn = self.begin().await?;
        let result = async {
            let tournaments = txn
                .list_tournaments(&TournamentFilter {
                    date_from: Some(date_from),
                    ..TournamentFilter::default()
                })
                .await?;
            let mut played = Vec::new();
            for tournament in tournaments {
                if let Some(registration) =
                    txn.load_registration(&tournament.id, principal_id).await?
                {
                    if registration.has_played() {
                        played.push((tournament, registration));
                    }
                }
            }
            Ok::<_, TournamentError>(played)
        }
        .await;
        let mut played = release(txn, result).await?;

        played.sort_by(|(a, _), (b, _)| b.start_epoch_ms.cmp(&a.start_epoch_ms));
        let now_ms = now.timestamp_millis();
        Ok(played
            .into_iter()
            .map(|(tournament, registration)| summarize(tournament, now_ms, Some(Some(&registration))))
            .collect())
    }

    /// Final standings; only served once the tournament is over.
    pub async fn leaderboard(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<LeaderboardView, TournamentError> {
        let tournament = self.load_tournament(tournament_id).await?;
        let status = tournament.effective_status(self.clock.now_ms());
        if matches!(status, TournamentStatus::Scheduled | TournamentStatus::Live) {
            return Err(TournamentError::TournamentStillActive(status));
        }
        let pays_prizes = status != TournamentStatus::Cancelled;
        let entry = |row: LeaderboardRow| LeaderboardEntry {
            prize: pays_prizes
                .then(|| tournament.prize_for(row.position))
                .flatten(),
            row,
        };

        let mut txn = self.begin().await?;
        let result = async {
            let top = top_n(
                txn.as_mut(),
                tournament_id,
                self.config.leaderboard_top,
                self.config.overfetch_factor,
            )
            .await?;
            let user = position_of(
                txn.as_mut(),
                tournament_id,
                principal_id,
                &top,
            )
            .await?;
            Ok::<_, TournamentError>((top, user))
        }
        .await;
        let (top, user) = release(txn, result).await?;

        Ok(LeaderboardView {
            tournament_id: tournament.id.clone(),
            status,
            prize_currency: self.config.prize_currency.clone(),
            rows: top.into_iter().map(entry).collect(),
            user: user.map(entry),
        })
    }
}
