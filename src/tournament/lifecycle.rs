use serde::Serialize;
use tracing::{info, warn};

use super::error::TournamentError;
use super::retry::retry_on_conflict;
use super::service::{finish, release, TournamentService};
use super::status::TournamentStatus;
use super::types::{SettlementKind, SettlementResult, TournamentId};

const LOG_TARGET: &str = "tournament::lifecycle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionOutcome {
    Applied,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionReport {
    pub tournament_id: TournamentId,
    pub outcome: TransitionOutcome,
    pub previous_status: TournamentStatus,
    pub status: TournamentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementResult>,
}

/// What a transition request means for the current persisted status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Skip,
    Persist,
    /// Ended requested again while still ended: finish the settlement.
    Resettle,
    /// Cancelled requested again: finish outstanding refunds.
    Rerefund,
}

fn plan(current: TournamentStatus, target: TournamentStatus) -> Result<Plan, TournamentError> {
    use TournamentStatus::*;
    match (current, target) {
        (_, Settled) => Err(TournamentError::validation(
            "INVALID_STATUS",
            "settled is reached through the ended transition",
        )),
        (Cancelled, Cancelled) => Ok(Plan::Rerefund),
        (Settled, Cancelled) => Ok(Plan::Skip),
        (Ended, Cancelled) => Err(TournamentError::TransitionNotAllowed {
            from: Ended,
            to: Cancelled,
        }),
        (Scheduled | Live, Cancelled) => Ok(Plan::Persist),
        (Cancelled, _) => Ok(Plan::Skip),
        (Ended, Ended) => Ok(Plan::Resettle),
        (current, target) if current == target || current.is_ahead_of(target) => Ok(Plan::Skip),
        _ => Ok(Plan::Persist),
    }
}

impl TournamentService {
    /// Forward-only status transition; safe to redeliver.
    pub async fn advance_status(
        &self,
        tournament_id: &TournamentId,
        target: TournamentStatus,
    ) -> Result<TransitionReport, TournamentError> {
        let tournament = self.load_tournament(tournament_id).await?;
        let previous = tournament.status;
        let report = |outcome, status, settlement| TransitionReport {
            tournament_id: tournament_id.clone(),
            outcome,
            previous_status: previous,
            status,
            settlement,
        };

        match plan(previous, target)? {
            Plan::Skip => {
                info!(
                    target: LOG_TARGET,
                    tournament_id = %tournament_id,
                    current = %previous,
                    requested = %target,
                    "transition skipped"
                );
                Ok(report(TransitionOutcome::Skipped, previous, None))
            }
            Plan::Rerefund => {
                let result = self.cancellation_refunds(tournament_id).await?;
                Ok(report(
                    TransitionOutcome::Skipped,
                    TournamentStatus::Cancelled,
                    Some(result),
                ))
            }
            Plan::Resettle => {
                let result = self.settle_ended(tournament_id).await?;
                Ok(report(
                    TransitionOutcome::Applied,
                    TournamentStatus::Settled,
                    Some(result),
                ))
            }
            Plan::Persist => {
                if !self.persist_status(tournament_id, target).await? {
                    let current = self.load_tournament(tournament_id).await?.status;
                    return Ok(report(TransitionOutcome::Skipped, current, None));
                }
                info!(
                    target: LOG_TARGET,
                    tournament_id = %tournament_id,
                    from = %previous,
                    to = %target,
                    "status advanced"
                );
                match target {
                    TournamentStatus::Ended => {
                        let result = self.settle_ended(tournament_id).await?;
                        Ok(report(
                            TransitionOutcome::Applied,
                            TournamentStatus::Settled,
                            Some(result),
                        ))
                    }
                    TournamentStatus::Cancelled => {
                        let result = self.cancellation_refunds(tournament_id).await?;
                        Ok(report(
                            TransitionOutcome::Applied,
                            TournamentStatus::Cancelled,
                            Some(result),
                        ))
                    }
                    _ => Ok(report(TransitionOutcome::Applied, target, None)),
                }
            }
        }
    }

    /// Writes `target` unless a concurrent transition already moved past it.
    /// Returns whether the write happened.
    async fn persist_status(
        &self,
        tournament_id: &TournamentId,
        target: TournamentStatus,
    ) -> Result<bool, TournamentError> {
        retry_on_conflict(&self.config.retry, "lifecycle.persist", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                let tournament = txn
                    .load_tournament(tournament_id)
                    .await?
                    .ok_or_else(|| TournamentError::TournamentNotFound(tournament_id.clone()))?;
                if plan(tournament.status, target)? != Plan::Persist {
                    return Ok(false);
                }
                txn.update_tournament_status(tournament_id, target, None, self.clock.now())
                    .await?;
                Ok(true)
            }
            .await;
            finish(txn, result).await
        })
        .await
    }

    /// Settles a tournament already persisted as ended. A failure (no price
    /// quote) leaves it ended for a later retry.
    async fn settle_ended(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<SettlementResult, TournamentError> {
        let tournament = self.load_tournament(tournament_id).await?;
        match self.run_settlement(&tournament).await {
            Ok(result) => self.finalize_settlement(tournament_id, result).await,
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    tournament_id = %tournament_id,
                    error = %err,
                    "settlement failed; tournament stays ended"
                );
                Err(err)
            }
        }
    }

    /// Refunds every still-registered user of a cancelled tournament and
    /// stores the refund report on it.
    async fn cancellation_refunds(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<SettlementResult, TournamentError> {
        let tournament = self.load_tournament(tournament_id).await?;
        let registrations = {
            let mut txn = self.begin().await?;
            let loaded = txn
                .list_registrations(tournament_id)
                .await
                .map_err(TournamentError::from);
            release(txn, loaded).await?
        };
        let played = registrations.iter().filter(|r| r.has_played()).count() as u32;
        let result = self
            .refund_all(&tournament, &registrations, SettlementKind::Cancelled, played)
            .await;

        let stored = &result;
        retry_on_conflict(&self.config.retry, "lifecycle.cancel_report", || async move {
            let mut txn = self.begin().await?;
            let outcome = async {
                txn.update_tournament_status(
                    tournament_id,
                    TournamentStatus::Cancelled,
                    Some(stored.clone()),
                    self.clock.now(),
                )
                .await?;
                Ok(())
            }
            .await;
            finish(txn, outcome).await
        })
        .await?;
        Ok(result)
    }
}
