use serde::Serialize;
use tracing::{error, info, warn};

use super::error::TournamentError;
use super::ledger::apply_delta_in;
use super::retry::retry_on_conflict;
use super::service::{finish, release, require_id, TournamentService};
use super::status::TournamentStatus;
use super::types::{
    Coins, Diamonds, LedgerContext, LedgerReason, PrincipalId, Registration, Tournament,
    TournamentId,
};

const LOG_TARGET: &str = "tournament::registration";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterOutcome {
    pub tournament_id: TournamentId,
    pub principal_id: PrincipalId,
    pub coins_paid: Coins,
    pub diamonds: Diamonds,
    pub status: TournamentStatus,
}

fn ensure_open(tournament: &Tournament, now_ms: i64) -> Result<TournamentStatus, TournamentError> {
    match tournament.effective_status(now_ms) {
        status @ (TournamentStatus::Scheduled | TournamentStatus::Live) => Ok(status),
        status => Err(TournamentError::TournamentNotOpen(status)),
    }
}

impl TournamentService {
    /// Pays the entry fee remotely, then records the registration locally.
    ///
    /// The remote deduction happens before any local write. If the local
    /// write cannot complete (a concurrent registration won, the tournament
    /// closed meanwhile, the store gave up) the deduction is reversed.
    pub async fn register(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<RegisterOutcome, TournamentError> {
        require_id("MISSING_TOURNAMENT_ID", "tournament_id", tournament_id)?;
        require_id("MISSING_PRINCIPAL_ID", "principal_id", principal_id)?;

        let mut txn = self.begin().await?;
        let checked = async {
            let tournament = txn
                .load_tournament(tournament_id)
                .await?
                .ok_or_else(|| TournamentError::TournamentNotFound(tournament_id.clone()))?;
            ensure_open(&tournament, self.clock.now_ms())?;
            if txn
                .load_registration(tournament_id, principal_id)
                .await?
                .is_some()
            {
                return Err(TournamentError::AlreadyRegistered);
            }
            Ok(tournament)
        }
        .await;
        let tournament = release(txn, checked).await?;
        let cost = tournament.entry_cost;

        if cost > 0 {
            self.upstreams
                .balance
                .update_balance(principal_id, -cost)
                .await
                .map_err(|err| {
                    warn!(
                        target: LOG_TARGET,
                        tournament_id = %tournament_id,
                        principal_id = %principal_id,
                        error = %err,
                        "entry fee deduction failed"
                    );
                    TournamentError::PaymentFailed(err)
                })?;
        }

        let recorded = retry_on_conflict(&self.config.retry, "register", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                let now = self.clock.now();
                let tournament = txn
                    .load_tournament(tournament_id)
                    .await?
                    .ok_or_else(|| TournamentError::TournamentNotFound(tournament_id.clone()))?;
                let status = ensure_open(&tournament, now.timestamp_millis())?;
                if txn
                    .load_registration(tournament_id, principal_id)
                    .await?
                    .is_some()
                {
                    return Err(TournamentError::AlreadyRegistered);
                }

                let registration = Registration::new(
                    tournament_id.clone(),
                    principal_id.clone(),
                    cost,
                    self.config.initial_diamonds,
                    now,
                );
                txn.insert_registration(registration.clone()).await?;
                txn.increment_participant_count(tournament_id, 1).await?;
                apply_delta_in(
                    txn.as_mut(),
                    principal_id,
                    -cost,
                    LedgerReason::TournamentEntry,
                    LedgerContext::tournament(tournament_id.clone()),
                    now,
                )
                .await?;
                Ok((registration, status))
            }
            .await;
            finish(txn, result).await
        })
        .await;

        match recorded {
            Ok((registration, status)) => {
                info!(
                    target: LOG_TARGET,
                    tournament_id = %tournament_id,
                    principal_id = %principal_id,
                    coins_paid = cost,
                    "registered"
                );
                Ok(RegisterOutcome {
                    tournament_id: tournament_id.clone(),
                    principal_id: principal_id.clone(),
                    coins_paid: registration.coins_paid,
                    diamonds: registration.diamonds,
                    status,
                })
            }
            Err(err) => {
                self.compensate_entry_fee(tournament_id, principal_id, cost, &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn compensate_entry_fee(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
        cost: Coins,
        cause: &TournamentError,
    ) {
        if cost <= 0 {
            return;
        }
        warn!(
            target: LOG_TARGET,
            tournament_id = %tournament_id,
            principal_id = %principal_id,
            cause = %cause,
            "local registration failed after payment; crediting entry fee back"
        );
        if let Err(err) = self
            .upstreams
            .balance
            .update_balance(principal_id, cost)
            .await
        {
            error!(
                target: LOG_TARGET,
                tournament_id = %tournament_id,
                principal_id = %principal_id,
                amount = cost,
                error = %err,
                "compensating credit failed; manual reconciliation required"
            );
        }
    }
}
