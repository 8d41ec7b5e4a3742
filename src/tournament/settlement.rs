//! Payouts and refunds.
//!
//! Every per-user side effect follows claim, attempt, call, mark: a leased
//! claim is written to the registration, then a non-expiring attempt marker,
//! then the remote call runs and the terminal status (`rewarded` /
//! `refunded`) is written after it. The terminal status is the dedup marker
//! that makes re-running a settlement safe; the claim keeps two overlapping
//! runs from paying the same user at once.
//!
//! A definite remote failure clears both claim and attempt. When the call
//! went out but the terminal status could not be written, the attempt stays
//! behind and every later run reports the user as in flight instead of
//! paying twice.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::upstream::PayoutRequest;

use super::error::TournamentError;
use super::leaderboard::{rank_candidates, LeaderboardRow};
use super::ledger::apply_delta_in;
use super::retry::retry_on_conflict;
use super::service::{finish, release, TournamentService};
use super::status::TournamentStatus;
use super::types::{
    LedgerContext, LedgerReason, PayoutAction, PayoutStatus, PrincipalId, Registration,
    RegistrationStatus, RewardEvent, SettlementDetail, SettlementKind, SettlementResult,
    Tournament, TournamentId,
};

const LOG_TARGET: &str = "tournament::settlement";

const UNRECONCILED: &str = "payout outcome unknown; needs reconciliation";

/// Converts a prize in the prize currency into payout-currency smallest units.
///
/// `rate` is the price of one payout-currency unit in the prize currency.
pub fn convert_prize(prize: u64, rate: f64, decimals: u32) -> u64 {
    let units = prize as f64 * 10f64.powi(decimals as i32) / rate;
    if units.is_finite() && units > 0.0 {
        units.floor() as u64
    } else {
        0
    }
}

/// Result of trying to claim a registration for a payout or refund.
enum Claim {
    Claimed(Registration),
    /// Already carries the terminal status this run was about to write.
    Done(Registration),
    /// Another run holds an unexpired claim.
    Held,
    /// An earlier remote call may have gone out without its outcome being
    /// recorded.
    Unreconciled,
    /// In some other terminal status; nothing to do.
    Ineligible(RegistrationStatus),
    Missing,
}

#[derive(Default)]
struct Tally {
    rewards_sent: u32,
    rewards_failed: u32,
    refunds_sent: u32,
    refunds_failed: u32,
    in_flight: u32,
    total_paid: u64,
    total_refunded: u64,
    details: Vec<SettlementDetail>,
}

impl Tally {
    fn record(&mut self, detail: SettlementDetail) {
        match (detail.action, detail.status) {
            (PayoutAction::Reward, PayoutStatus::Sent | PayoutStatus::AlreadySent) => {
                self.rewards_sent += 1;
                self.total_paid += detail.amount;
            }
            (PayoutAction::Reward, PayoutStatus::Failed) => self.rewards_failed += 1,
            (PayoutAction::Refund, PayoutStatus::Sent | PayoutStatus::AlreadySent) => {
                self.refunds_sent += 1;
                self.total_refunded += detail.amount;
            }
            (PayoutAction::Refund, PayoutStatus::Failed) => self.refunds_failed += 1,
            (_, PayoutStatus::InFlight) => self.in_flight += 1,
        }
        self.details.push(detail);
    }

    fn finish(
        self,
        kind: SettlementKind,
        players_who_played: u32,
        payout_currency: Option<String>,
        rate: Option<f64>,
        settled_at: DateTime<Utc>,
    ) -> SettlementResult {
        SettlementResult {
            kind,
            success: self.rewards_failed == 0 && self.refunds_failed == 0 && self.in_flight == 0,
            players_who_played,
            rewards_sent: self.rewards_sent,
            rewards_failed: self.rewards_failed,
            refunds_sent: self.refunds_sent,
            refunds_failed: self.refunds_failed,
            total_paid: self.total_paid,
            total_refunded: self.total_refunded,
            payout_currency,
            rate,
            details: self.details,
            settled_at,
        }
    }
}

fn detail(
    principal_id: &PrincipalId,
    action: PayoutAction,
    position: Option<u32>,
    amount: u64,
    payout_amount: Option<u64>,
    status: PayoutStatus,
    error: Option<String>,
) -> SettlementDetail {
    SettlementDetail {
        principal_id: principal_id.clone(),
        action,
        position,
        amount,
        payout_amount,
        status,
        error,
    }
}

/// Top-K ranked rows that carry a prize, K being the highest prize position.
///
/// Ranks every registration rather than an over-fetched window, so players
/// below the initial diamond count are never crowded out by idle entrants.
fn ranked_winners(
    tournament: &Tournament,
    registrations: &[Registration],
) -> Vec<(LeaderboardRow, u64)> {
    let mut rows = rank_candidates(registrations.to_vec());
    rows.truncate(tournament.max_prize_position() as usize);
    rows.into_iter()
        .filter_map(|row| tournament.prize_for(row.position).map(|prize| (row, prize)))
        .collect()
}

impl TournamentService {
    /// Settles (or re-settles) an ended tournament and persists the result.
    pub async fn settle(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<SettlementResult, TournamentError> {
        let tournament = self.load_tournament(tournament_id).await?;
        match tournament.status {
            TournamentStatus::Ended | TournamentStatus::Settled => {}
            TournamentStatus::Cancelled => {
                return Err(TournamentError::TransitionNotAllowed {
                    from: TournamentStatus::Cancelled,
                    to: TournamentStatus::Settled,
                })
            }
            status => return Err(TournamentError::TournamentStillActive(status)),
        }
        let result = self.run_settlement(&tournament).await?;
        self.finalize_settlement(tournament_id, result).await
    }

    pub(crate) async fn load_tournament(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<Tournament, TournamentError> {
        let mut txn = self.begin().await?;
        let loaded = txn
            .load_tournament(tournament_id)
            .await
            .map_err(TournamentError::from);
        release(txn, loaded)
            .await?
            .ok_or_else(|| TournamentError::TournamentNotFound(tournament_id.clone()))
    }

    async fn load_registrations(
        &self,
        tournament_id: &TournamentId,
    ) -> Result<Vec<Registration>, TournamentError> {
        let mut txn = self.begin().await?;
        let loaded = txn
            .list_registrations(tournament_id)
            .await
            .map_err(TournamentError::from);
        release(txn, loaded).await
    }

    /// Computes and executes the payouts (or refunds) without touching the
    /// tournament status. Fails only when no price quote can be obtained.
    pub(crate) async fn run_settlement(
        &self,
        tournament: &Tournament,
    ) -> Result<SettlementResult, TournamentError> {
        let registrations = self.load_registrations(&tournament.id).await?;
        let players_who_played = registrations.iter().filter(|r| r.has_played()).count() as u32;

        if players_who_played < self.config.min_players {
            info!(
                target: LOG_TARGET,
                tournament_id = %tournament.id,
                players_who_played,
                min_players = self.config.min_players,
                "not enough players; refunding everyone"
            );
            return Ok(self
                .refund_all(
                    tournament,
                    &registrations,
                    SettlementKind::InsufficientPlayers,
                    players_who_played,
                )
                .await);
        }

        let winners = ranked_winners(tournament, &registrations);
        let by_principal: HashMap<&PrincipalId, &Registration> = registrations
            .iter()
            .map(|r| (&r.principal_id, r))
            .collect();
        let any_unpaid = winners.iter().any(|(row, _)| {
            by_principal
                .get(&row.principal_id)
                .map_or(true, |r| r.status != RegistrationStatus::Rewarded)
        });

        let converts = self.config.prize_currency != self.config.payout_currency;
        let rate = if converts && any_unpaid {
            let price = self
                .upstreams
                .price
                .last_price(&self.config.prize_currency)
                .await
                .map_err(|err| {
                    warn!(
                        target: LOG_TARGET,
                        tournament_id = %tournament.id,
                        error = %err,
                        "price quote unavailable; settlement deferred"
                    );
                    TournamentError::Upstream(err)
                })?;
            Some(price)
        } else {
            None
        };

        let mut tally = Tally::default();
        for (row, prize) in &winners {
            let payout_amount = match rate {
                Some(rate) => convert_prize(*prize, rate, self.config.payout_decimals),
                None => *prize,
            };
            let outcome = self
                .pay_winner(tournament, row, *prize, payout_amount, rate)
                .await;
            tally.record(outcome);
        }

        let result = tally.finish(
            SettlementKind::Prizes,
            players_who_played,
            Some(self.config.payout_currency.clone()),
            rate,
            self.clock.now(),
        );
        info!(
            target: LOG_TARGET,
            tournament_id = %tournament.id,
            rewards_sent = result.rewards_sent,
            rewards_failed = result.rewards_failed,
            total_paid = result.total_paid,
            success = result.success,
            "prizes settled"
        );
        Ok(result)
    }

    async fn pay_winner(
        &self,
        tournament: &Tournament,
        row: &LeaderboardRow,
        prize: u64,
        payout_amount: u64,
        rate: Option<f64>,
    ) -> SettlementDetail {
        let principal_id = &row.principal_id;
        let position = Some(row.position);
        let reward = |status, payout: Option<u64>, error: Option<String>| {
            detail(
                principal_id,
                PayoutAction::Reward,
                position,
                prize,
                payout,
                status,
                error,
            )
        };

        match self
            .claim(&tournament.id, principal_id, RegistrationStatus::Rewarded)
            .await
        {
            Ok(Claim::Claimed(_)) => {}
            Ok(Claim::Done(registration)) => {
                return reward(PayoutStatus::AlreadySent, registration.payout_amount, None)
            }
            Ok(Claim::Held) => return reward(PayoutStatus::InFlight, None, None),
            Ok(Claim::Unreconciled) => {
                return reward(PayoutStatus::InFlight, None, Some(UNRECONCILED.to_string()))
            }
            Ok(Claim::Ineligible(status)) => {
                return reward(
                    PayoutStatus::Failed,
                    None,
                    Some(format!("registration is {}", status.as_str())),
                )
            }
            Ok(Claim::Missing) => {
                return reward(
                    PayoutStatus::Failed,
                    None,
                    Some("registration missing".to_string()),
                )
            }
            Err(err) => return reward(PayoutStatus::Failed, None, Some(err.to_string())),
        }

        if payout_amount == 0 {
            self.release_claim(&tournament.id, principal_id).await;
            return reward(
                PayoutStatus::Failed,
                Some(0),
                Some("payout amount rounds to zero".to_string()),
            );
        }
        if let Err(err) = self.mark_attempted(&tournament.id, principal_id).await {
            self.release_claim(&tournament.id, principal_id).await;
            return reward(PayoutStatus::Failed, Some(payout_amount), Some(err.to_string()));
        }

        let request = PayoutRequest {
            amount: payout_amount,
            recipient_principal: principal_id.clone(),
            memo_text: format!("{} prize #{}", tournament.title, row.position),
        };
        if let Err(err) = self.upstreams.payout.transfer(&request).await {
            warn!(
                target: LOG_TARGET,
                tournament_id = %tournament.id,
                principal_id = %principal_id,
                position = row.position,
                error = %err,
                "payout failed"
            );
            self.release_claim(&tournament.id, principal_id).await;
            return reward(PayoutStatus::Failed, Some(payout_amount), Some(err.to_string()));
        }

        let marked = retry_on_conflict(&self.config.retry, "settle.reward", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                let now = self.clock.now();
                let mut registration = txn
                    .load_registration(&tournament.id, principal_id)
                    .await?
                    .ok_or_else(|| TournamentError::internal("registration vanished"))?;
                registration.status = RegistrationStatus::Rewarded;
                registration.prize_position = Some(row.position);
                registration.prize_amount = Some(prize);
                registration.payout_amount = Some(payout_amount);
                registration.prize_sent_at = Some(now);
                registration.payout_claimed_at = None;
                registration.payout_attempted_at = None;
                txn.update_registration(registration).await?;
                txn.append_reward_event(RewardEvent {
                    id: Uuid::new_v4(),
                    tournament_id: tournament.id.clone(),
                    principal_id: principal_id.clone(),
                    position: row.position,
                    prize_amount: prize,
                    payout_amount,
                    payout_currency: self.config.payout_currency.clone(),
                    rate,
                    at: now,
                })
                .await?;
                Ok(())
            }
            .await;
            finish(txn, result).await
        })
        .await;

        match marked {
            Ok(()) => reward(PayoutStatus::Sent, Some(payout_amount), None),
            Err(err) => {
                error!(
                    target: LOG_TARGET,
                    tournament_id = %tournament.id,
                    principal_id = %principal_id,
                    amount = payout_amount,
                    error = %err,
                    "payout sent but not recorded; attempt left in place"
                );
                reward(
                    PayoutStatus::InFlight,
                    Some(payout_amount),
                    Some("payout sent but not recorded".to_string()),
                )
            }
        }
    }

    /// Refunds every registration still in `registered` status.
    pub(crate) async fn refund_all(
        &self,
        tournament: &Tournament,
        registrations: &[Registration],
        kind: SettlementKind,
        players_who_played: u32,
    ) -> SettlementResult {
        let mut tally = Tally::default();
        for registration in registrations {
            if registration.status == RegistrationStatus::Rewarded {
                continue;
            }
            let outcome = self.refund_one(tournament, &registration.principal_id).await;
            tally.record(outcome);
        }
        let result = tally.finish(kind, players_who_played, None, None, self.clock.now());
        info!(
            target: LOG_TARGET,
            tournament_id = %tournament.id,
            refunds_sent = result.refunds_sent,
            refunds_failed = result.refunds_failed,
            total_refunded = result.total_refunded,
            "refund pass finished"
        );
        result
    }

    async fn refund_one(
        &self,
        tournament: &Tournament,
        principal_id: &PrincipalId,
    ) -> SettlementDetail {
        let refund = |amount: u64, status, error: Option<String>| {
            detail(
                principal_id,
                PayoutAction::Refund,
                None,
                amount,
                None,
                status,
                error,
            )
        };

        let registration = match self
            .claim(&tournament.id, principal_id, RegistrationStatus::Refunded)
            .await
        {
            Ok(Claim::Claimed(registration)) => registration,
            Ok(Claim::Done(registration)) => {
                return refund(
                    registration.coins_paid.max(0) as u64,
                    PayoutStatus::AlreadySent,
                    None,
                )
            }
            Ok(Claim::Held) => return refund(0, PayoutStatus::InFlight, None),
            Ok(Claim::Unreconciled) => {
                return refund(0, PayoutStatus::InFlight, Some(UNRECONCILED.to_string()))
            }
            Ok(Claim::Ineligible(status)) => {
                return refund(
                    0,
                    PayoutStatus::Failed,
                    Some(format!("registration is {}", status.as_str())),
                )
            }
            Ok(Claim::Missing) => {
                return refund(0, PayoutStatus::Failed, Some("registration missing".into()))
            }
            Err(err) => return refund(0, PayoutStatus::Failed, Some(err.to_string())),
        };
        let coins = registration.coins_paid.max(0);

        if coins > 0 {
            if let Err(err) = self.mark_attempted(&tournament.id, principal_id).await {
                self.release_claim(&tournament.id, principal_id).await;
                return refund(coins as u64, PayoutStatus::Failed, Some(err.to_string()));
            }
            if let Err(err) = self
                .upstreams
                .balance
                .update_balance(principal_id, coins)
                .await
            {
                warn!(
                    target: LOG_TARGET,
                    tournament_id = %tournament.id,
                    principal_id = %principal_id,
                    error = %err,
                    "refund failed"
                );
                self.release_claim(&tournament.id, principal_id).await;
                return refund(coins as u64, PayoutStatus::Failed, Some(err.to_string()));
            }
        }

        let marked = retry_on_conflict(&self.config.retry, "settle.refund", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                let now = self.clock.now();
                let mut registration = txn
                    .load_registration(&tournament.id, principal_id)
                    .await?
                    .ok_or_else(|| TournamentError::internal("registration vanished"))?;
                registration.status = RegistrationStatus::Refunded;
                registration.refunded_at = Some(now);
                registration.payout_claimed_at = None;
                registration.payout_attempted_at = None;
                txn.update_registration(registration).await?;
                apply_delta_in(
                    txn.as_mut(),
                    principal_id,
                    coins,
                    LedgerReason::TournamentRefund,
                    LedgerContext::tournament(tournament.id.clone()),
                    now,
                )
                .await?;
                Ok(())
            }
            .await;
            finish(txn, result).await
        })
        .await;

        match marked {
            Ok(()) => refund(coins as u64, PayoutStatus::Sent, None),
            Err(err) => {
                error!(
                    target: LOG_TARGET,
                    tournament_id = %tournament.id,
                    principal_id = %principal_id,
                    amount = coins,
                    error = %err,
                    "refund credited but not recorded; attempt left in place"
                );
                refund(
                    coins as u64,
                    PayoutStatus::InFlight,
                    Some("refund credited but not recorded".into()),
                )
            }
        }
    }

    async fn claim(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
        done: RegistrationStatus,
    ) -> Result<Claim, TournamentError> {
        let lease = self.config.payout_claim_lease_chrono();
        retry_on_conflict(&self.config.retry, "settle.claim", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                let now = self.clock.now();
                let Some(mut registration) =
                    txn.load_registration(tournament_id, principal_id).await?
                else {
                    return Ok(Claim::Missing);
                };
                if registration.status == done {
                    return Ok(Claim::Done(registration));
                }
                if registration.status != RegistrationStatus::Registered {
                    return Ok(Claim::Ineligible(registration.status));
                }
                if registration.claim_is_held(now, lease) {
                    return Ok(Claim::Held);
                }
                if registration.payout_attempted_at.is_some() {
                    return Ok(Claim::Unreconciled);
                }
                registration.payout_claimed_at = Some(now);
                txn.update_registration(registration.clone()).await?;
                Ok(Claim::Claimed(registration))
            }
            .await;
            finish(txn, result).await
        })
        .await
    }

    /// Records that the remote call is about to go out. Never expires; only
    /// a terminal status or a definite failure clears it.
    async fn mark_attempted(
        &self,
        tournament_id: &TournamentId,
        principal_id: &PrincipalId,
    ) -> Result<(), TournamentError> {
        retry_on_conflict(&self.config.retry, "settle.attempt", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                let mut registration = txn
                    .load_registration(tournament_id, principal_id)
                    .await?
                    .ok_or_else(|| TournamentError::internal("registration vanished"))?;
                registration.payout_attempted_at = Some(self.clock.now());
                txn.update_registration(registration).await?;
                Ok(())
            }
            .await;
            finish(txn, result).await
        })
        .await
    }

    async fn release_claim(&self, tournament_id: &TournamentId, principal_id: &PrincipalId) {
        let released = retry_on_conflict(&self.config.retry, "settle.release", || async move {
            let mut txn = self.begin().await?;
            let result = async {
                if let Some(mut registration) =
                    txn.load_registration(tournament_id, principal_id).await?
                {
                    if registration.status == RegistrationStatus::Registered {
                        registration.payout_claimed_at = None;
                        registration.payout_attempted_at = None;
                        txn.update_registration(registration).await?;
                    }
                }
                Ok(())
            }
            .await;
            finish(txn, result).await
        })
        .await;
        if let Err(err) = released {
            warn!(
                target: LOG_TARGET,
                tournament_id = %tournament_id,
                principal_id = %principal_id,
                error = %err,
                "failed to release payout claim; user left for reconciliation"
            );
        }
    }

    /// Moves an ended tournament to settled with `result`. A stored
    /// successful result is kept and returned instead.
    pub(crate) async fn finalize_settlement(
        &self,
        tournament_id: &TournamentId,
        result: SettlementResult,
    ) -> Result<SettlementResult, TournamentError> {
        let result = &result;
        retry_on_conflict(&self.config.retry, "settle.finalize", || async move {
            let mut txn = self.begin().await?;
            let outcome = async {
                let tournament = txn
                    .load_tournament(tournament_id)
                    .await?
                    .ok_or_else(|| TournamentError::TournamentNotFound(tournament_id.clone()))?;
                if let Some(existing) = tournament.settlement_result.as_ref() {
                    if tournament.status == TournamentStatus::Settled && existing.success {
                        return Ok(existing.clone());
                    }
                }
                if !matches!(
                    tournament.status,
                    TournamentStatus::Ended | TournamentStatus::Settled
                ) {
                    return Err(TournamentError::TransitionNotAllowed {
                        from: tournament.status,
                        to: TournamentStatus::Settled,
                    });
                }
                txn.update_tournament_status(
                    tournament_id,
                    TournamentStatus::Settled,
                    Some(result.clone()),
                    self.clock.now(),
                )
                .await?;
                Ok(result.clone())
            }
            .await;
            finish(txn, outcome).await
        })
        .await
    }
}
