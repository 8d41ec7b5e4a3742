use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::storage::{StoreError, TournamentStorageTxn};
use super::types::{LedgerContext, LedgerEntry, LedgerReason, PrincipalId, UserBalance};

const LOG_TARGET: &str = "tournament::ledger";

/// Applies `delta` to the user's running balance and appends the audit entry,
/// both inside `txn`. Returns the new balance.
///
/// Not idempotent: callers that need exactly-once must check their own marker
/// before calling.
pub async fn apply_delta_in(
    txn: &mut (dyn TournamentStorageTxn + Send),
    principal_id: &PrincipalId,
    delta: i64,
    reason: LedgerReason,
    context: LedgerContext,
    at: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let current = txn
        .load_balance(principal_id)
        .await?
        .map(|balance| balance.balance)
        .unwrap_or(0);
    let next = current
        .checked_add(delta)
        .ok_or_else(|| StoreError::corrupt("balance overflow"))?;

    txn.store_balance(UserBalance {
        principal_id: principal_id.clone(),
        balance: next,
        updated_at: at,
    })
    .await?;
    txn.append_ledger_entry(LedgerEntry {
        id: Uuid::new_v4(),
        principal_id: principal_id.clone(),
        delta,
        reason,
        tournament_id: context.tournament_id,
        video_id: context.video_id,
        at,
    })
    .await?;

    debug!(
        target: LOG_TARGET,
        principal_id = %principal_id,
        delta,
        reason = reason.as_str(),
        balance = next,
        "ledger delta staged"
    );
    Ok(next)
}
