use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Persisted lifecycle status of a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TournamentStatus {
    Scheduled,
    Live,
    Ended,
    Settled,
    Cancelled,
}

impl TournamentStatus {
    pub const ALL: [TournamentStatus; 5] = [
        TournamentStatus::Scheduled,
        TournamentStatus::Live,
        TournamentStatus::Ended,
        TournamentStatus::Settled,
        TournamentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Scheduled => "scheduled",
            TournamentStatus::Live => "live",
            TournamentStatus::Ended => "ended",
            TournamentStatus::Settled => "settled",
            TournamentStatus::Cancelled => "cancelled",
        }
    }

    /// Position in the canonical forward order. `Cancelled` sits outside it.
    pub fn lifecycle_rank(&self) -> Option<u8> {
        match self {
            TournamentStatus::Scheduled => Some(0),
            TournamentStatus::Live => Some(1),
            TournamentStatus::Ended => Some(2),
            TournamentStatus::Settled => Some(3),
            TournamentStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TournamentStatus::Settled | TournamentStatus::Cancelled)
    }

    /// True when moving from `self` to `target` would go backwards in the
    /// canonical order.
    pub fn is_ahead_of(&self, target: TournamentStatus) -> bool {
        match (self.lifecycle_rank(), target.lifecycle_rank()) {
            (Some(current), Some(requested)) => requested < current,
            _ => false,
        }
    }

    /// Ordering used when listing: live first, then scheduled, then the rest.
    pub fn list_priority(&self) -> u8 {
        match self {
            TournamentStatus::Live => 0,
            TournamentStatus::Scheduled => 1,
            TournamentStatus::Ended => 2,
            TournamentStatus::Settled => 3,
            TournamentStatus::Cancelled => 4,
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tournament status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for TournamentStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        TournamentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or(UnknownStatus(value.to_string()))
    }
}

/// Status implied purely by the wall clock.
///
/// `start <= now <= end` is live; both bounds are inclusive.
pub fn derive_status(start_epoch_ms: i64, end_epoch_ms: i64, now_ms: i64) -> TournamentStatus {
    if now_ms < start_epoch_ms {
        TournamentStatus::Scheduled
    } else if now_ms <= end_epoch_ms {
        TournamentStatus::Live
    } else {
        TournamentStatus::Ended
    }
}

/// Reconciles the persisted status with the clock for "is it open" decisions.
///
/// Cancelled and settled tournaments stay that way regardless of the clock;
/// otherwise the time-derived value wins.
pub fn effective_status(
    persisted: TournamentStatus,
    start_epoch_ms: i64,
    end_epoch_ms: i64,
    now_ms: i64,
) -> TournamentStatus {
    match persisted {
        TournamentStatus::Cancelled | TournamentStatus::Settled => persisted,
        _ => derive_status(start_epoch_ms, end_epoch_ms, now_ms),
    }
}
