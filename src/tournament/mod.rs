//! Vote micro-tournaments: registration, voting, standings, lifecycle and
//! settlement.

pub mod clock;
pub mod creation;
pub mod error;
pub mod leaderboard;
pub mod ledger;
pub mod lifecycle;
pub mod query;
pub mod registration;
pub mod retry;
pub mod service;
pub mod settlement;
pub mod status;
pub mod storage;
pub mod tally;
pub mod types;
pub mod voting;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use creation::{derive_tournament_id, CreateTournament, CreatedTournament};
pub use error::{ErrorClass, TournamentError};
pub use leaderboard::LeaderboardRow;
pub use lifecycle::{TransitionOutcome, TransitionReport};
pub use query::{
    LeaderboardEntry, LeaderboardView, ListQuery, TournamentStatusView, TournamentSummary,
    UserStats,
};
pub use registration::RegisterOutcome;
pub use retry::RetryPolicy;
pub use service::{TournamentOps, TournamentService};
pub use status::TournamentStatus;
pub use storage::{
    InMemoryTournamentStorage, SeaOrmTournamentStorage, StoreError, TournamentStorage,
    TournamentStorageTxn,
};
pub use types::{
    PrincipalId, Registration, SettlementKind, SettlementResult, Tournament, TournamentId,
    TournamentKind, VideoId,
};
pub use voting::{VoteOutcome, VoteRequest};
