pub mod prelude;

pub mod ledger_transactions;
pub mod registrations;
pub mod reward_events;
pub mod sea_orm_active_enums;
pub mod tally_shards;
pub mod tournaments;
pub mod user_balances;
pub mod videos;
pub mod votes;
