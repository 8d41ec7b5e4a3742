pub use super::ledger_transactions::Entity as LedgerTransactions;
pub use super::registrations::Entity as Registrations;
pub use super::reward_events::Entity as RewardEvents;
pub use super::tally_shards::Entity as TallyShards;
pub use super::tournaments::Entity as Tournaments;
pub use super::user_balances::Entity as UserBalances;
pub use super::videos::Entity as Videos;
pub use super::votes::Entity as Votes;
