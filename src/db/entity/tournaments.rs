use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::{TournamentKind, TournamentStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tournaments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    pub kind: TournamentKind,
    pub date: String,
    pub start_epoch_ms: i64,
    pub end_epoch_ms: i64,
    pub entry_cost: i64,
    pub total_prize_pool: i64,
    #[sea_orm(column_type = "JsonBinary")]
    pub prize_map: Json,
    pub status: TournamentStatus,
    pub participant_count: i64,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub settlement_result: Option<Json>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::registrations::Entity")]
    Registrations,
    #[sea_orm(has_many = "super::videos::Entity")]
    Videos,
}

impl Related<super::registrations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Registrations.def()
    }
}

impl Related<super::videos::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Videos.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
