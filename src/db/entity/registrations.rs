use sea_orm::entity::prelude::*;

use super::sea_orm_active_enums::RegistrationStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "registrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tournament_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub principal_id: String,
    pub coins_paid: i64,
    pub diamonds: i64,
    pub wins: i64,
    pub losses: i64,
    pub status: RegistrationStatus,
    pub registered_at: DateTimeUtc,
    pub updated_at: Option<DateTimeUtc>,
    pub payout_claimed_at: Option<DateTimeUtc>,
    pub payout_attempted_at: Option<DateTimeUtc>,
    pub prize_position: Option<i32>,
    pub prize_amount: Option<i64>,
    pub payout_amount: Option<i64>,
    pub prize_sent_at: Option<DateTimeUtc>,
    pub refunded_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tournaments::Entity",
        from = "Column::TournamentId",
        to = "super::tournaments::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Tournament,
}

impl Related<super::tournaments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tournament.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
