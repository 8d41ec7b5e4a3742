use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::storage::{StoreError, TournamentStorageTxn};
use super::types::{Diamonds, PrincipalId, Registration, TournamentId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    pub principal_id: PrincipalId,
    pub diamonds: Diamonds,
    pub wins: i64,
    pub losses: i64,
    /// Strict 1-based rank; 0 means the user never played.
    pub position: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LeaderboardRow {
    fn unranked(registration: &Registration) -> Self {
        Self {
            principal_id: registration.principal_id.clone(),
            diamonds: registration.diamonds,
            wins: registration.wins,
            losses: registration.losses,
            position: 0,
            updated_at: registration.updated_at,
        }
    }

    pub fn games_played(&self) -> i64 {
        self.wins + self.losses
    }
}

/// Ranking key: diamonds desc, games desc, earliest activity first.
///
/// A missing `updated_at` sorts last; principal id makes the order total.
pub fn compare_standing(a: &Registration, b: &Registration) -> Ordering {
    b.diamonds
        .cmp(&a.diamonds)
        .then_with(|| b.games_played().cmp(&a.games_played()))
        .then_with(|| match (a.updated_at, b.updated_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.principal_id.cmp(&b.principal_id))
}

/// Drops never-played rows, sorts by standing and assigns positions 1, 2, 3...
pub fn rank_candidates(candidates: Vec<Registration>) -> Vec<LeaderboardRow> {
    let mut played: Vec<Registration> = candidates
        .into_iter()
        .filter(Registration::has_played)
        .collect();
    played.sort_by(compare_standing);
    played
        .iter()
        .enumerate()
        .map(|(idx, reg)| LeaderboardRow {
            position: idx as u32 + 1,
            ..LeaderboardRow::unranked(reg)
        })
        .collect()
}

/// Top `n` played registrations.
///
/// Over-fetches `n * overfetch_factor` rows by diamonds because unplayed
/// registrations sit at the initial diamond count and would crowd out
/// real players.
pub async fn top_n(
    txn: &mut (dyn TournamentStorageTxn + Send),
    tournament_id: &TournamentId,
    n: u32,
    overfetch_factor: u64,
) -> Result<Vec<LeaderboardRow>, StoreError> {
    if n == 0 {
        return Ok(Vec::new());
    }
    let fetch = u64::from(n).saturating_mul(overfetch_factor.max(1));
    let candidates = txn.top_registrations(tournament_id, fetch).await?;
    let mut rows = rank_candidates(candidates);
    rows.truncate(n as usize);
    Ok(rows)
}

/// The caller's own row. Reuses `top_rows` when the user is already in them,
/// otherwise counts every played rival ranked ahead.
pub async fn position_of(
    txn: &mut (dyn TournamentStorageTxn + Send),
    tournament_id: &TournamentId,
    principal_id: &PrincipalId,
    top_rows: &[LeaderboardRow],
) -> Result<Option<LeaderboardRow>, StoreError> {
    if let Some(row) = top_rows.iter().find(|row| &row.principal_id == principal_id) {
        return Ok(Some(row.clone()));
    }
    let Some(registration) = txn.load_registration(tournament_id, principal_id).await? else {
        return Ok(None);
    };
    if !registration.has_played() {
        return Ok(Some(LeaderboardRow::unranked(&registration)));
    }

    let rivals = txn
        .registrations_with_min_diamonds(tournament_id, registration.diamonds)
        .await?;
    let ahead = rivals
        .iter()
        .filter(|rival| rival.principal_id != registration.principal_id)
        .filter(|rival| rival.has_played())
        .filter(|rival| compare_standing(rival, &registration) == Ordering::Less)
        .count();

    Ok(Some(LeaderboardRow {
        position: ahead as u32 + 1,
        ..LeaderboardRow::unranked(&registration)
    }))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::tournament::storage::{InMemoryTournamentStorage, TournamentStorage};

    fn reg(
        pid: &str,
        diamonds: i64,
        wins: i64,
        losses: i64,
        updated: Option<DateTime<Utc>>,
    ) -> Registration {
        let mut r = Registration::new("t1".into(), pid.into(), 100, diamonds, Utc::now());
        r.wins = wins;
        r.losses = losses;
        r.updated_at = updated;
        r
    }

    #[test]
    fn more_games_wins_diamond_tie() {
        let t0 = Utc::now();
        let rows = rank_candidates(vec![
            reg("few", 21, 1, 0, Some(t0)),
            reg("many", 21, 3, 2, Some(t0 + Duration::seconds(5))),
        ]);
        assert_eq!(rows[0].principal_id, "many");
        assert_eq!(rows[0].position, 1);
        assert_eq!(rows[1].position, 2);
    }

    #[test]
    fn earlier_activity_wins_full_tie() {
        let t0 = Utc::now();
        let rows = rank_candidates(vec![
            reg("late", 22, 2, 0, Some(t0 + Duration::seconds(10))),
            reg("early", 22, 2, 0, Some(t0)),
        ]);
        let order: Vec<_> = rows.iter().map(|r| r.principal_id.as_str()).collect();
        assert_eq!(order, vec!["early", "late"]);
    }

    #[test]
    fn unplayed_users_never_ranked_and_positions_are_strict() {
        let t0 = Utc::now();
        let rows = rank_candidates(vec![
            reg("idle", 20, 0, 0, None),
            reg("a", 19, 1, 2, Some(t0)),
            reg("b", 19, 1, 2, Some(t0)),
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows.iter().map(|r| r.position).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn overfetch_skips_idle_registrations() {
        let storage = InMemoryTournamentStorage::new();
        let t0 = Utc::now();
        let mut txn = storage.begin().await.unwrap();
        for i in 0..30 {
            txn.insert_registration(reg(&format!("idle{i:02}"), 20, 0, 0, None))
                .await
                .unwrap();
        }
        txn.insert_registration(reg("player", 19, 0, 1, Some(t0)))
            .await
            .unwrap();
        txn.commit().await.unwrap();

        let tid = "t1".to_string();
        let mut read = storage.begin().await.unwrap();
        let strict = top_n(read.as_mut(), &tid, 1, 1).await.unwrap();
        assert!(strict.is_empty());
        let rows = top_n(read.as_mut(), &tid, 1, 50).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].principal_id, "player");
    }

    #[tokio::test]
    async fn position_outside_top_rows_counts_rivals_ahead() {
        let storage = InMemoryTournamentStorage::new();
        let t0 = Utc::now();
        let mut txn = storage.begin().await.unwrap();
        for reg in [
            reg("a", 25, 5, 0, Some(t0)),
            reg("b", 22, 2, 0, Some(t0)),
            reg("c", 22, 2, 0, Some(t0 + Duration::seconds(1))),
            reg("d", 18, 0, 2, Some(t0)),
            reg("idle", 20, 0, 0, None),
        ] {
            txn.insert_registration(reg).await.unwrap();
        }
        txn.commit().await.unwrap();

        let tid = "t1".to_string();
        let mut read = storage.begin().await.unwrap();
        let top = top_n(read.as_mut(), &tid, 1, 50).await.unwrap();
        assert_eq!(top[0].principal_id, "a");

        let c = position_of(read.as_mut(), &tid, &"c".to_string(), &top)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.position, 3);
        let d = position_of(read.as_mut(), &tid, &"d".to_string(), &top)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(d.position, 4);
        let idle = position_of(read.as_mut(), &tid, &"idle".to_string(), &top)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(idle.position, 0);
        let a = position_of(read.as_mut(), &tid, &"a".to_string(), &top)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.position, 1);
        assert!(position_of(read.as_mut(), &tid, &"ghost".to_string(), &top)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn position_counts_every_rival_ahead() {
        let storage = InMemoryTournamentStorage::new();
        let t0 = Utc::now();
        let mut txn = storage.begin().await.unwrap();
        for i in 0..1200 {
            txn.insert_registration(reg(&format!("r{i:04}"), 25, 5, 0, Some(t0)))
                .await
                .unwrap();
        }
        txn.insert_registration(reg("me", 21, 1, 0, Some(t0)))
            .await
            .unwrap();
        txn.commit().await.unwrap();

        let tid = "t1".to_string();
        let mut read = storage.begin().await.unwrap();
        let top = top_n(read.as_mut(), &tid, 10, 50).await.unwrap();
        let me = position_of(read.as_mut(), &tid, &"me".to_string(), &top)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(me.position, 1201);
    }
}
