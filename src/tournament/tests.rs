use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::TournamentConfig;
use crate::test_support::{test_config, FlakyStorage, Harness, MINUTE_MS, T0_MS};
use crate::upstream::VideoAnalysis;

use super::error::TournamentError;
use super::query::ListQuery;
use super::retry::RetryPolicy;
use super::status::TournamentStatus;
use super::storage::{TournamentStorage, TournamentStorageTxn};
use super::tally::aggregate;
use super::types::{
    LedgerReason, Outcome, PayoutStatus, PrincipalId, PrizeMap, Registration,
    RegistrationStatus, SettlementKind, TournamentId, TournamentKind, Verdict, VoteKey,
};
use super::voting::VoteRequest;

fn prizes() -> PrizeMap {
    PrizeMap::from([(1, 400), (2, 250)])
}

fn pid(value: &str) -> PrincipalId {
    value.to_string()
}

fn vote(video: &str, option: &str) -> VoteRequest {
    VoteRequest {
        video_id: video.to_string(),
        option_id: option.to_string(),
    }
}

async fn registration(h: &Harness, tid: &TournamentId, principal: &str) -> Option<Registration> {
    let mut txn = h.service.storage().begin().await.unwrap();
    let found = txn.load_registration(tid, &pid(principal)).await.unwrap();
    txn.rollback().await;
    found
}

/// Records the target of every event.
#[derive(Clone, Default)]
struct TargetRecorder(Arc<Mutex<Vec<String>>>);

impl<S: Subscriber> Layer<S> for TargetRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.0.lock().push(event.metadata().target().to_string());
    }
}

/// Hot-or-not tournament (every verdict `hot`) with `alice` and `bob` registered.
async fn hot_or_not_pair(h: &Harness) -> TournamentId {
    let created = h
        .create(TournamentKind::HotOrNot, 100, prizes(), &["v1", "v2", "v3"])
        .await;
    let tid = created.tournament.id;
    h.service.register(&tid, &pid("alice")).await.unwrap();
    h.service.register(&tid, &pid("bob")).await.unwrap();
    tid
}

#[tokio::test]
async fn winners_are_ranked_and_paid_in_payout_units() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;
    assert_eq!(h.balance.net_for("alice"), -100);
    assert_eq!(h.balance.net_for("bob"), -100);

    h.go_live();
    for video in ["v1", "v2", "v3"] {
        let won = h.service.vote(&tid, &pid("alice"), vote(video, "hot")).await?;
        assert_eq!(won.outcome, Outcome::Win);
        assert_eq!(won.ai_verdict, Some(Verdict::Hot));
        let lost = h.service.vote(&tid, &pid("bob"), vote(video, "not")).await?;
        assert_eq!(lost.outcome, Outcome::Loss);
        assert_eq!(lost.diamond_delta, -1);
    }
    assert_eq!(registration(&h, &tid, "alice").await.unwrap().diamonds, 23);
    assert_eq!(registration(&h, &tid, "bob").await.unwrap().diamonds, 17);

    h.go_past_end();
    let report = h.service.advance_status(&tid, TournamentStatus::Ended).await?;
    assert_eq!(report.status, TournamentStatus::Settled);
    let result = report.settlement.expect("settlement result");
    assert_eq!(result.kind, SettlementKind::Prizes);
    assert!(result.success);
    assert_eq!(result.rewards_sent, 2);
    assert_eq!(result.rewards_failed, 0);
    assert_eq!(result.total_paid, 650);

    let transfers = h.payout.transfers();
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[0].recipient_principal, "alice");
    assert_eq!(transfers[0].amount, 8_000);
    assert_eq!(transfers[1].recipient_principal, "bob");
    assert_eq!(transfers[1].amount, 5_000);

    let alice = registration(&h, &tid, "alice").await.unwrap();
    assert_eq!(alice.status, RegistrationStatus::Rewarded);
    assert_eq!(alice.prize_position, Some(1));
    assert_eq!(alice.payout_amount, Some(8_000));

    let mut txn = h.service.storage().begin().await?;
    let events = txn.reward_events(&tid).await?;
    txn.rollback().await;
    assert_eq!(events.len(), 2);

    let status = h.service.status(&tid).await?;
    assert_eq!(status.status, TournamentStatus::Settled);
    assert_eq!(status.participant_count, 2);
    assert!(status.time_left_ms.is_none());
    Ok(())
}

#[tokio::test]
async fn single_player_tournament_refunds_everyone() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;

    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;

    h.go_past_end();
    let report = h.service.advance_status(&tid, TournamentStatus::Ended).await?;
    let result = report.settlement.expect("settlement result");
    assert_eq!(result.kind, SettlementKind::InsufficientPlayers);
    assert_eq!(result.players_who_played, 1);
    assert_eq!(result.refunds_sent, 2);
    assert_eq!(result.total_refunded, 200);
    assert!(h.payout.transfers().is_empty());
    assert_eq!(h.price.requests(), 0);
    assert_eq!(h.balance.net_for("alice"), 0);
    assert_eq!(h.balance.net_for("bob"), 0);

    let bob = registration(&h, &tid, "bob").await.unwrap();
    assert_eq!(bob.status, RegistrationStatus::Refunded);
    assert!(bob.refunded_at.is_some());

    let mut txn = h.service.storage().begin().await?;
    let ledger = txn.ledger_entries(&pid("bob")).await?;
    txn.rollback().await;
    let reasons: Vec<_> = ledger.iter().map(|e| e.reason).collect();
    assert_eq!(
        reasons,
        vec![LedgerReason::TournamentEntry, LedgerReason::TournamentRefund]
    );
    Ok(())
}

#[tokio::test]
async fn first_vote_on_seeded_option_wins() -> anyhow::Result<()> {
    let h = Harness::new();
    h.video.answer(VideoAnalysis {
        video_id: "clip".into(),
        verdict: None,
        candidates: vec!["fire".into(), "laugh".into()],
        top_pick: Some("fire".into()),
    });
    let tid = h
        .create(TournamentKind::Smiley, 0, prizes(), &["clip"])
        .await
        .tournament
        .id;
    h.service.register(&tid, &pid("alice")).await?;

    h.go_live();
    let outcome = h.service.vote(&tid, &pid("alice"), vote("clip", "fire")).await?;
    assert_eq!(outcome.outcome, Outcome::Win);
    assert_eq!(outcome.diamonds, 21);
    assert_eq!(outcome.position, 1);
    assert_eq!(outcome.option.map(|o| o.id), Some("fire".to_string()));

    let mut txn = h.service.storage().begin().await?;
    let shards = txn.load_tally(&tid, &"clip".to_string()).await?;
    txn.rollback().await;
    assert_eq!(shards.len(), h.service.config().shard_count as usize);
    let totals = aggregate(&shards);
    assert_eq!(totals.get("fire"), Some(&1001));
    assert_eq!(totals.get("laugh"), Some(&1000));
    assert_eq!(totals.get("heart"), Some(&0));
    Ok(())
}

#[tokio::test]
async fn tied_majority_loses() -> anyhow::Result<()> {
    let h = Harness::new();
    h.video.answer(VideoAnalysis {
        video_id: "clip".into(),
        verdict: None,
        candidates: vec!["fire".into(), "laugh".into()],
        top_pick: None,
    });
    let tid = h
        .create(TournamentKind::Smiley, 0, prizes(), &["clip"])
        .await
        .tournament
        .id;
    h.service.register(&tid, &pid("alice")).await?;
    h.service.register(&tid, &pid("bob")).await?;

    h.go_live();
    let first = h.service.vote(&tid, &pid("alice"), vote("clip", "fire")).await?;
    assert_eq!(first.outcome, Outcome::Win);
    // laugh catches up to 1001 and ties fire.
    let second = h.service.vote(&tid, &pid("bob"), vote("clip", "laugh")).await?;
    assert_eq!(second.outcome, Outcome::Loss);
    assert_eq!(second.diamonds, 19);
    Ok(())
}

#[tokio::test]
async fn tally_counts_every_committed_vote() -> anyhow::Result<()> {
    let h = Harness::new();
    h.video.answer(VideoAnalysis {
        video_id: "clip".into(),
        verdict: None,
        candidates: vec!["fire".into(), "laugh".into()],
        top_pick: None,
    });
    let tid = h
        .create(TournamentKind::Smiley, 0, prizes(), &["clip"])
        .await
        .tournament
        .id;
    let choices = [
        ("u1", "fire"),
        ("u2", "rocket"),
        ("u3", "fire"),
        ("u4", "puke"),
        ("u5", "laugh"),
        ("u6", "fire"),
    ];
    for (user, _) in choices {
        h.service.register(&tid, &pid(user)).await?;
    }

    h.go_live();
    for (user, option) in choices {
        h.service.vote(&tid, &pid(user), vote("clip", option)).await?;
    }
    // A rejected duplicate must not touch the tally.
    let duplicate = h.service.vote(&tid, &pid("u1"), vote("clip", "fire")).await;
    assert!(matches!(duplicate, Err(TournamentError::DuplicateVote)));

    let mut txn = h.service.storage().begin().await?;
    let shards = txn.load_tally(&tid, &"clip".to_string()).await?;
    txn.rollback().await;
    let totals = aggregate(&shards);
    assert_eq!(totals.get("fire"), Some(&1003));
    assert_eq!(totals.get("laugh"), Some(&1001));
    assert_eq!(totals.get("rocket"), Some(&1));
    assert_eq!(totals.get("puke"), Some(&1));
    assert_eq!(totals.values().sum::<i64>(), 2000 + choices.len() as i64);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_votes_seed_once_and_count_all() -> anyhow::Result<()> {
    let h = Harness::with_config(TournamentConfig {
        retry: RetryPolicy::no_delay(20),
        ..test_config()
    });
    h.video.answer(VideoAnalysis {
        video_id: "clip".into(),
        verdict: None,
        candidates: vec!["fire".into(), "laugh".into()],
        top_pick: None,
    });
    let tid = h
        .create(TournamentKind::Smiley, 0, prizes(), &["clip"])
        .await
        .tournament
        .id;
    let users: Vec<PrincipalId> = (0..8).map(|i| format!("u{i}")).collect();
    for user in &users {
        h.service.register(&tid, user).await?;
    }

    h.go_live();
    let votes = users.iter().map(|user| {
        let service = h.service.clone();
        let tid = tid.clone();
        let user = user.clone();
        tokio::spawn(async move { service.vote(&tid, &user, vote("clip", "fire")).await })
    });
    for joined in futures::future::join_all(votes).await {
        assert_eq!(joined??.outcome, Outcome::Win);
    }
    let duplicate = h.service.vote(&tid, &pid("u0"), vote("clip", "fire")).await;
    assert!(matches!(duplicate, Err(TournamentError::DuplicateVote)));

    let mut txn = h.service.storage().begin().await?;
    let shards = txn.load_tally(&tid, &"clip".to_string()).await?;
    let mut recorded = 0;
    for user in &users {
        let key = VoteKey::new(tid.clone(), user.clone(), "clip");
        if txn.load_vote(&key).await?.is_some() {
            recorded += 1;
        }
    }
    txn.rollback().await;

    assert_eq!(recorded, users.len());
    assert_eq!(shards.len(), h.service.config().shard_count as usize);
    let totals = aggregate(&shards);
    assert_eq!(totals.get("fire"), Some(&1008));
    assert_eq!(totals.get("laugh"), Some(&1000));
    assert_eq!(totals.values().sum::<i64>(), 2000 + users.len() as i64);
    Ok(())
}

#[tokio::test]
async fn second_vote_and_second_registration_are_rejected() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;

    let again = h.service.register(&tid, &pid("alice")).await;
    assert!(matches!(again, Err(TournamentError::AlreadyRegistered)));
    assert_eq!(h.balance.calls().len(), 2);

    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;
    let again = h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await;
    assert_eq!(again.unwrap_err().code(), "DUPLICATE_VOTE");
    let alice = registration(&h, &tid, "alice").await.unwrap();
    assert_eq!(alice.wins, 1);
    assert_eq!(alice.diamonds, 21);
    Ok(())
}

#[tokio::test]
async fn diamonds_never_drop_below_zero() -> anyhow::Result<()> {
    let h = Harness::with_config(crate::config::TournamentConfig {
        initial_diamonds: 2,
        ..test_config()
    });
    let tid = h
        .create(TournamentKind::HotOrNot, 0, prizes(), &["v1", "v2", "v3"])
        .await
        .tournament
        .id;
    h.service.register(&tid, &pid("carol")).await?;

    h.go_live();
    h.service.vote(&tid, &pid("carol"), vote("v1", "not")).await?;
    let last = h.service.vote(&tid, &pid("carol"), vote("v2", "not")).await?;
    assert_eq!(last.diamonds, 0);

    let blocked = h.service.vote(&tid, &pid("carol"), vote("v3", "hot")).await;
    assert!(matches!(blocked, Err(TournamentError::NoDiamonds)));
    let carol = registration(&h, &tid, "carol").await.unwrap();
    assert_eq!(carol.diamonds, 0);
    assert_eq!(carol.losses, 2);
    assert_eq!(carol.wins, 0);
    Ok(())
}

#[tokio::test]
async fn vote_gates() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;

    let early = h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await;
    assert!(matches!(
        early,
        Err(TournamentError::TournamentNotLive(TournamentStatus::Scheduled))
    ));

    h.go_live();
    let stranger = h.service.vote(&tid, &pid("mallory"), vote("v1", "hot")).await;
    assert_eq!(stranger.unwrap_err().code(), "NOT_REGISTERED");
    let bad = h.service.vote(&tid, &pid("alice"), vote("v1", "lukewarm")).await;
    assert_eq!(bad.unwrap_err().code(), "INVALID_VOTE");
    let missing = h.service.vote(&tid, &pid("alice"), vote("nope", "hot")).await;
    assert_eq!(missing.unwrap_err().code(), "VIDEO_NOT_FOUND");
    let blank = h.service.vote(&tid, &pid("alice"), vote(" ", "hot")).await;
    assert_eq!(blank.unwrap_err().code(), "MISSING_VIDEO_ID");
    Ok(())
}

#[tokio::test]
async fn status_only_moves_forward() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;

    h.go_live();
    let live = h.service.advance_status(&tid, TournamentStatus::Live).await?;
    assert_eq!(live.status, TournamentStatus::Live);

    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;
    h.service.vote(&tid, &pid("bob"), vote("v1", "hot")).await?;
    h.go_past_end();
    h.service.advance_status(&tid, TournamentStatus::Ended).await?;
    let transfers = h.payout.transfers().len();

    let back = h.service.advance_status(&tid, TournamentStatus::Live).await?;
    assert_eq!(back.status, TournamentStatus::Settled);
    assert!(back.settlement.is_none());
    let back = h.service.advance_status(&tid, TournamentStatus::Scheduled).await?;
    assert_eq!(back.status, TournamentStatus::Settled);
    assert_eq!(h.payout.transfers().len(), transfers);

    let explicit = h.service.advance_status(&tid, TournamentStatus::Settled).await;
    assert_eq!(explicit.unwrap_err().code(), "INVALID_STATUS");
    Ok(())
}

#[tokio::test]
async fn settling_twice_pays_nobody_twice() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;
    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;
    h.service.vote(&tid, &pid("bob"), vote("v1", "not")).await?;
    h.go_past_end();

    let first = h
        .service
        .advance_status(&tid, TournamentStatus::Ended)
        .await?
        .settlement
        .expect("settlement");
    let second = h.service.settle(&tid).await?;
    assert_eq!(first.total_paid, second.total_paid);
    assert_eq!(h.payout.transfers().len(), 2);
    assert_eq!(h.service.status(&tid).await?.status, TournamentStatus::Settled);
    Ok(())
}

#[tokio::test]
async fn failed_payout_is_retried_by_a_later_settle() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;
    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;
    h.service.vote(&tid, &pid("bob"), vote("v1", "not")).await?;
    h.go_past_end();

    h.payout.fail_for.lock().insert(pid("bob"));
    let first = h
        .service
        .advance_status(&tid, TournamentStatus::Ended)
        .await?
        .settlement
        .expect("settlement");
    assert!(!first.success);
    assert_eq!(first.rewards_sent, 1);
    assert_eq!(first.rewards_failed, 1);
    let bob = registration(&h, &tid, "bob").await.unwrap();
    assert_eq!(bob.status, RegistrationStatus::Registered);
    assert!(bob.payout_claimed_at.is_none());

    h.payout.fail_for.lock().clear();
    let retry = h.service.settle(&tid).await?;
    assert!(retry.success);
    let statuses: Vec<_> = retry.details.iter().map(|d| d.status).collect();
    assert_eq!(statuses, vec![PayoutStatus::AlreadySent, PayoutStatus::Sent]);
    let recipients: Vec<_> = h
        .payout
        .transfers()
        .into_iter()
        .map(|t| t.recipient_principal)
        .collect();
    assert_eq!(recipients, vec!["alice", "bob"]);
    Ok(())
}

#[tokio::test]
async fn idle_entrants_do_not_crowd_out_winners() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;
    for i in 0..101 {
        h.service.register(&tid, &format!("idle{i:03}")).await?;
    }
    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;
    h.service.vote(&tid, &pid("bob"), vote("v1", "not")).await?;
    assert_eq!(registration(&h, &tid, "bob").await.unwrap().diamonds, 19);
    h.go_past_end();

    let result = h
        .service
        .advance_status(&tid, TournamentStatus::Ended)
        .await?
        .settlement
        .expect("settlement");
    assert_eq!(result.kind, SettlementKind::Prizes);
    assert_eq!(result.players_who_played, 2);
    assert_eq!(result.rewards_sent, 2);
    let recipients: Vec<_> = h
        .payout
        .transfers()
        .into_iter()
        .map(|t| t.recipient_principal)
        .collect();
    assert_eq!(recipients, vec!["alice", "bob"]);
    Ok(())
}

#[tokio::test]
async fn unrecorded_payout_is_never_sent_again() -> anyhow::Result<()> {
    let storage = Arc::new(FlakyStorage::default());
    let fail_marks = storage.fail_terminal_writes.clone();
    let h = Harness::with_storage(test_config(), storage);
    let tid = hot_or_not_pair(&h).await;
    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;
    h.service.vote(&tid, &pid("bob"), vote("v1", "not")).await?;
    h.go_past_end();

    fail_marks.store(true, Ordering::SeqCst);
    let first = h
        .service
        .advance_status(&tid, TournamentStatus::Ended)
        .await?
        .settlement
        .expect("settlement");
    assert!(!first.success);
    assert_eq!(h.payout.transfers().len(), 2);
    assert!(first
        .details
        .iter()
        .all(|d| d.status == PayoutStatus::InFlight));

    // Storage is healthy again and the claim lease has long expired.
    fail_marks.store(false, Ordering::SeqCst);
    h.clock.set_ms(T0_MS + 90 * MINUTE_MS);
    let retry = h.service.settle(&tid).await?;
    assert!(!retry.success);
    assert_eq!(retry.rewards_sent, 0);
    assert_eq!(h.payout.transfers().len(), 2);
    assert!(retry
        .details
        .iter()
        .all(|d| d.status == PayoutStatus::InFlight && d.error.is_some()));

    let bob = registration(&h, &tid, "bob").await.unwrap();
    assert_eq!(bob.status, RegistrationStatus::Registered);
    assert!(bob.payout_attempted_at.is_some());
    Ok(())
}

#[tokio::test]
async fn unrecorded_refund_is_never_credited_again() -> anyhow::Result<()> {
    let storage = Arc::new(FlakyStorage::default());
    let fail_marks = storage.fail_terminal_writes.clone();
    let h = Harness::with_storage(test_config(), storage);
    let tid = hot_or_not_pair(&h).await;
    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;
    h.go_past_end();

    fail_marks.store(true, Ordering::SeqCst);
    let first = h
        .service
        .advance_status(&tid, TournamentStatus::Ended)
        .await?
        .settlement
        .expect("settlement");
    assert_eq!(first.kind, SettlementKind::InsufficientPlayers);
    assert!(!first.success);
    assert_eq!(h.balance.net_for("alice"), 0);
    assert_eq!(h.balance.net_for("bob"), 0);
    let balance_calls = h.balance.calls().len();

    fail_marks.store(false, Ordering::SeqCst);
    h.clock.set_ms(T0_MS + 90 * MINUTE_MS);
    let retry = h.service.settle(&tid).await?;
    assert!(!retry.success);
    assert_eq!(retry.refunds_sent, 0);
    assert_eq!(h.balance.calls().len(), balance_calls);
    assert_eq!(h.balance.net_for("alice"), 0);
    assert_eq!(h.balance.net_for("bob"), 0);
    assert!(retry
        .details
        .iter()
        .all(|d| d.status == PayoutStatus::InFlight));
    Ok(())
}

#[tokio::test]
async fn events_are_logged_under_their_module_target() -> anyhow::Result<()> {
    let recorder = TargetRecorder::default();
    let _guard = tracing_subscriber::registry()
        .with(recorder.clone())
        .set_default();

    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;
    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;
    h.service.vote(&tid, &pid("bob"), vote("v1", "not")).await?;
    h.go_past_end();
    h.service.advance_status(&tid, TournamentStatus::Ended).await?;

    let targets = recorder.0.lock().clone();
    for expected in ["tournament::voting", "tournament::settlement"] {
        assert!(
            targets.iter().any(|t| t == expected),
            "no event under {expected}: {targets:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn missing_price_leaves_tournament_ended() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;
    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await?;
    h.service.vote(&tid, &pid("bob"), vote("v1", "not")).await?;
    h.go_past_end();

    h.price.set(None);
    let failed = h.service.advance_status(&tid, TournamentStatus::Ended).await;
    assert_eq!(failed.unwrap_err().code(), "UPSTREAM_ERROR");
    assert_eq!(h.service.status(&tid).await?.status, TournamentStatus::Ended);
    assert!(h.payout.transfers().is_empty());

    h.price.set(Some(5_000_000.0));
    let report = h.service.advance_status(&tid, TournamentStatus::Ended).await?;
    assert_eq!(report.status, TournamentStatus::Settled);
    assert_eq!(h.payout.transfers().len(), 2);
    Ok(())
}

#[tokio::test]
async fn cancellation_refunds_and_blocks_play() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;

    let report = h
        .service
        .advance_status(&tid, TournamentStatus::Cancelled)
        .await?;
    let result = report.settlement.expect("refund report");
    assert_eq!(result.kind, SettlementKind::Cancelled);
    assert_eq!(result.refunds_sent, 2);
    assert_eq!(h.balance.net_for("alice"), 0);

    h.go_live();
    let live = h.service.advance_status(&tid, TournamentStatus::Live).await?;
    assert_eq!(live.status, TournamentStatus::Cancelled);
    let blocked = h.service.vote(&tid, &pid("alice"), vote("v1", "hot")).await;
    assert!(matches!(
        blocked,
        Err(TournamentError::TournamentNotLive(TournamentStatus::Cancelled))
    ));
    let closed = h.service.register(&tid, &pid("dave")).await;
    assert_eq!(closed.unwrap_err().code(), "TOURNAMENT_NOT_OPEN");

    // Re-requesting the cancellation refunds nobody twice.
    let again = h
        .service
        .advance_status(&tid, TournamentStatus::Cancelled)
        .await?
        .settlement
        .expect("refund report");
    assert_eq!(again.refunds_sent, 2);
    assert_eq!(h.balance.calls().len(), 4);
    Ok(())
}

#[tokio::test]
async fn concurrent_registration_credits_the_loser_back() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = h
        .create(TournamentKind::HotOrNot, 100, prizes(), &["v1"])
        .await
        .tournament
        .id;
    let alice = pid("alice");

    let (first, second) = tokio::join!(
        h.service.register(&tid, &alice),
        h.service.register(&tid, &alice)
    );
    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let loser = if first.is_err() { first } else { second };
    assert!(matches!(loser, Err(TournamentError::AlreadyRegistered)));

    assert_eq!(h.balance.net_for("alice"), -100);
    assert_eq!(h.service.status(&tid).await?.participant_count, 1);
    Ok(())
}

#[tokio::test]
async fn failed_entry_payment_registers_nothing() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = h
        .create(TournamentKind::HotOrNot, 100, prizes(), &["v1"])
        .await
        .tournament
        .id;
    h.balance.fail_debits.store(true, Ordering::SeqCst);

    let failed = h.service.register(&tid, &pid("erin")).await;
    assert_eq!(failed.unwrap_err().code(), "INSUFFICIENT_COINS");
    assert!(registration(&h, &tid, "erin").await.is_none());
    assert_eq!(h.service.status(&tid).await?.participant_count, 0);
    Ok(())
}

#[tokio::test]
async fn free_tournament_skips_payment() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = h
        .create(TournamentKind::HotOrNot, 0, prizes(), &["v1"])
        .await
        .tournament
        .id;
    h.balance.fail_debits.store(true, Ordering::SeqCst);
    let outcome = h.service.register(&tid, &pid("frank")).await?;
    assert_eq!(outcome.coins_paid, 0);
    assert_eq!(outcome.diamonds, 20);
    assert!(h.balance.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn creation_schedules_transitions_and_falls_back() -> anyhow::Result<()> {
    let h = Harness::new();
    h.video.fail("flaky");
    let created = h
        .create(TournamentKind::HotOrNot, 50, prizes(), &["ok", "flaky"])
        .await;
    assert_eq!(created.video_count, 2);
    assert_eq!(created.fallback_count, 1);
    assert!(created.scheduled);
    assert_eq!(created.tournament.total_prize_pool, 650);
    assert_eq!(created.tournament.date, "2026-10-18");

    let tasks = h.dispatcher.tasks();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].status, TournamentStatus::Live);
    assert_eq!(tasks[0].run_at_ms, T0_MS + 10 * MINUTE_MS);
    assert_eq!(tasks[1].status, TournamentStatus::Ended);

    let mut txn = h.service.storage().begin().await?;
    let flaky = txn
        .load_video(&created.tournament.id, &"flaky".to_string())
        .await?
        .expect("fallback video stored");
    txn.rollback().await;
    assert!(flaky.ai_verdict.is_some());

    let duplicate = h
        .service
        .create(crate::tournament::creation::CreateTournament {
            id: Some(created.tournament.id.clone()),
            title: "Again".into(),
            kind: TournamentKind::HotOrNot,
            date: None,
            start_epoch_ms: T0_MS,
            end_epoch_ms: T0_MS + MINUTE_MS,
            entry_cost: 0,
            prize_map: prizes(),
            total_prize_pool: None,
            video_ids: vec!["x".into()],
        })
        .await;
    assert_eq!(duplicate.unwrap_err().code(), "TOURNAMENT_EXISTS");
    Ok(())
}

#[tokio::test]
async fn scheduling_failure_does_not_fail_creation() {
    let h = Harness::new();
    h.dispatcher.fail.store(true, Ordering::SeqCst);
    let created = h
        .create(TournamentKind::Smiley, 0, prizes(), &["v1"])
        .await;
    assert!(!created.scheduled);
    assert!(h.dispatcher.tasks().is_empty());
}

#[tokio::test]
async fn listing_orders_live_first_and_marks_registration() -> anyhow::Result<()> {
    let h = Harness::new();
    let later = h
        .service
        .create(crate::tournament::creation::CreateTournament {
            id: Some("evening".into()),
            title: "Evening".into(),
            kind: TournamentKind::Smiley,
            date: None,
            start_epoch_ms: T0_MS + 120 * MINUTE_MS,
            end_epoch_ms: T0_MS + 180 * MINUTE_MS,
            entry_cost: 10,
            prize_map: prizes(),
            total_prize_pool: None,
            video_ids: vec!["e1".into()],
        })
        .await?;
    let tid = hot_or_not_pair(&h).await;

    h.go_live();
    let rows = h
        .service
        .list(ListQuery {
            principal_id: Some(pid("alice")),
            ..ListQuery::default()
        })
        .await?;
    let ids: Vec<_> = rows.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec![tid.clone(), later.tournament.id.clone()]);
    assert_eq!(rows[0].status, TournamentStatus::Live);
    assert_eq!(rows[0].time_left_ms, Some(25 * MINUTE_MS));
    assert_eq!(rows[0].is_registered, Some(true));
    assert_eq!(rows[0].user_stats.as_ref().map(|s| s.diamonds), Some(20));
    assert_eq!(rows[1].is_registered, Some(false));

    let scheduled = h
        .service
        .list(ListQuery {
            status: Some(TournamentStatus::Scheduled),
            ..ListQuery::default()
        })
        .await?;
    assert_eq!(scheduled.len(), 1);
    assert!(scheduled[0].is_registered.is_none());

    let other_day = h
        .service
        .list(ListQuery {
            date: Some("2026-10-17".into()),
            ..ListQuery::default()
        })
        .await?;
    assert!(other_day.is_empty());
    Ok(())
}

#[tokio::test]
async fn my_tournaments_lists_only_played_ones() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;
    assert!(h.service.my_tournaments(&pid("alice")).await?.is_empty());

    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v2", "hot")).await?;
    let mine = h.service.my_tournaments(&pid("alice")).await?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_stats.as_ref().map(|s| s.wins), Some(1));
    assert!(h.service.my_tournaments(&pid("bob")).await?.is_empty());

    h.clock.set_ms(T0_MS + 9 * 24 * 60 * MINUTE_MS);
    assert!(h.service.my_tournaments(&pid("alice")).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn leaderboard_waits_for_the_end() -> anyhow::Result<()> {
    let h = Harness::new();
    let tid = hot_or_not_pair(&h).await;
    h.service.register(&tid, &pid("idle")).await?;
    h.go_live();
    h.service.vote(&tid, &pid("alice"), vote("v1", "not")).await?;
    h.service.vote(&tid, &pid("bob"), vote("v1", "hot")).await?;

    let early = h.service.leaderboard(&tid, &pid("alice")).await;
    assert_eq!(early.unwrap_err().code(), "TOURNAMENT_STILL_ACTIVE");

    h.go_past_end();
    let board = h.service.leaderboard(&tid, &pid("alice")).await?;
    assert_eq!(board.status, TournamentStatus::Ended);
    assert_eq!(board.prize_currency, "INR");
    assert_eq!(board.rows.len(), 2);
    assert_eq!(board.rows[0].row.principal_id, "bob");
    assert_eq!(board.rows[0].prize, Some(400));
    let me = board.user.expect("caller row");
    assert_eq!(me.row.position, 2);
    assert_eq!(me.prize, Some(250));

    let idle = h.service.leaderboard(&tid, &pid("idle")).await?;
    assert_eq!(idle.user.map(|u| u.row.position), Some(0));
    Ok(())
}
