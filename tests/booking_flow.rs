use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use tokio_test::{assert_err, assert_ok};

use innkeep::config::EngineConfig;
use innkeep::engine::{Engine, EngineError, ErrorKind};
use innkeep::maintenance;
use innkeep::model::*;

// ── Test infrastructure ──────────────────────────────────────

fn test_data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("innkeep_int_test").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

async fn start_engine(data_dir: &PathBuf) -> Arc<Engine> {
    let config = EngineConfig {
        data_dir: data_dir.clone(),
        ..EngineConfig::default()
    };
    let engine = Engine::open(&config).unwrap();
    engine.seed_rooms(&config.load_rooms().unwrap()).await.unwrap();
    Arc::new(engine)
}

fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, day).unwrap()
}

fn stay(m1: u32, d1: u32, m2: u32, d2: u32) -> Stay {
    Stay::new(d(m1, d1), d(m2, d2))
}

fn draft(room_id: RoomId, s: Stay) -> ReservationDraft {
    ReservationDraft {
        room_id,
        stay: s,
        guest: GuestInfo {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            email: "grace@example.com".into(),
            phone: String::new(),
        },
    }
}

fn block_days(days: &[NaiveDate]) -> EditSet {
    EditSet {
        add: days.iter().copied().collect(),
        ..EditSet::default()
    }
}

/// Intervals on one room must be pairwise disjoint.
async fn assert_no_overlaps(engine: &Engine, room_id: RoomId) {
    let all = engine
        .intervals_for_room(room_id, Stay::new(d(1, 1), NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()))
        .await
        .unwrap();
    for (i, a) in all.iter().enumerate() {
        for b in &all[i + 1..] {
            assert!(!a.stay.overlaps(&b.stay), "interval {} overlaps {}", a.id, b.id);
        }
    }
}

// ── Scenario ─────────────────────────────────────────────────

#[tokio::test]
async fn checkout_day_is_bookable_and_blockable() {
    let dir = test_data_dir("scenario");
    let engine = start_engine(&dir).await;

    let receipt = assert_ok!(engine.commit(draft(1, stay(6, 1, 6, 3))).await);
    assert_eq!(receipt.reservation_id, 1);

    assert_eq!(
        engine.search(stay(6, 2, 6, 4), Some(1)).await.unwrap(),
        Availability::Room { room_id: 1, available: false }
    );
    assert_eq!(
        engine.search(stay(6, 3, 6, 5), Some(1)).await.unwrap(),
        Availability::Room { room_id: 1, available: true }
    );

    assert_ok!(engine.apply_edits(1, block_days(&[d(6, 3)])).await);
    let err = assert_err!(engine.apply_edits(1, block_days(&[d(6, 2)])).await);
    assert_eq!(err.kind(), ErrorKind::Overlap);

    let view = engine.build_month_view(2025, 6).await.unwrap();
    assert_eq!(view.state(1, d(6, 2)), Some(DayState::Reserved(1)));
    assert!(matches!(view.state(1, d(6, 3)), Some(DayState::Blocked(_))));
    assert_eq!(view.state(1, d(6, 4)), Some(DayState::Free));
    assert_no_overlaps(&engine, 1).await;
}

#[tokio::test]
async fn commit_then_search_consistency() {
    let dir = test_data_dir("consistency");
    let engine = start_engine(&dir).await;
    engine.commit(draft(2, stay(6, 10, 6, 15))).await.unwrap();

    assert!(!engine.search_room_availability(2, stay(6, 10, 6, 15)).await.unwrap());
    assert!(!engine.search_room_availability(2, stay(6, 14, 6, 20)).await.unwrap());
    assert!(engine.search_room_availability(2, stay(6, 5, 6, 10)).await.unwrap());
    assert!(engine.search_room_availability(2, stay(6, 15, 6, 16)).await.unwrap());

    match engine.search(stay(6, 12, 6, 13), None).await.unwrap() {
        Availability::Rooms(rooms) => {
            assert_eq!(rooms.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
        }
        other => panic!("expected room list, got {other:?}"),
    }
}

// ── Race property ────────────────────────────────────────────

#[tokio::test]
async fn racing_commits_never_double_book() {
    let dir = test_data_dir("race");
    let engine = start_engine(&dir).await;

    // Pairs (same room, overlapping) and singles (disjoint weeks) mixed together.
    let mut drafts = Vec::new();
    for week in 0..6u32 {
        let start = 1 + week * 5;
        drafts.push(draft(1, stay(7, start, 7, start + 3)));
        drafts.push(draft(1, stay(7, start + 1, 7, start + 4)));
        drafts.push(draft(2, stay(7, start, 7, start + 3)));
    }
    let tasks = drafts.into_iter().map(|draft| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.commit(draft).await })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let overlaps = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::Overlap))
        .count();
    // One winner per overlapping pair on room 1, every room 2 booking lands.
    assert_eq!(ok, 12);
    assert_eq!(overlaps, 6);
    assert_no_overlaps(&engine, 1).await;
    assert_no_overlaps(&engine, 2).await;
}

#[tokio::test]
async fn racing_block_and_booking_one_wins() {
    let dir = test_data_dir("race_block");
    let engine = start_engine(&dir).await;

    for day in 1..=10u32 {
        let booker = engine.clone();
        let operator = engine.clone();
        let (booked, blocked) = tokio::join!(
            tokio::spawn(async move { booker.commit(draft(1, stay(8, day, 8, day + 1))).await }),
            tokio::spawn(async move { operator.apply_edits(1, block_days(&[d(8, day)])).await }),
        );
        let booked = booked.unwrap().is_ok();
        let blocked = blocked.unwrap().is_ok();
        assert!(booked ^ blocked, "day {day}: booked={booked} blocked={blocked}");
    }
    assert_no_overlaps(&engine, 1).await;
}

// ── Deletion coupling ────────────────────────────────────────

#[tokio::test]
async fn delete_removes_backing_interval() {
    let dir = test_data_dir("delete");
    let engine = start_engine(&dir).await;
    let receipt = engine.commit(draft(1, stay(9, 1, 9, 4))).await.unwrap();

    let forbidden = EditSet {
        remove: [receipt.interval_id].into_iter().collect(),
        ..EditSet::default()
    };
    let err = engine.apply_edits(1, forbidden).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ForbiddenEdit);

    engine.delete_reservation(receipt.reservation_id).await.unwrap();
    let intervals = engine.intervals_for_room(1, stay(9, 1, 9, 30)).await.unwrap();
    assert!(intervals.is_empty());
    assert!(engine.search_room_availability(1, stay(9, 1, 9, 4)).await.unwrap());
    assert!(matches!(
        engine.get_reservation(receipt.reservation_id).await,
        Err(EngineError::ReservationNotFound(_))
    ));
    let err = engine.delete_reservation(receipt.reservation_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!err.is_retryable());

    // Freed nights can be rebooked.
    assert_ok!(engine.commit(draft(1, stay(9, 2, 9, 3))).await);
}

// ── Durability ───────────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart_and_compaction() {
    let dir = test_data_dir("restart");
    let kept = {
        let engine = start_engine(&dir).await;
        let kept = engine.commit(draft(1, stay(10, 1, 10, 5))).await.unwrap();
        for day in 10..20u32 {
            let r = engine.commit(draft(2, stay(10, day, 10, day + 1))).await.unwrap();
            engine.delete_reservation(r.reservation_id).await.unwrap();
        }
        engine.apply_edits(2, block_days(&[d(10, 12)])).await.unwrap();
        assert!(maintenance::compact_if_due(&engine, 10).await);
        kept
    };

    let engine = start_engine(&dir).await;
    assert_eq!(engine.list_rooms().await.unwrap().len(), 2);
    let reservations = engine.all_reservations().await.unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].id, kept.reservation_id);
    assert!(!engine.search_room_availability(2, stay(10, 12, 10, 13)).await.unwrap());
    assert!(engine.search_room_availability(2, stay(10, 13, 10, 20)).await.unwrap());

    let next = engine.commit(draft(2, stay(11, 1, 11, 2))).await.unwrap();
    assert_eq!(next.reservation_id, 12);
}
