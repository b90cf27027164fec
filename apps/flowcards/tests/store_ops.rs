//! Local store behavior: cascades, scheduling, logs and round-trips.

mod common;

use common::fixtures::{bookmark, card, deck, folder, USER};
use flowcards::db::{
    BookmarkStore, DeckStore, SettingsStore, SqliteStore, StatusStore, StudyLogStore,
    TombstoneStore,
};
use flowcards::sync::{export_user_data, import_user_data, ImportStrategy};
use flowcards_core::types::{ReviewState, Settings, Tombstone, TombstoneKind};
use flowcards_core::DAY_MS;
use pretty_assertions::assert_eq;

const NOW: i64 = 1_700_000_000_000;

fn store_with_deck() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .save_decks(
            USER,
            &[deck(
                1,
                "Anatomy",
                vec![card(11, 1, "front 11"), card(12, 1, "front 12")],
            )],
        )
        .unwrap();
    store
}

#[test]
fn decks_round_trip_through_the_store() {
    let store = store_with_deck();
    let decks = store.load_decks(USER).unwrap();
    assert_eq!(decks.len(), 1);
    assert_eq!(decks[0].name, "Anatomy");
    assert_eq!(decks[0].cards.len(), 2);
}

#[test]
fn decks_are_partitioned_by_user() {
    let store = store_with_deck();
    store
        .save_decks("grace", &[deck(7, "Other", vec![card(71, 7, "x")])])
        .unwrap();
    assert_eq!(store.load_decks(USER).unwrap().len(), 1);
    assert_eq!(store.load_decks("grace").unwrap().len(), 1);
    assert_eq!(store.load_decks("grace").unwrap()[0].id, 7);
}

#[test]
fn synthetic_decks_are_never_persisted() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .save_decks(
            USER,
            &[
                deck(-999, "Today's Review", vec![card(1, -999, "x")]),
                deck(-1, "Preview", vec![card(2, -1, "y")]),
                deck(3, "Real", vec![card(3, 3, "z")]),
            ],
        )
        .unwrap();
    let decks = store.load_decks(USER).unwrap();
    assert_eq!(decks.len(), 1);
    assert_eq!(decks[0].id, 3);
}

#[test]
fn deleting_a_deck_cascades_and_writes_one_tombstone() {
    let store = store_with_deck();
    store.schedule_review(USER, 1, 11, 7, NOW).unwrap();
    store.schedule_review(USER, 1, 12, 1, NOW).unwrap();

    store.delete_deck(USER, 1, NOW).unwrap();

    assert!(store.load_decks(USER).unwrap().is_empty());
    assert!(store.get_all_card_statuses(USER).unwrap().is_empty());

    let tombstones = store.get_tombstones(USER).unwrap();
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].kind, TombstoneKind::Deck);
    assert_eq!(tombstones[0].id, "1");
}

#[test]
fn deleting_a_card_cascades_to_its_status() {
    let store = store_with_deck();
    store.schedule_review(USER, 1, 11, 7, NOW).unwrap();

    store.delete_card(USER, 1, 11, NOW).unwrap();

    let decks = store.load_decks(USER).unwrap();
    assert_eq!(decks[0].cards.len(), 1);
    assert_eq!(decks[0].cards[0].id, 12);
    assert!(store.get_card_status(USER, 1, 11).unwrap().is_none());

    let tombstones = store.get_tombstones(USER).unwrap();
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].kind, TombstoneKind::Card);
}

#[test]
fn scheduling_follows_the_interval_table() {
    let store = store_with_deck();
    let state = store.schedule_review(USER, 1, 11, 7, NOW).unwrap();
    assert_eq!(
        state,
        ReviewState::Scheduled {
            next_review_at: NOW + 7 * DAY_MS
        }
    );

    let decks = store.load_decks(USER).unwrap();
    // Not due yet.
    assert!(store
        .get_due_cards(USER, &decks, NOW + 7 * DAY_MS - 1)
        .unwrap()
        .is_empty());
    // Due exactly at the scheduled time.
    let due = store.get_due_cards(USER, &decks, NOW + 7 * DAY_MS).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].card.id, 11);
    assert_eq!(due[0].deck_name, "Anatomy");
}

#[test]
fn mastery_is_terminal() {
    let store = store_with_deck();
    store.schedule_review(USER, 1, 11, 7, NOW).unwrap();
    let state = store.schedule_review(USER, 1, 11, -1, NOW).unwrap();
    assert_eq!(state, ReviewState::Mastered);

    let decks = store.load_decks(USER).unwrap();
    assert!(store
        .get_due_cards(USER, &decks, NOW + 365 * DAY_MS)
        .unwrap()
        .is_empty());
}

#[test]
fn due_rows_for_missing_decks_are_silently_skipped() {
    let store = store_with_deck();
    store.schedule_review(USER, 99, 1, 0, NOW).unwrap();
    let decks = store.load_decks(USER).unwrap();
    assert!(store.get_due_cards(USER, &decks, NOW).unwrap().is_empty());
}

#[test]
fn mark_read_is_idempotent_and_preserves_schedules() {
    let store = store_with_deck();

    store.mark_card_read(USER, 1, 11).unwrap();
    let first = store.get_card_status(USER, 1, 11).unwrap().unwrap();
    assert_eq!(first.state, ReviewState::Unscheduled);

    store.schedule_review(USER, 1, 11, 7, NOW).unwrap();
    store.mark_card_read(USER, 1, 11).unwrap();
    let after = store.get_card_status(USER, 1, 11).unwrap().unwrap();
    assert_eq!(
        after.state,
        ReviewState::Scheduled {
            next_review_at: NOW + 7 * DAY_MS
        }
    );
}

#[test]
fn flipping_three_times_logs_the_card_once() {
    let store = store_with_deck();
    for _ in 0..3 {
        store.mark_card_read(USER, 1, 11).unwrap();
        store.log_study(USER, 11, "2024-01-01").unwrap();
    }
    store.log_study(USER, 12, "2024-01-01").unwrap();

    let logs = store.get_study_logs(USER).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].card_ids, vec![11, 12]);
}

#[test]
fn study_logs_sort_newest_first() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.log_study(USER, 1, "2024-01-01").unwrap();
    store.log_study(USER, 2, "2024-01-03").unwrap();
    store.log_study(USER, 3, "2024-01-02").unwrap();

    let dates: Vec<String> = store
        .get_study_logs(USER)
        .unwrap()
        .into_iter()
        .map(|log| log.date)
        .collect();
    assert_eq!(dates, vec!["2024-01-03", "2024-01-02", "2024-01-01"]);
}

#[test]
fn study_stats_count_volume_and_streak() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.log_study(USER, 1, "2024-01-03").unwrap();
    store.log_study(USER, 2, "2024-01-03").unwrap();
    store.log_study(USER, 3, "2024-01-02").unwrap();

    // Today has no reviews yet; the streak still counts back from yesterday.
    let stats = store.get_study_stats(USER, "2024-01-04").unwrap();
    assert_eq!(stats.total_studied, 3);
    assert_eq!(stats.streak_days, 2);

    // A gap breaks the streak.
    let stats = store.get_study_stats(USER, "2024-01-06").unwrap();
    assert_eq!(stats.streak_days, 0);
}

#[test]
fn deleting_a_folder_cascades_to_bookmarks_with_one_tombstone() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.save_folder(&folder("f1", "Cardio")).unwrap();
    store.save_bookmark(&bookmark("b1", "f1", 11, NOW)).unwrap();
    store.save_bookmark(&bookmark("b2", "f1", 12, NOW)).unwrap();
    store.save_bookmark(&bookmark("b3", "f2", 13, NOW)).unwrap();

    store.delete_folder(USER, "f1", NOW).unwrap();

    assert!(store.get_folders(USER).unwrap().is_empty());
    let remaining = store.get_bookmarks(USER, None).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "b3");

    let tombstones = store.get_tombstones(USER).unwrap();
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].kind, TombstoneKind::Bookmark);
    assert_eq!(tombstones[0].id, "f1");
}

#[test]
fn bookmarks_list_newest_first_and_filter_by_folder() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.save_bookmark(&bookmark("b1", "f1", 11, NOW)).unwrap();
    store.save_bookmark(&bookmark("b2", "f1", 12, NOW + 1)).unwrap();
    store.save_bookmark(&bookmark("b3", "f2", 13, NOW + 2)).unwrap();

    let all = store.get_bookmarks(USER, None).unwrap();
    assert_eq!(
        all.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
        vec!["b3", "b2", "b1"]
    );

    let in_folder = store.get_bookmarks(USER, Some("f1")).unwrap();
    assert_eq!(in_folder.len(), 2);
}

#[test]
fn tombstones_prune_after_the_retention_window() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .record_tombstone(&Tombstone {
            username: USER.into(),
            kind: TombstoneKind::Deck,
            id: "old".into(),
            deleted_at: NOW - 31 * DAY_MS,
        })
        .unwrap();
    store
        .record_tombstone(&Tombstone {
            username: USER.into(),
            kind: TombstoneKind::Deck,
            id: "fresh".into(),
            deleted_at: NOW - DAY_MS,
        })
        .unwrap();

    let pruned = store.prune_tombstones(USER, 30, NOW).unwrap();
    assert_eq!(pruned, 1);
    let remaining = store.get_tombstones(USER).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "fresh");
}

#[test]
fn export_then_replace_import_reproduces_the_store() {
    let store = store_with_deck();
    store.schedule_review(USER, 1, 11, 7, NOW).unwrap();
    store.schedule_review(USER, 1, 12, -1, NOW).unwrap();
    store.log_study(USER, 11, "2024-01-01").unwrap();
    store.save_folder(&folder("f1", "Cardio")).unwrap();
    store.save_bookmark(&bookmark("b1", "f1", 11, NOW)).unwrap();
    store.save_settings(USER, &Settings::default()).unwrap();

    let snapshot = export_user_data(&store, USER, NOW).unwrap();

    let fresh = SqliteStore::open_in_memory().unwrap();
    import_user_data(&fresh, &snapshot, ImportStrategy::Replace).unwrap();

    assert_eq!(fresh.load_decks(USER).unwrap(), store.load_decks(USER).unwrap());
    assert_eq!(
        fresh.get_all_card_statuses(USER).unwrap(),
        store.get_all_card_statuses(USER).unwrap()
    );
    assert_eq!(
        fresh.get_study_logs(USER).unwrap(),
        store.get_study_logs(USER).unwrap()
    );
    assert_eq!(fresh.get_folders(USER).unwrap(), store.get_folders(USER).unwrap());
    assert_eq!(
        fresh.get_bookmarks(USER, None).unwrap(),
        store.get_bookmarks(USER, None).unwrap()
    );
    assert_eq!(
        fresh.load_settings(USER).unwrap(),
        store.load_settings(USER).unwrap()
    );
}

#[test]
fn settings_payloads_round_trip() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.load_settings(USER).unwrap().is_none());

    let settings = Settings::default();
    store.save_settings(USER, &settings).unwrap();
    assert_eq!(store.load_settings(USER).unwrap(), Some(settings));
}

#[test]
fn card_statuses_for_deck_map_by_card_id() {
    let store = store_with_deck();
    store.schedule_review(USER, 1, 11, 7, NOW).unwrap();
    store.mark_card_read(USER, 1, 12).unwrap();
    store.schedule_review(USER, 2, 99, 0, NOW).unwrap();

    let statuses = store.get_card_statuses_for_deck(USER, 1).unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains_key(&11));
    assert_eq!(statuses[&12].state, ReviewState::Unscheduled);
}
