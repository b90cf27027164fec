//! Merge-strategy imports: reconciliation of two replicas through the store.

mod common;

use common::fixtures::{bookmark, card, deck, folder, status, study_log, USER};
use flowcards::db::{
    BookmarkStore, DeckStore, SettingsStore, SqliteStore, StatusStore, StudyLogStore,
};
use flowcards::sync::{export_user_data, import_user_data, ImportStrategy};
use flowcards_core::types::{AiProvider, ReviewState, Settings, SyncSnapshot};
use flowcards_core::DAY_MS;
use pretty_assertions::assert_eq;

const NOW: i64 = 1_700_000_000_000;

fn snapshot_with(
    decks: Vec<flowcards_core::types::Deck>,
    statuses: Vec<flowcards_core::types::CardStatus>,
    logs: Vec<flowcards_core::types::StudyLog>,
) -> SyncSnapshot {
    SyncSnapshot {
        username: USER.to_string(),
        decks,
        settings: None,
        study_logs: logs,
        card_statuses: statuses,
        bookmark_folders: Vec::new(),
        bookmarks: Vec::new(),
        sync_timestamp: NOW,
    }
}

#[test]
fn merged_study_logs_are_the_set_union() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.log_study(USER, 1, "2024-01-01").unwrap();
    store.log_study(USER, 2, "2024-01-01").unwrap();

    let incoming = snapshot_with(Vec::new(), Vec::new(), vec![study_log("2024-01-01", &[2, 3])]);
    import_user_data(&store, &incoming, ImportStrategy::Merge).unwrap();

    let logs = store.get_study_logs(USER).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].card_ids, vec![1, 2, 3]);
}

#[test]
fn merged_statuses_prefer_the_later_schedule() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.schedule_review(USER, 1, 1, 7, NOW).unwrap();

    let incoming = snapshot_with(
        Vec::new(),
        vec![status(
            1,
            1,
            ReviewState::Scheduled {
                next_review_at: NOW + DAY_MS,
            },
        )],
        Vec::new(),
    );
    import_user_data(&store, &incoming, ImportStrategy::Merge).unwrap();

    let merged = store.get_card_status(USER, 1, 1).unwrap().unwrap();
    assert_eq!(
        merged.state,
        ReviewState::Scheduled {
            next_review_at: NOW + 7 * DAY_MS
        }
    );
}

#[test]
fn merged_decks_union_cards_with_incoming_content() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .save_decks(
            USER,
            &[deck(1, "Anatomy", vec![card(11, 1, "local front"), card(12, 1, "kept")])],
        )
        .unwrap();

    let incoming = snapshot_with(
        vec![deck(
            1,
            "Anatomy (updated)",
            vec![card(11, 1, "remote front"), card(13, 1, "new card")],
        )],
        Vec::new(),
        Vec::new(),
    );
    import_user_data(&store, &incoming, ImportStrategy::Merge).unwrap();

    let decks = store.load_decks(USER).unwrap();
    assert_eq!(decks.len(), 1);
    assert_eq!(decks[0].name, "Anatomy (updated)");
    assert_eq!(decks[0].cards.len(), 3);
    let front_11 = decks[0]
        .cards
        .iter()
        .find(|c| c.id == 11)
        .map(|c| c.front.as_str());
    assert_eq!(front_11, Some("remote front"));
}

#[test]
fn a_deck_deleted_here_does_not_resurrect_while_its_tombstone_lives() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .save_decks(USER, &[deck(1, "Anatomy", vec![card(11, 1, "front")])])
        .unwrap();
    store.delete_deck(USER, 1, NOW).unwrap();

    let incoming = snapshot_with(
        vec![deck(1, "Anatomy", vec![card(11, 1, "front")])],
        Vec::new(),
        Vec::new(),
    );
    import_user_data(&store, &incoming, ImportStrategy::Merge).unwrap();
    assert!(store.load_decks(USER).unwrap().is_empty());

    // After the tombstone is pruned, the remote copy may come back.
    use flowcards::db::TombstoneStore;
    store.prune_tombstones(USER, 30, NOW + 31 * DAY_MS).unwrap();
    import_user_data(&store, &incoming, ImportStrategy::Merge).unwrap();
    assert_eq!(store.load_decks(USER).unwrap().len(), 1);
}

#[test]
fn a_deleted_folder_keeps_its_bookmarks_out() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.save_folder(&folder("f1", "Cardio")).unwrap();
    store.save_bookmark(&bookmark("b1", "f1", 11, NOW)).unwrap();
    store.delete_folder(USER, "f1", NOW).unwrap();

    let incoming = SyncSnapshot {
        bookmark_folders: vec![folder("f1", "Cardio")],
        bookmarks: vec![bookmark("b1", "f1", 11, NOW)],
        ..snapshot_with(Vec::new(), Vec::new(), Vec::new())
    };
    import_user_data(&store, &incoming, ImportStrategy::Merge).unwrap();

    assert!(store.get_folders(USER).unwrap().is_empty());
    assert!(store.get_bookmarks(USER, None).unwrap().is_empty());
}

#[test]
fn merged_settings_shallow_merge_incoming_over_existing() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .save_settings(
            USER,
            &Settings {
                custom_endpoint: Some("https://local.example".into()),
                ..Settings::default()
            },
        )
        .unwrap();

    let incoming = SyncSnapshot {
        settings: Some(Settings {
            provider: AiProvider::Perplexity,
            ..Settings::default()
        }),
        ..snapshot_with(Vec::new(), Vec::new(), Vec::new())
    };
    import_user_data(&store, &incoming, ImportStrategy::Merge).unwrap();

    let merged = store.load_settings(USER).unwrap().unwrap();
    assert_eq!(merged.provider, AiProvider::Perplexity);
    assert_eq!(merged.custom_endpoint.as_deref(), Some("https://local.example"));
}

#[test]
fn merge_import_then_export_contains_the_union() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .save_decks(USER, &[deck(1, "Local", vec![card(11, 1, "front")])])
        .unwrap();
    store.log_study(USER, 11, "2024-01-01").unwrap();

    let incoming = snapshot_with(
        vec![deck(2, "Remote", vec![card(21, 2, "front")])],
        vec![status(2, 21, ReviewState::Mastered)],
        vec![study_log("2024-01-02", &[21])],
    );
    import_user_data(&store, &incoming, ImportStrategy::Merge).unwrap();

    let exported = export_user_data(&store, USER, NOW).unwrap();
    assert_eq!(exported.decks.len(), 2);
    assert_eq!(exported.study_logs.len(), 2);
    assert_eq!(exported.card_statuses.len(), 1);
    assert_eq!(exported.sync_timestamp, NOW);
}

#[test]
fn replace_discards_local_rows_first() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .save_decks(USER, &[deck(1, "Local", vec![card(11, 1, "front")])])
        .unwrap();
    store.log_study(USER, 11, "2024-01-01").unwrap();

    let incoming = snapshot_with(
        vec![deck(2, "Remote", vec![card(21, 2, "front")])],
        Vec::new(),
        Vec::new(),
    );
    import_user_data(&store, &incoming, ImportStrategy::Replace).unwrap();

    let decks = store.load_decks(USER).unwrap();
    assert_eq!(decks.len(), 1);
    assert_eq!(decks[0].id, 2);
    assert!(store.get_study_logs(USER).unwrap().is_empty());
}
