//! SQLite schema for the per-user local store.
//!
//! Migrations are additive only: every statement is IF NOT EXISTS, so an
//! older database gains new partitions without touching existing rows.

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 8;

/// Complete schema. All user-owned tables carry a `username` partition
/// column; rows are never shared across users.
pub const SCHEMA: &str = r#"
-- Imported decks
CREATE TABLE IF NOT EXISTS decks (
    username TEXT NOT NULL,
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (username, id)
);

-- Deck contents
CREATE TABLE IF NOT EXISTS cards (
    username TEXT NOT NULL,
    deck_id INTEGER NOT NULL,
    id INTEGER NOT NULL,
    note_id INTEGER NOT NULL,
    ord INTEGER NOT NULL DEFAULT 0,
    front TEXT NOT NULL,
    back TEXT NOT NULL,
    PRIMARY KEY (username, deck_id, id)
);

-- Per-user settings payload
CREATE TABLE IF NOT EXISTS settings (
    username TEXT PRIMARY KEY,
    payload TEXT NOT NULL
);

-- One row per user per calendar day
CREATE TABLE IF NOT EXISTS study_logs (
    username TEXT NOT NULL,
    date TEXT NOT NULL,
    card_ids TEXT NOT NULL,
    PRIMARY KEY (username, date)
);

-- Review state, one row per card per user
CREATE TABLE IF NOT EXISTS card_status (
    username TEXT NOT NULL,
    deck_id INTEGER NOT NULL,
    card_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'new',
    next_review_at INTEGER,
    PRIMARY KEY (username, deck_id, card_id)
);

-- Bookmark folders (ids are client-generated tokens)
CREATE TABLE IF NOT EXISTS bookmark_folders (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    username TEXT NOT NULL
);

-- Bookmarks with denormalized card content
CREATE TABLE IF NOT EXISTS bookmarks (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    folder_id TEXT NOT NULL,
    card TEXT NOT NULL,
    deck_name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Deletion tombstones, pruned after a retention window
CREATE TABLE IF NOT EXISTS deleted_items (
    username TEXT NOT NULL,
    kind TEXT NOT NULL,
    item_id TEXT NOT NULL,
    deleted_at INTEGER NOT NULL,
    PRIMARY KEY (username, kind, item_id)
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_cards_deck ON cards(username, deck_id);
CREATE INDEX IF NOT EXISTS idx_card_status_due ON card_status(next_review_at);
CREATE INDEX IF NOT EXISTS idx_bookmarks_folder ON bookmarks(folder_id);
"#;
