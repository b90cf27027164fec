//! Core domain library for the flowcards study application.
//!
//! Provides:
//! - Shared types (decks, cards, review state, study logs, sync snapshots)
//! - The fixed-interval review scheduler
//! - Snapshot merge rules for multi-device reconciliation
//! - Card-content transforms (note fields, media tokens, cloze markers)

pub mod content;
pub mod merge;
pub mod schedule;
pub mod types;

pub use merge::TombstoneIndex;
pub use schedule::{apply_grade, is_due, mark_read, Grade, DAY_MS};
pub use types::{
    Bookmark, BookmarkFolder, Card, CardStatus, Deck, DueCard, ReviewState, Settings, StudyLog,
    SyncSnapshot, Tombstone, TombstoneKind,
};
