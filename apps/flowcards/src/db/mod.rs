//! Local persistence layer: an embedded, versioned, key-partitioned store.

mod error;
mod schema;
mod store;

pub use error::StoreError;
pub use schema::{SCHEMA, SCHEMA_VERSION};
pub use store::{
    BookmarkStore, DeckStore, SettingsStore, SqliteStore, StatusStore, StudyLogStore, StudyStats,
    TombstoneStore,
};
