//! Flowcards application library: package import, local persistence and
//! multi-device sync for the flashcard study app.

pub mod db;
pub mod package;
pub mod session;
pub mod sync;

use std::path::PathBuf;

/// Local database location under the per-user data directory.
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flowcards")
        .join("flowcards.db")
}
