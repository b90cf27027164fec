//! Sync reconciliation: snapshot export, merge-import, file transfer, and
//! the composite smart sync against the remote document store.

pub mod remote;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use flowcards_core::merge::{self, TombstoneIndex};
use flowcards_core::types::SyncSnapshot;
use thiserror::Error;

use crate::db::{
    BookmarkStore, DeckStore, SettingsStore, SqliteStore, StatusStore, StoreError, StudyLogStore,
    TombstoneStore,
};
use remote::RemoteStore;

/// Days a tombstone is kept before pruning.
pub const TOMBSTONE_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("remote rejected {doc_id}: {message} (status {status})")]
    Remote {
        doc_id: String,
        status: u16,
        message: String,
    },

    #[error("{doc_id} was rejected permanently: {message}")]
    Permanent { doc_id: String, message: String },

    #[error("sync already in progress")]
    AlreadyInProgress,

    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("file error: {0}")]
    File(#[from] std::io::Error),
}

/// How an incoming snapshot is applied to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    /// Discard local rows for every entity class and install the snapshot.
    Replace,
    /// Reconcile both replicas per entity class; never loses data.
    Merge,
}

/// Outcome of a smart sync.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncReport {
    pub downloaded: bool,
    pub decks_uploaded: usize,
    pub card_statuses: usize,
    pub tombstones_pruned: usize,
}

/// Exports all of one user's data into an ephemeral snapshot.
pub fn export_user_data(
    store: &SqliteStore,
    username: &str,
    now_ms: i64,
) -> Result<SyncSnapshot, StoreError> {
    Ok(SyncSnapshot {
        username: username.to_string(),
        decks: store.load_decks(username)?,
        settings: store.load_settings(username)?,
        study_logs: store.get_study_logs(username)?,
        card_statuses: store.get_all_card_statuses(username)?,
        bookmark_folders: store.get_folders(username)?,
        bookmarks: store.get_bookmarks(username, None)?,
        sync_timestamp: now_ms,
    })
}

/// Applies a snapshot to the local store.
pub fn import_user_data(
    store: &SqliteStore,
    snapshot: &SyncSnapshot,
    strategy: ImportStrategy,
) -> Result<(), StoreError> {
    let username = &snapshot.username;
    match strategy {
        ImportStrategy::Replace => {
            store.replace_decks(username, &snapshot.decks)?;
            if let Some(settings) = &snapshot.settings {
                store.save_settings(username, settings)?;
            }
            store.replace_study_logs(username, &snapshot.study_logs)?;
            store.replace_card_statuses(username, &snapshot.card_statuses)?;
            store.replace_folders(username, &snapshot.bookmark_folders)?;
            store.replace_bookmarks(username, &snapshot.bookmarks)?;
        }
        ImportStrategy::Merge => {
            let tombstones = TombstoneIndex::new(&store.get_tombstones(username)?);

            let decks = merge::merge_decks(
                store.load_decks(username)?,
                snapshot.decks.clone(),
                &tombstones,
            );
            store.replace_decks(username, &decks)?;

            if let Some(incoming) = &snapshot.settings {
                let merged = match store.load_settings(username)? {
                    Some(existing) => existing.merged_with(incoming),
                    None => incoming.clone(),
                };
                store.save_settings(username, &merged)?;
            }

            let logs =
                merge::merge_study_logs(store.get_study_logs(username)?, snapshot.study_logs.clone());
            store.replace_study_logs(username, &logs)?;

            let statuses = merge::merge_card_statuses(
                store.get_all_card_statuses(username)?,
                snapshot.card_statuses.clone(),
            );
            store.replace_card_statuses(username, &statuses)?;

            let folders = merge::merge_folders(
                store.get_folders(username)?,
                snapshot.bookmark_folders.clone(),
                &tombstones,
            );
            store.replace_folders(username, &folders)?;

            let bookmarks = merge::merge_bookmarks(
                store.get_bookmarks(username, None)?,
                snapshot.bookmarks.clone(),
                &tombstones,
            );
            store.replace_bookmarks(username, &bookmarks)?;
        }
    }
    Ok(())
}

/// Writes a snapshot to a JSON file for manual cross-device transfer.
pub fn export_to_file(path: &Path, snapshot: &SyncSnapshot) -> Result<(), SyncError> {
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Reads a snapshot back from a JSON file.
pub fn import_from_file(path: &Path) -> Result<SyncSnapshot, SyncError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Default file name for a snapshot export.
pub fn export_file_name(username: &str, now_ms: i64) -> String {
    format!("flowcards-sync-{username}-{now_ms}.json")
}

/// Drives uploads and downloads against the remote store. A second request
/// while one is in flight is rejected, not queued.
pub struct SyncEngine {
    remote: RemoteStore,
    in_flight: AtomicBool,
}

struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    pub fn new(remote: RemoteStore) -> Self {
        Self {
            remote,
            in_flight: AtomicBool::new(false),
        }
    }

    fn begin(&self) -> Result<FlightGuard<'_>, SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyInProgress);
        }
        Ok(FlightGuard(&self.in_flight))
    }

    /// Uploads a snapshot to the remote store.
    pub async fn upload(&self, snapshot: &SyncSnapshot) -> Result<(), SyncError> {
        let _guard = self.begin()?;
        self.remote.upload_snapshot(snapshot).await
    }

    /// Downloads the remote snapshot, if any exists for the user.
    pub async fn download(&self, username: &str) -> Result<Option<SyncSnapshot>, SyncError> {
        let _guard = self.begin()?;
        self.remote.download_snapshot(username).await
    }

    /// Download → merge → re-export → upload → prune. The upload always
    /// carries the union of both replicas, never a regression.
    pub async fn smart_sync(
        &self,
        store: &SqliteStore,
        username: &str,
    ) -> Result<SyncReport, SyncError> {
        let _guard = self.begin()?;
        let mut report = SyncReport::default();

        if let Some(snapshot) = self.remote.download_snapshot(username).await? {
            tracing::info!(user = %username, "remote snapshot found, merging");
            report.downloaded = true;
            import_user_data(store, &snapshot, ImportStrategy::Merge)?;
        }

        let snapshot = export_user_data(store, username, Utc::now().timestamp_millis())?;
        report.decks_uploaded = snapshot.decks.len();
        report.card_statuses = snapshot.card_statuses.len();
        self.remote.upload_snapshot(&snapshot).await?;

        report.tombstones_pruned = store.prune_tombstones(
            username,
            TOMBSTONE_RETENTION_DAYS,
            Utc::now().timestamp_millis(),
        )?;
        Ok(report)
    }
}
