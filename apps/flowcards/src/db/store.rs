//! Repository pattern for local-store access.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use flowcards_core::schedule::{apply_grade, is_due, mark_read};
use flowcards_core::types::{
    Bookmark, BookmarkFolder, Card, CardStatus, Deck, DueCard, ReviewState, Settings, StudyLog,
    Tombstone, TombstoneKind,
};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::error::Result;
use crate::db::schema;

/// Repository for deck operations.
pub trait DeckStore {
    fn save_decks(&self, username: &str, decks: &[Deck]) -> Result<()>;
    fn load_decks(&self, username: &str) -> Result<Vec<Deck>>;
    fn replace_decks(&self, username: &str, decks: &[Deck]) -> Result<()>;
    fn delete_deck(&self, username: &str, deck_id: i64, now_ms: i64) -> Result<()>;
    fn delete_card(&self, username: &str, deck_id: i64, card_id: i64, now_ms: i64) -> Result<()>;
}

/// Repository for review-state operations.
pub trait StatusStore {
    fn get_card_status(&self, username: &str, deck_id: i64, card_id: i64)
        -> Result<Option<CardStatus>>;
    fn get_all_card_statuses(&self, username: &str) -> Result<Vec<CardStatus>>;
    fn get_card_statuses_for_deck(
        &self,
        username: &str,
        deck_id: i64,
    ) -> Result<HashMap<i64, CardStatus>>;
    fn schedule_review(
        &self,
        username: &str,
        deck_id: i64,
        card_id: i64,
        interval_days: i64,
        now_ms: i64,
    ) -> Result<ReviewState>;
    fn mark_card_read(&self, username: &str, deck_id: i64, card_id: i64) -> Result<()>;
    fn get_due_cards(&self, username: &str, decks: &[Deck], now_ms: i64) -> Result<Vec<DueCard>>;
    fn replace_card_statuses(&self, username: &str, statuses: &[CardStatus]) -> Result<()>;
}

/// Repository for study-log operations.
pub trait StudyLogStore {
    fn log_study(&self, username: &str, card_id: i64, date: &str) -> Result<()>;
    fn get_study_logs(&self, username: &str) -> Result<Vec<StudyLog>>;
    fn replace_study_logs(&self, username: &str, logs: &[StudyLog]) -> Result<()>;
    fn get_study_stats(&self, username: &str, today: &str) -> Result<StudyStats>;
}

/// Repository for bookmark operations.
pub trait BookmarkStore {
    fn get_folders(&self, username: &str) -> Result<Vec<BookmarkFolder>>;
    fn save_folder(&self, folder: &BookmarkFolder) -> Result<()>;
    fn delete_folder(&self, username: &str, folder_id: &str, now_ms: i64) -> Result<()>;
    fn replace_folders(&self, username: &str, folders: &[BookmarkFolder]) -> Result<()>;
    fn get_bookmarks(&self, username: &str, folder_id: Option<&str>) -> Result<Vec<Bookmark>>;
    fn save_bookmark(&self, bookmark: &Bookmark) -> Result<()>;
    fn delete_bookmark(&self, username: &str, bookmark_id: &str, now_ms: i64) -> Result<()>;
    fn replace_bookmarks(&self, username: &str, bookmarks: &[Bookmark]) -> Result<()>;
}

/// Repository for settings operations.
pub trait SettingsStore {
    fn load_settings(&self, username: &str) -> Result<Option<Settings>>;
    fn save_settings(&self, username: &str, settings: &Settings) -> Result<()>;
}

/// Repository for deletion tombstones.
pub trait TombstoneStore {
    fn record_tombstone(&self, tombstone: &Tombstone) -> Result<()>;
    fn get_tombstones(&self, username: &str) -> Result<Vec<Tombstone>>;
    fn prune_tombstones(&self, username: &str, max_age_days: i64, now_ms: i64) -> Result<usize>;
}

/// Aggregated study statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StudyStats {
    pub total_studied: usize,
    pub streak_days: usize,
}

/// SQLite implementation of the repositories.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open database at path, creating and migrating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(schema::SCHEMA)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![schema::SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn load_deck_cards(&self, username: &str, deck_id: i64) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, note_id, ord, front, back FROM cards
             WHERE username = ?1 AND deck_id = ?2 ORDER BY ord, id",
        )?;
        let cards = stmt
            .query_map(params![username, deck_id], |row| {
                Ok(Card {
                    id: row.get(0)?,
                    note_id: row.get(1)?,
                    deck_id,
                    ord: row.get(2)?,
                    front: row.get(3)?,
                    back: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    fn insert_decks(conn: &Connection, username: &str, decks: &[Deck]) -> Result<()> {
        for deck in decks {
            if deck.is_synthetic() {
                tracing::debug!(deck = deck.id, "skipping synthetic deck");
                continue;
            }
            conn.execute(
                "INSERT OR REPLACE INTO decks (username, id, name) VALUES (?1, ?2, ?3)",
                params![username, deck.id, deck.name],
            )?;
            conn.execute(
                "DELETE FROM cards WHERE username = ?1 AND deck_id = ?2",
                params![username, deck.id],
            )?;
            let mut stmt = conn.prepare(
                "INSERT INTO cards (username, deck_id, id, note_id, ord, front, back)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for card in &deck.cards {
                stmt.execute(params![
                    username,
                    deck.id,
                    card.id,
                    card.note_id,
                    card.ord,
                    card.front,
                    card.back
                ])?;
            }
        }
        Ok(())
    }

    fn insert_tombstone(
        conn: &Connection,
        username: &str,
        kind: TombstoneKind,
        id: &str,
        now_ms: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO deleted_items (username, kind, item_id, deleted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, kind.as_str(), id, now_ms],
        )?;
        Ok(())
    }
}

fn state_to_columns(state: &ReviewState) -> (&'static str, Option<i64>) {
    match state {
        ReviewState::Unscheduled => ("new", None),
        ReviewState::Scheduled { next_review_at } => ("new", Some(*next_review_at)),
        ReviewState::Mastered => ("completed", None),
    }
}

fn state_from_columns(status: &str, next_review_at: Option<i64>) -> ReviewState {
    match next_review_at {
        Some(next_review_at) => ReviewState::Scheduled { next_review_at },
        None if status == "completed" => ReviewState::Mastered,
        None => ReviewState::Unscheduled,
    }
}

impl DeckStore for SqliteStore {
    fn save_decks(&self, username: &str, decks: &[Deck]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        Self::insert_decks(&tx, username, decks)?;
        tx.commit()?;
        Ok(())
    }

    fn load_decks(&self, username: &str) -> Result<Vec<Deck>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM decks WHERE username = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![username], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut decks = Vec::with_capacity(rows.len());
        for (id, name) in rows {
            let cards = self.load_deck_cards(username, id)?;
            decks.push(Deck {
                id,
                name,
                cards,
                media: HashMap::new(),
            });
        }
        Ok(decks)
    }

    fn replace_decks(&self, username: &str, decks: &[Deck]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM cards WHERE username = ?1", params![username])?;
        tx.execute("DELETE FROM decks WHERE username = ?1", params![username])?;
        Self::insert_decks(&tx, username, decks)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_deck(&self, username: &str, deck_id: i64, now_ms: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM decks WHERE username = ?1 AND id = ?2",
            params![username, deck_id],
        )?;
        tx.execute(
            "DELETE FROM cards WHERE username = ?1 AND deck_id = ?2",
            params![username, deck_id],
        )?;
        tx.execute(
            "DELETE FROM card_status WHERE username = ?1 AND deck_id = ?2",
            params![username, deck_id],
        )?;
        Self::insert_tombstone(&tx, username, TombstoneKind::Deck, &deck_id.to_string(), now_ms)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_card(&self, username: &str, deck_id: i64, card_id: i64, now_ms: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM cards WHERE username = ?1 AND deck_id = ?2 AND id = ?3",
            params![username, deck_id, card_id],
        )?;
        tx.execute(
            "DELETE FROM card_status WHERE username = ?1 AND deck_id = ?2 AND card_id = ?3",
            params![username, deck_id, card_id],
        )?;
        Self::insert_tombstone(&tx, username, TombstoneKind::Card, &card_id.to_string(), now_ms)?;
        tx.commit()?;
        Ok(())
    }
}

impl StatusStore for SqliteStore {
    fn get_card_status(
        &self,
        username: &str,
        deck_id: i64,
        card_id: i64,
    ) -> Result<Option<CardStatus>> {
        self.conn
            .query_row(
                "SELECT status, next_review_at FROM card_status
                 WHERE username = ?1 AND deck_id = ?2 AND card_id = ?3",
                params![username, deck_id, card_id],
                |row| {
                    let status: String = row.get(0)?;
                    let next_review_at: Option<i64> = row.get(1)?;
                    Ok(CardStatus {
                        username: username.to_string(),
                        deck_id,
                        card_id,
                        state: state_from_columns(&status, next_review_at),
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    fn get_all_card_statuses(&self, username: &str) -> Result<Vec<CardStatus>> {
        let mut stmt = self.conn.prepare(
            "SELECT deck_id, card_id, status, next_review_at FROM card_status
             WHERE username = ?1 ORDER BY deck_id, card_id",
        )?;
        let statuses = stmt
            .query_map(params![username], |row| {
                let status: String = row.get(2)?;
                let next_review_at: Option<i64> = row.get(3)?;
                Ok(CardStatus {
                    username: username.to_string(),
                    deck_id: row.get(0)?,
                    card_id: row.get(1)?,
                    state: state_from_columns(&status, next_review_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(statuses)
    }

    fn get_card_statuses_for_deck(
        &self,
        username: &str,
        deck_id: i64,
    ) -> Result<HashMap<i64, CardStatus>> {
        let mut stmt = self.conn.prepare(
            "SELECT card_id, status, next_review_at FROM card_status
             WHERE username = ?1 AND deck_id = ?2",
        )?;
        let statuses = stmt
            .query_map(params![username, deck_id], |row| {
                let card_id: i64 = row.get(0)?;
                let status: String = row.get(1)?;
                let next_review_at: Option<i64> = row.get(2)?;
                Ok((
                    card_id,
                    CardStatus {
                        username: username.to_string(),
                        deck_id,
                        card_id,
                        state: state_from_columns(&status, next_review_at),
                    },
                ))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(statuses)
    }

    fn schedule_review(
        &self,
        username: &str,
        deck_id: i64,
        card_id: i64,
        interval_days: i64,
        now_ms: i64,
    ) -> Result<ReviewState> {
        let state = apply_grade(interval_days, now_ms);
        let (status, next_review_at) = state_to_columns(&state);
        self.conn.execute(
            "INSERT OR REPLACE INTO card_status (username, deck_id, card_id, status, next_review_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, deck_id, card_id, status, next_review_at],
        )?;
        Ok(state)
    }

    fn mark_card_read(&self, username: &str, deck_id: i64, card_id: i64) -> Result<()> {
        let existing = self
            .get_card_status(username, deck_id, card_id)?
            .map(|status| status.state);
        let state = mark_read(existing);
        let (status, next_review_at) = state_to_columns(&state);
        self.conn.execute(
            "INSERT OR REPLACE INTO card_status (username, deck_id, card_id, status, next_review_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, deck_id, card_id, status, next_review_at],
        )?;
        Ok(())
    }

    fn get_due_cards(&self, username: &str, decks: &[Deck], now_ms: i64) -> Result<Vec<DueCard>> {
        let statuses = self.get_all_card_statuses(username)?;
        let mut due = Vec::new();
        for status in statuses {
            if !is_due(&status.state, now_ms) {
                continue;
            }
            // Rows referencing a deck or card no longer present are skipped.
            let Some(deck) = decks.iter().find(|deck| deck.id == status.deck_id) else {
                continue;
            };
            let Some(card) = deck.cards.iter().find(|card| card.id == status.card_id) else {
                continue;
            };
            due.push(DueCard {
                card: card.clone(),
                deck_name: deck.name.clone(),
            });
        }
        Ok(due)
    }

    fn replace_card_statuses(&self, username: &str, statuses: &[CardStatus]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM card_status WHERE username = ?1",
            params![username],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO card_status (username, deck_id, card_id, status, next_review_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for status in statuses {
                let (tag, next_review_at) = state_to_columns(&status.state);
                stmt.execute(params![
                    username,
                    status.deck_id,
                    status.card_id,
                    tag,
                    next_review_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl StudyLogStore for SqliteStore {
    fn log_study(&self, username: &str, card_id: i64, date: &str) -> Result<()> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT card_ids FROM study_logs WHERE username = ?1 AND date = ?2",
                params![username, date],
                |row| row.get(0),
            )
            .optional()?;

        let mut log = match existing {
            Some(payload) => StudyLog {
                username: username.to_string(),
                date: date.to_string(),
                card_ids: serde_json::from_str(&payload)?,
            },
            None => StudyLog::new(username, date),
        };
        if !log.record(card_id) {
            return Ok(());
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO study_logs (username, date, card_ids) VALUES (?1, ?2, ?3)",
            params![username, date, serde_json::to_string(&log.card_ids)?],
        )?;
        Ok(())
    }

    fn get_study_logs(&self, username: &str) -> Result<Vec<StudyLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, card_ids FROM study_logs WHERE username = ?1 ORDER BY date DESC",
        )?;
        let rows = stmt
            .query_map(params![username], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut logs = Vec::with_capacity(rows.len());
        for (date, payload) in rows {
            logs.push(StudyLog {
                username: username.to_string(),
                date,
                card_ids: serde_json::from_str(&payload)?,
            });
        }
        Ok(logs)
    }

    fn replace_study_logs(&self, username: &str, logs: &[StudyLog]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM study_logs WHERE username = ?1",
            params![username],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO study_logs (username, date, card_ids) VALUES (?1, ?2, ?3)",
            )?;
            for log in logs {
                stmt.execute(params![
                    username,
                    log.date,
                    serde_json::to_string(&log.card_ids)?
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_study_stats(&self, username: &str, today: &str) -> Result<StudyStats> {
        let logs = self.get_study_logs(username)?;
        let total_studied = logs.iter().map(|log| log.card_ids.len()).sum();
        let dates: HashSet<&str> = logs.iter().map(|log| log.date.as_str()).collect();

        let today_date = NaiveDate::parse_from_str(today, "%Y-%m-%d")?;
        let mut day = today_date;
        // A streak survives today not having reviews yet.
        if !dates.contains(today) {
            day = day.pred_opt().unwrap_or(day);
        }
        let mut streak_days = 0usize;
        while dates.contains(day.format("%Y-%m-%d").to_string().as_str()) {
            streak_days += 1;
            match day.pred_opt() {
                Some(previous) => day = previous,
                None => break,
            }
            if streak_days > 366 {
                break;
            }
        }

        Ok(StudyStats {
            total_studied,
            streak_days,
        })
    }
}

impl BookmarkStore for SqliteStore {
    fn get_folders(&self, username: &str) -> Result<Vec<BookmarkFolder>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM bookmark_folders WHERE username = ?1 ORDER BY name")?;
        let folders = stmt
            .query_map(params![username], |row| {
                Ok(BookmarkFolder {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    username: username.to_string(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    fn save_folder(&self, folder: &BookmarkFolder) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO bookmark_folders (id, name, username) VALUES (?1, ?2, ?3)",
            params![folder.id, folder.name, folder.username],
        )?;
        Ok(())
    }

    fn delete_folder(&self, username: &str, folder_id: &str, now_ms: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM bookmark_folders WHERE id = ?1 AND username = ?2",
            params![folder_id, username],
        )?;
        tx.execute(
            "DELETE FROM bookmarks WHERE folder_id = ?1 AND username = ?2",
            params![folder_id, username],
        )?;
        // One tombstone for the folder; cascaded bookmarks get none.
        Self::insert_tombstone(&tx, username, TombstoneKind::Bookmark, folder_id, now_ms)?;
        tx.commit()?;
        Ok(())
    }

    fn replace_folders(&self, username: &str, folders: &[BookmarkFolder]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM bookmark_folders WHERE username = ?1",
            params![username],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO bookmark_folders (id, name, username) VALUES (?1, ?2, ?3)",
            )?;
            for folder in folders {
                stmt.execute(params![folder.id, folder.name, username])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_bookmarks(&self, username: &str, folder_id: Option<&str>) -> Result<Vec<Bookmark>> {
        let sql = match folder_id {
            Some(_) => {
                "SELECT id, folder_id, card, deck_name, created_at FROM bookmarks
                 WHERE username = ?1 AND folder_id = ?2 ORDER BY created_at DESC"
            }
            None => {
                "SELECT id, folder_id, card, deck_name, created_at FROM bookmarks
                 WHERE username = ?1 ORDER BY created_at DESC"
            }
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = if let Some(folder) = folder_id {
            stmt.query_map(params![username, folder], Self::bookmark_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            stmt.query_map(params![username], Self::bookmark_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut bookmarks = Vec::with_capacity(rows.len());
        for (id, folder_id, card_payload, deck_name, created_at) in rows {
            bookmarks.push(Bookmark {
                id,
                username: username.to_string(),
                folder_id,
                card: serde_json::from_str(&card_payload)?,
                deck_name,
                created_at,
            });
        }
        Ok(bookmarks)
    }

    fn save_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO bookmarks (id, username, folder_id, card, deck_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                bookmark.id,
                bookmark.username,
                bookmark.folder_id,
                serde_json::to_string(&bookmark.card)?,
                bookmark.deck_name,
                bookmark.created_at
            ],
        )?;
        Ok(())
    }

    fn delete_bookmark(&self, username: &str, bookmark_id: &str, now_ms: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM bookmarks WHERE id = ?1 AND username = ?2",
            params![bookmark_id, username],
        )?;
        Self::insert_tombstone(&tx, username, TombstoneKind::Bookmark, bookmark_id, now_ms)?;
        tx.commit()?;
        Ok(())
    }

    fn replace_bookmarks(&self, username: &str, bookmarks: &[Bookmark]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM bookmarks WHERE username = ?1",
            params![username],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO bookmarks (id, username, folder_id, card, deck_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for bookmark in bookmarks {
                stmt.execute(params![
                    bookmark.id,
                    username,
                    bookmark.folder_id,
                    serde_json::to_string(&bookmark.card)?,
                    bookmark.deck_name,
                    bookmark.created_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl SqliteStore {
    #[allow(clippy::type_complexity)]
    fn bookmark_row(
        row: &rusqlite::Row,
    ) -> rusqlite::Result<(String, String, String, String, i64)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    }
}

impl SettingsStore for SqliteStore {
    fn load_settings(&self, username: &str) -> Result<Option<Settings>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM settings WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    fn save_settings(&self, username: &str, settings: &Settings) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (username, payload) VALUES (?1, ?2)",
            params![username, serde_json::to_string(settings)?],
        )?;
        Ok(())
    }
}

impl TombstoneStore for SqliteStore {
    fn record_tombstone(&self, tombstone: &Tombstone) -> Result<()> {
        Self::insert_tombstone(
            &self.conn,
            &tombstone.username,
            tombstone.kind,
            &tombstone.id,
            tombstone.deleted_at,
        )
    }

    fn get_tombstones(&self, username: &str) -> Result<Vec<Tombstone>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, item_id, deleted_at FROM deleted_items WHERE username = ?1",
        )?;
        let rows = stmt
            .query_map(params![username], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tombstones = Vec::with_capacity(rows.len());
        for (kind, id, deleted_at) in rows {
            let Some(kind) = TombstoneKind::parse(&kind) else {
                tracing::warn!(%kind, "unknown tombstone kind, ignoring");
                continue;
            };
            tombstones.push(Tombstone {
                username: username.to_string(),
                kind,
                id,
                deleted_at,
            });
        }
        Ok(tombstones)
    }

    fn prune_tombstones(&self, username: &str, max_age_days: i64, now_ms: i64) -> Result<usize> {
        let cutoff = now_ms - max_age_days * flowcards_core::DAY_MS;
        let pruned = self.conn.execute(
            "DELETE FROM deleted_items WHERE username = ?1 AND deleted_at < ?2",
            params![username, cutoff],
        )?;
        Ok(pruned)
    }
}
