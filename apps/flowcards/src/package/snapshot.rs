//! Read-only access to the embedded relational snapshot.
//!
//! The snapshot bytes have to land in a scratch file before the embedded
//! engine can open them. Every candidate spill location is probed and the
//! written file's magic header re-validated; if all locations fail the error
//! reports each one with its reason, since a silently unusable engine is the
//! hardest failure to diagnose in the field.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::package::ImportError;

/// First bytes of a valid relational snapshot.
pub const SQLITE_MAGIC: &[u8] = b"SQLite format 3";

/// Environment override for the spill directory.
pub const SPILL_DIR_ENV: &str = "FLOWCARDS_SPILL_DIR";

pub fn has_snapshot_magic(bytes: &[u8]) -> bool {
    bytes.len() >= SQLITE_MAGIC.len() && &bytes[..SQLITE_MAGIC.len()] == SQLITE_MAGIC
}

/// One card row joined with its note's field payload.
#[derive(Debug)]
pub struct RawCardRow {
    pub card_id: i64,
    pub note_id: i64,
    pub ord: u32,
    pub fields: String,
}

pub struct SnapshotEngine {
    conn: Connection,
    // Keeps the spill file alive (and cleaned up) with the engine.
    _spill: NamedTempFile,
}

impl SnapshotEngine {
    /// Spills the snapshot to a validated scratch file and opens it read-only.
    pub fn open(bytes: &[u8]) -> Result<Self, ImportError> {
        if !has_snapshot_magic(bytes) {
            return Err(ImportError::NoDatabase);
        }
        let mut attempts = Vec::new();
        for dir in spill_candidates() {
            match Self::try_spill(&dir, bytes) {
                Ok(engine) => return Ok(engine),
                Err(reason) => attempts.push(format!("{}: {reason}", dir.display())),
            }
        }
        Err(ImportError::EngineUnavailable { attempts })
    }

    fn try_spill(dir: &Path, bytes: &[u8]) -> Result<Self, String> {
        fs::create_dir_all(dir).map_err(|err| format!("cannot create directory: {err}"))?;
        let mut spill = tempfile::Builder::new()
            .prefix("flowcards-snapshot-")
            .suffix(".db")
            .tempfile_in(dir)
            .map_err(|err| format!("cannot create scratch file: {err}"))?;
        spill
            .write_all(bytes)
            .and_then(|_| spill.flush())
            .map_err(|err| format!("cannot write snapshot: {err}"))?;

        // Read back and re-validate before handing the file to the engine;
        // a partially written snapshot must not get this far.
        let mut header = [0u8; SQLITE_MAGIC.len()];
        fs::File::open(spill.path())
            .and_then(|mut file| file.read_exact(&mut header))
            .map_err(|err| format!("cannot read snapshot back: {err}"))?;
        if &header[..] != SQLITE_MAGIC {
            return Err("written snapshot failed magic validation".to_string());
        }

        let conn = Connection::open_with_flags(spill.path(), OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| format!("engine rejected snapshot: {err}"))?;
        Ok(Self { conn, _spill: spill })
    }

    /// Deck id → display name, from the `col` table's `decks` JSON column.
    pub fn deck_definitions(&self) -> Result<Vec<(i64, String)>, ImportError> {
        let decks_json: String = self
            .conn
            .query_row("SELECT decks FROM col", [], |row| row.get(0))
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => ImportError::MissingTable("col"),
                other if other.to_string().contains("no such table") => {
                    ImportError::MissingTable("col")
                }
                other => ImportError::Query(other.to_string()),
            })?;

        let value: Value = serde_json::from_str(&decks_json)
            .map_err(|err| ImportError::Query(format!("decks column is not valid JSON: {err}")))?;
        let Value::Object(entries) = value else {
            return Err(ImportError::Query(
                "decks column is not a JSON object".to_string(),
            ));
        };

        let mut definitions = Vec::with_capacity(entries.len());
        for (key, meta) in entries {
            let Ok(id) = key.parse::<i64>() else {
                tracing::warn!(deck = %key, "skipping deck with non-numeric id");
                continue;
            };
            let name = meta
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Deck {id}"));
            definitions.push((id, name));
        }
        Ok(definitions)
    }

    /// All cards of one deck joined with their notes' field payloads.
    pub fn cards_for_deck(&self, deck_id: i64) -> Result<Vec<RawCardRow>, ImportError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.id, c.nid, c.ord, n.flds FROM cards c
                 JOIN notes n ON c.nid = n.id WHERE c.did = ?1",
            )
            .map_err(|err| ImportError::Query(err.to_string()))?;
        let rows = stmt
            .query_map(params![deck_id], |row| {
                Ok(RawCardRow {
                    card_id: row.get(0)?,
                    note_id: row.get(1)?,
                    ord: row.get(2)?,
                    fields: row.get(3)?,
                })
            })
            .map_err(|err| ImportError::Query(err.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|err| ImportError::Query(err.to_string()))?;
        Ok(rows)
    }
}

fn spill_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(dir) = std::env::var(SPILL_DIR_ENV) {
        if !dir.is_empty() {
            candidates.push(PathBuf::from(dir));
        }
    }
    candidates.push(std::env::temp_dir());
    if let Some(cache) = dirs::cache_dir() {
        candidates.push(cache.join("flowcards"));
    }
    candidates
}
