//! Package import pipeline: streams decks out of a zip-encoded card package.
//!
//! Two named operations cover the two consumption modes:
//! [`decode_buffered`] returns the full deck list, [`decode_streaming`]
//! hands each deck to an async sink and awaits it before decoding the next
//! one, so a slow consumer back-pressures the parser and peak memory stays
//! around one decoded deck.

mod container;
mod snapshot;

pub use container::PackageArchive;
pub use snapshot::{has_snapshot_magic, RawCardRow, SnapshotEngine, SPILL_DIR_ENV, SQLITE_MAGIC};

use std::collections::{HashMap, HashSet};
use std::future::Future;

use flowcards_core::content;
use flowcards_core::types::{Card, Deck};
use thiserror::Error;

/// Hard ceiling on package input size.
pub const MAX_PACKAGE_BYTES: u64 = 600 * 1024 * 1024;

/// Archive entry holding the media manifest.
pub const MEDIA_MANIFEST_ENTRY: &str = "media";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("package is {actual_mib} MiB; the maximum supported size is {max_mib} MiB")]
    TooLarge { actual_mib: u64, max_mib: u64 },

    #[error("file is not a readable archive: {0}")]
    InvalidArchive(String),

    #[error("no valid database found inside the package")]
    NoDatabase,

    #[error("snapshot table `{0}` is missing")]
    MissingTable(&'static str),

    #[error("snapshot query failed: {0}")]
    Query(String),

    #[error("snapshot engine unavailable; locations tried: {}", .attempts.join("; "))]
    EngineUnavailable { attempts: Vec<String> },

    #[error("deck sink failed: {0}")]
    Sink(#[source] anyhow::Error),
}

/// Import pipeline stage, reported alongside a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    Scanning,
    Database,
    Media,
    Decks,
    Complete,
    Failed,
}

/// Progress tick emitted throughout an import.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ImportProgress {
    pub stage: ImportStage,
    pub percent: u8,
    pub detail: String,
}

impl ImportProgress {
    fn new(stage: ImportStage, percent: u8, detail: impl Into<String>) -> Self {
        Self {
            stage,
            percent,
            detail: detail.into(),
        }
    }
}

/// Rejects oversized inputs before any entry is read. Also applied by
/// callers on file metadata, so a huge package is never pulled into memory.
pub fn check_package_size(len: u64) -> Result<(), ImportError> {
    if len > MAX_PACKAGE_BYTES {
        return Err(ImportError::TooLarge {
            actual_mib: len / (1024 * 1024),
            max_mib: MAX_PACKAGE_BYTES / (1024 * 1024),
        });
    }
    Ok(())
}

/// Decodes a package into a complete deck list.
pub async fn decode_buffered<P>(bytes: Vec<u8>, on_progress: P) -> Result<Vec<Deck>, ImportError>
where
    P: FnMut(ImportProgress),
{
    let mut decks = Vec::new();
    decode_streaming(bytes, on_progress, |deck| {
        decks.push(deck);
        std::future::ready(Ok(()))
    })
    .await?;
    Ok(decks)
}

/// Decodes a package, handing each deck to `on_deck` and awaiting it before
/// continuing. Every failure emits a final failed progress tick carrying the
/// message before the error is returned.
pub async fn decode_streaming<P, F, Fut>(
    bytes: Vec<u8>,
    mut on_progress: P,
    mut on_deck: F,
) -> Result<(), ImportError>
where
    P: FnMut(ImportProgress),
    F: FnMut(Deck) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    match decode_inner(bytes, &mut on_progress, &mut on_deck).await {
        Ok(()) => {
            on_progress(ImportProgress::new(ImportStage::Complete, 100, "complete"));
            Ok(())
        }
        Err(err) => {
            on_progress(ImportProgress::new(ImportStage::Failed, 100, err.to_string()));
            Err(err)
        }
    }
}

async fn decode_inner<P, F, Fut>(
    bytes: Vec<u8>,
    on_progress: &mut P,
    on_deck: &mut F,
) -> Result<(), ImportError>
where
    P: FnMut(ImportProgress),
    F: FnMut(Deck) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    check_package_size(bytes.len() as u64)?;

    on_progress(ImportProgress::new(
        ImportStage::Scanning,
        5,
        "opening package",
    ));
    let mut archive = PackageArchive::open(bytes)?;
    let names = archive.entry_names();
    if names.is_empty() {
        return Err(ImportError::NoDatabase);
    }

    // Locate the relational snapshot (5-25%).
    let mut snapshot_bytes = None;
    let candidate_count = names.len();
    for (index, name) in names.iter().enumerate() {
        on_progress(ImportProgress::new(
            ImportStage::Scanning,
            span_percent(5, 25, index, candidate_count),
            format!("checking {name}"),
        ));
        let data = match archive.read_entry(name) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(entry = %name, error = %err, "unreadable entry, skipping");
                continue;
            }
        };
        if has_snapshot_magic(&data) {
            tracing::debug!(entry = %name, "found relational snapshot");
            snapshot_bytes = Some(data);
            break;
        }
    }
    let snapshot_bytes = snapshot_bytes.ok_or(ImportError::NoDatabase)?;
    on_progress(ImportProgress::new(
        ImportStage::Database,
        30,
        "database located",
    ));

    // Media manifest and blobs (50-70%). Missing or malformed media is
    // never fatal to the import.
    let media = extract_media(&mut archive, on_progress);

    on_progress(ImportProgress::new(
        ImportStage::Database,
        70,
        "opening snapshot",
    ));
    let engine = SnapshotEngine::open(&snapshot_bytes)?;
    let definitions = engine.deck_definitions()?;

    let known_media: HashSet<String> = media.keys().cloned().collect();
    let deck_count = definitions.len();
    for (index, (deck_id, deck_name)) in definitions.into_iter().enumerate() {
        on_progress(ImportProgress::new(
            ImportStage::Decks,
            span_percent(70, 95, index, deck_count),
            format!("decoding {deck_name}"),
        ));
        let rows = match engine.cards_for_deck(deck_id) {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(deck = deck_id, error = %err, "deck query failed, skipping");
                continue;
            }
        };
        if rows.is_empty() {
            tracing::debug!(deck = deck_id, "deck has no cards, skipping");
            continue;
        }

        let mut deck = Deck::new(deck_id, deck_name);
        let mut referenced: HashSet<String> = HashSet::new();
        for row in rows {
            let fields = content::split_fields(&row.fields);
            let front_raw = fields.first().copied().unwrap_or("");
            let (front, used_front) = content::rewrite_media_refs(front_raw, &known_media);
            if front.trim().is_empty() {
                tracing::warn!(
                    deck = deck_id,
                    card = row.card_id,
                    "card decoded to an empty front, skipping"
                );
                continue;
            }
            let back_raw = content::compose_back(&fields[1..]);
            let (back, used_back) = content::rewrite_media_refs(&back_raw, &known_media);
            referenced.extend(used_front);
            referenced.extend(used_back);
            deck.cards.push(Card {
                id: row.card_id,
                note_id: row.note_id,
                deck_id,
                ord: row.ord,
                front,
                back,
            });
        }
        if deck.cards.is_empty() {
            continue;
        }
        for name in &referenced {
            if let Some(blob) = media.get(name) {
                deck.media.insert(name.clone(), blob.clone());
            }
        }
        on_deck(deck).await.map_err(ImportError::Sink)?;
    }

    Ok(())
}

fn extract_media<P>(archive: &mut PackageArchive, on_progress: &mut P) -> HashMap<String, Vec<u8>>
where
    P: FnMut(ImportProgress),
{
    let manifest_bytes = match archive.read_entry(MEDIA_MANIFEST_ENTRY) {
        Ok(bytes) => bytes,
        Err(_) => return HashMap::new(),
    };
    let mapping: HashMap<String, String> = match serde_json::from_slice(&manifest_bytes) {
        Ok(mapping) => mapping,
        Err(err) => {
            tracing::warn!(error = %err, "media manifest is malformed, importing without media");
            return HashMap::new();
        }
    };

    let mut media = HashMap::with_capacity(mapping.len());
    let file_count = mapping.len();
    for (index, (archive_name, logical_name)) in mapping.into_iter().enumerate() {
        on_progress(ImportProgress::new(
            ImportStage::Media,
            span_percent(50, 70, index, file_count),
            format!("media {logical_name}"),
        ));
        match archive.read_entry(&archive_name) {
            Ok(blob) => {
                media.insert(logical_name, blob);
            }
            Err(err) => {
                tracing::warn!(entry = %archive_name, error = %err, "media blob failed to extract, skipping");
            }
        }
    }
    media
}

fn span_percent(start: u8, end: u8, index: usize, total: usize) -> u8 {
    if total == 0 {
        return start;
    }
    start + ((end - start) as usize * index / total) as u8
}
