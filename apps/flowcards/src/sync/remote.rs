//! HTTP bridge to a CouchDB-compatible document store.
//!
//! Snapshots are spread over per-deck documents plus one per-user manifest.
//! A deck over the target document size is split into chunk documents by
//! greedy size-aware packing; the manifest is always written last so a
//! reader never observes it referencing a deck document that does not exist
//! yet.

use std::time::Duration;

use chrono::Utc;
use flowcards_core::types::{
    Bookmark, BookmarkFolder, Card, CardStatus, Deck, Settings, StudyLog, SyncSnapshot,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::sync::SyncError;

/// Default remote store location.
pub const DEFAULT_REMOTE_URL: &str = "http://localhost:5984";

/// Sync-data collection name.
pub const REMOTE_DATABASE: &str = "flowcards_sync";

const DEFAULT_REMOTE_USER: &str = "admin";
const DEFAULT_REMOTE_PASS: &str = "admin";

/// Environment override for the remote store URL.
pub const REMOTE_URL_ENV: &str = "FLOWCARDS_COUCHDB_URL";

/// Target size for one remote document.
pub const TARGET_DOC_BYTES: usize = 200 * 1024;

/// Absolute ceiling for one serialized card (1.5 MiB); larger cards are
/// skipped so they never block the rest of an upload.
pub const CARD_HARD_LIMIT_BYTES: usize = 1536 * 1024;

const MAX_ATTEMPTS: u32 = 3;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const TRANSFER_BATCH: usize = 5;

/// Connection parameters for the remote store. Stored per-user settings
/// override the built-in defaults; the URL env var overrides both.
#[derive(Debug, Clone)]
pub struct RemoteCredentials {
    pub base_url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for RemoteCredentials {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REMOTE_URL.to_string(),
            database: REMOTE_DATABASE.to_string(),
            username: DEFAULT_REMOTE_USER.to_string(),
            password: DEFAULT_REMOTE_PASS.to_string(),
        }
    }
}

impl RemoteCredentials {
    pub fn from_settings(settings: Option<&Settings>) -> Self {
        let mut credentials = Self::default();
        if let Some(config) = settings.and_then(|settings| settings.db_config.as_ref()) {
            if let Some(url) = &config.url {
                credentials.base_url = url.clone();
            }
            if let Some(user) = &config.user {
                credentials.username = user.clone();
            }
            if let Some(pass) = &config.pass {
                credentials.password = pass.clone();
            }
        }
        if let Ok(url) = std::env::var(REMOTE_URL_ENV) {
            if !url.is_empty() {
                credentials.base_url = url;
            }
        }
        credentials.base_url = credentials.base_url.trim_end_matches('/').to_string();
        credentials
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeckDocument {
    username: String,
    #[serde(rename = "type")]
    doc_type: String,
    deck: Deck,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_chunked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_cards: Option<usize>,
    updated_at: String,
    content_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkDocument {
    username: String,
    #[serde(rename = "type")]
    doc_type: String,
    cards: Vec<Card>,
    index: usize,
    deck_id: i64,
    content_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    username: String,
    #[serde(rename = "type")]
    doc_type: String,
    version: u32,
    #[serde(default)]
    sync_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings: Option<Settings>,
    #[serde(default)]
    study_logs: Vec<StudyLog>,
    #[serde(default)]
    card_statuses: Vec<CardStatus>,
    #[serde(default)]
    bookmark_folders: Vec<BookmarkFolder>,
    #[serde(default)]
    bookmarks: Vec<Bookmark>,
    #[serde(default)]
    deck_ids: Vec<i64>,
    #[serde(default)]
    last_synced: String,
    content_hash: String,
}

/// How one deck will be written: a parent document and, when the deck is
/// over the target size, the chunk documents carrying its cards.
#[derive(Debug)]
struct DeckUploadPlan {
    parent: DeckDocument,
    chunks: Vec<ChunkDocument>,
    skipped: Vec<i64>,
}

pub struct RemoteStore {
    client: Client,
    credentials: RemoteCredentials,
    retry_base: Duration,
}

impl RemoteStore {
    pub fn new(credentials: RemoteCredentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
            retry_base: Duration::from_secs(1),
        }
    }

    /// Shortens the retry backoff; used by tests.
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    fn db_url(&self) -> String {
        format!("{}/{}", self.credentials.base_url, self.credentials.database)
    }

    fn doc_url(&self, doc_id: &str) -> String {
        format!("{}/{}", self.db_url(), doc_id)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    /// Probes the remote store with a hard client-side timeout.
    pub async fn check_connectivity(&self) -> Result<bool, SyncError> {
        let url = format!("{}/_up", self.credentials.base_url);
        let response = self
            .auth(self.client.get(&url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|err| SyncError::Network(classify_transport(&err, &url)))?;
        Ok(response.status().is_success())
    }

    /// Checks that the sync collection exists, creating it on 404.
    pub async fn ensure_database(&self) -> Result<(), SyncError> {
        let url = self.db_url();
        let response = self
            .auth(self.client.head(&url))
            .send()
            .await
            .map_err(|err| SyncError::Network(classify_transport(&err, &url)))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                let created = self
                    .auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|err| SyncError::Network(classify_transport(&err, &url)))?;
                // 412 means another writer created it meanwhile.
                if !created.status().is_success()
                    && created.status() != StatusCode::PRECONDITION_FAILED
                {
                    return Err(SyncError::Remote {
                        doc_id: self.credentials.database.clone(),
                        status: created.status().as_u16(),
                        message: created.text().await.unwrap_or_default(),
                    });
                }
                Ok(())
            }
            status if status.is_success() => Ok(()),
            status => Err(SyncError::Remote {
                doc_id: self.credentials.database.clone(),
                status: status.as_u16(),
                message: "database check failed".to_string(),
            }),
        }
    }

    async fn get_doc(&self, doc_id: &str) -> Result<Option<Value>, SyncError> {
        let url = self.doc_url(doc_id);
        let response = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(|err| SyncError::Network(classify_transport(&err, &url)))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SyncError::Remote {
                doc_id: doc_id.to_string(),
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let value = response
            .json()
            .await
            .map_err(|err| SyncError::Network(err.to_string()))?;
        Ok(Some(value))
    }

    /// Writes one document, retrying transient failures with exponential
    /// backoff. Permanent client errors (413/400) fail immediately.
    async fn put_doc(&self, doc_id: &str, body: Value) -> Result<(), SyncError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_put(doc_id, body.clone()).await {
                Ok(()) => return Ok(()),
                Err(err @ SyncError::Permanent { .. }) => return Err(err),
                Err(err) if attempt >= MAX_ATTEMPTS => return Err(err),
                Err(err) => {
                    tracing::warn!(doc = doc_id, attempt, error = %err, "document write failed, retrying");
                    tokio::time::sleep(self.retry_base * 2u32.pow(attempt - 1)).await;
                }
            }
        }
    }

    async fn try_put(&self, doc_id: &str, mut body: Value) -> Result<(), SyncError> {
        // Carry the current revision; skip the write when the stored
        // content hash already matches.
        if let Ok(Some(existing)) = self.get_doc(doc_id).await {
            let existing_hash = existing.get("contentHash").and_then(Value::as_str);
            let new_hash = body.get("contentHash").and_then(Value::as_str);
            if existing_hash.is_some() && existing_hash == new_hash {
                tracing::debug!(doc = doc_id, "content unchanged, skipping upload");
                return Ok(());
            }
            if let (Some(object), Some(rev)) = (
                body.as_object_mut(),
                existing.get("_rev").and_then(Value::as_str),
            ) {
                object.insert("_rev".to_string(), Value::String(rev.to_string()));
            }
        }

        let payload = serde_json::to_vec(&body)?;
        if payload.len() > TARGET_DOC_BYTES * 3 / 2 {
            tracing::warn!(doc = doc_id, bytes = payload.len(), "document exceeds the safe size margin");
        }

        let url = self.doc_url(doc_id);
        let response = self
            .auth(self.client.put(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|err| SyncError::Network(classify_transport(&err, &url)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_else(|_| status.to_string());
        if status == StatusCode::PAYLOAD_TOO_LARGE || status == StatusCode::BAD_REQUEST {
            return Err(SyncError::Permanent {
                doc_id: doc_id.to_string(),
                message,
            });
        }
        Err(SyncError::Remote {
            doc_id: doc_id.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    /// Uploads a full snapshot: decks first (in bounded batches), the
    /// manifest strictly last.
    pub async fn upload_snapshot(&self, snapshot: &SyncSnapshot) -> Result<(), SyncError> {
        self.ensure_database().await?;
        let sanitized = sanitize_username(&snapshot.username);
        let now_iso = Utc::now().to_rfc3339();

        for batch in snapshot.decks.chunks(TRANSFER_BATCH) {
            let uploads = batch
                .iter()
                .map(|deck| self.upload_deck(&snapshot.username, &sanitized, deck, &now_iso));
            for result in futures::future::join_all(uploads).await {
                result?;
            }
        }

        let deck_ids: Vec<i64> = snapshot.decks.iter().map(|deck| deck.id).collect();
        let content_hash = hash_content(&serde_json::to_vec(&(
            &snapshot.settings,
            &snapshot.study_logs,
            &snapshot.card_statuses,
            &snapshot.bookmark_folders,
            &snapshot.bookmarks,
            &deck_ids,
        ))?);
        let manifest = ManifestDocument {
            username: snapshot.username.clone(),
            doc_type: "manifest".to_string(),
            version: 2,
            sync_timestamp: snapshot.sync_timestamp,
            settings: snapshot.settings.clone(),
            study_logs: snapshot.study_logs.clone(),
            card_statuses: snapshot.card_statuses.clone(),
            bookmark_folders: snapshot.bookmark_folders.clone(),
            bookmarks: snapshot.bookmarks.clone(),
            deck_ids,
            last_synced: now_iso,
            content_hash,
        };
        self.put_doc(&manifest_doc_id(&sanitized), serde_json::to_value(&manifest)?)
            .await
    }

    async fn upload_deck(
        &self,
        username: &str,
        sanitized: &str,
        deck: &Deck,
        now_iso: &str,
    ) -> Result<(), SyncError> {
        let plan = plan_deck_upload(username, sanitized, deck, now_iso)?;
        if !plan.skipped.is_empty() {
            tracing::warn!(
                deck = deck.id,
                skipped = plan.skipped.len(),
                "cards over the hard size ceiling were left out of the upload"
            );
        }
        // Chunks before the parent, parent before the manifest.
        for chunk in &plan.chunks {
            self.put_doc(
                &chunk_doc_id(sanitized, deck.id, chunk.index),
                serde_json::to_value(chunk)?,
            )
            .await?;
        }
        self.put_doc(&deck_doc_id(sanitized, deck.id), serde_json::to_value(&plan.parent)?)
            .await
    }

    /// Downloads and reassembles the remote snapshot, or `None` when the
    /// user has never uploaded.
    pub async fn download_snapshot(&self, username: &str) -> Result<Option<SyncSnapshot>, SyncError> {
        self.ensure_database().await?;
        let sanitized = sanitize_username(username);
        let Some(manifest_value) = self.get_doc(&manifest_doc_id(&sanitized)).await? else {
            return Ok(None);
        };
        let manifest: ManifestDocument = serde_json::from_value(manifest_value)?;
        if manifest.doc_type != "manifest" || manifest.version < 2 {
            tracing::warn!(user = %username, "remote manifest has an unsupported layout");
            return Ok(None);
        }

        let mut decks = Vec::with_capacity(manifest.deck_ids.len());
        for batch in manifest.deck_ids.chunks(TRANSFER_BATCH) {
            let fetches = batch.iter().map(|deck_id| self.fetch_deck(&sanitized, *deck_id));
            for result in futures::future::join_all(fetches).await {
                if let Some(deck) = result? {
                    decks.push(deck);
                }
            }
        }

        Ok(Some(SyncSnapshot {
            username: manifest.username,
            decks,
            settings: manifest.settings,
            study_logs: manifest.study_logs,
            card_statuses: manifest.card_statuses,
            bookmark_folders: manifest.bookmark_folders,
            bookmarks: manifest.bookmarks,
            sync_timestamp: manifest.sync_timestamp,
        }))
    }

    async fn fetch_deck(&self, sanitized: &str, deck_id: i64) -> Result<Option<Deck>, SyncError> {
        let doc_id = deck_doc_id(sanitized, deck_id);
        let Some(value) = self.get_doc(&doc_id).await? else {
            tracing::warn!(deck = deck_id, "manifest references a missing deck document");
            return Ok(None);
        };
        let document: DeckDocument = serde_json::from_value(value)?;
        if document.doc_type != "deck" {
            return Ok(None);
        }
        let mut deck = document.deck;
        if document.is_chunked.unwrap_or(false) {
            let mut indexed_cards = Vec::new();
            for chunk_id in document.chunk_ids.unwrap_or_default() {
                match self.get_doc(&chunk_id).await? {
                    Some(chunk_value) => {
                        let chunk: ChunkDocument = serde_json::from_value(chunk_value)?;
                        indexed_cards.push((chunk.index, chunk.cards));
                    }
                    None => {
                        tracing::warn!(chunk = %chunk_id, "chunk document missing, its cards are lost");
                    }
                }
            }
            indexed_cards.sort_by_key(|(index, _)| *index);
            deck.cards = indexed_cards
                .into_iter()
                .flat_map(|(_, cards)| cards)
                .collect();
        }
        Ok(Some(deck))
    }
}

/// Plans the documents for one deck. Pure: no I/O, fully testable.
fn plan_deck_upload(
    username: &str,
    sanitized: &str,
    deck: &Deck,
    now_iso: &str,
) -> Result<DeckUploadPlan, serde_json::Error> {
    let deck_json = serde_json::to_vec(&deck_without_media(deck))?;
    if deck_json.len() < TARGET_DOC_BYTES {
        return Ok(DeckUploadPlan {
            parent: DeckDocument {
                username: username.to_string(),
                doc_type: "deck".to_string(),
                deck: deck_without_media(deck),
                chunk_ids: None,
                is_chunked: None,
                total_cards: None,
                updated_at: now_iso.to_string(),
                content_hash: hash_content(&deck_json),
            },
            chunks: Vec::new(),
            skipped: Vec::new(),
        });
    }

    let mut chunks: Vec<ChunkDocument> = Vec::new();
    let mut skipped = Vec::new();
    let mut current: Vec<Card> = Vec::new();
    let mut current_bytes = 0usize;

    let mut flush = |current: &mut Vec<Card>, current_bytes: &mut usize, chunks: &mut Vec<ChunkDocument>| {
        if current.is_empty() {
            return;
        }
        let cards = std::mem::take(current);
        *current_bytes = 0;
        let content_hash = hash_content(&serde_json::to_vec(&cards).unwrap_or_default());
        chunks.push(ChunkDocument {
            username: username.to_string(),
            doc_type: "deck_chunk".to_string(),
            index: chunks.len(),
            deck_id: deck.id,
            cards,
            content_hash,
        });
    };

    for card in &deck.cards {
        // +2 for the comma/space overhead inside the serialized array.
        let card_bytes = serde_json::to_vec(card)?.len() + 2;
        if card_bytes > CARD_HARD_LIMIT_BYTES {
            tracing::warn!(card = card.id, bytes = card_bytes, "card exceeds the hard ceiling, skipping");
            skipped.push(card.id);
            continue;
        }
        if current_bytes + card_bytes > TARGET_DOC_BYTES && !current.is_empty() {
            flush(&mut current, &mut current_bytes, &mut chunks);
        }
        current.push(card.clone());
        current_bytes += card_bytes;
    }
    flush(&mut current, &mut current_bytes, &mut chunks);

    let total_cards = chunks.iter().map(|chunk| chunk.cards.len()).sum();
    let chunk_ids: Vec<String> = (0..chunks.len())
        .map(|index| chunk_doc_id(sanitized, deck.id, index))
        .collect();
    let content_hash = hash_content(&serde_json::to_vec(&serde_json::json!({
        "chunkIds": chunk_ids,
        "deckId": deck.id,
    }))?);

    Ok(DeckUploadPlan {
        parent: DeckDocument {
            username: username.to_string(),
            doc_type: "deck".to_string(),
            deck: Deck::new(deck.id, deck.name.clone()),
            chunk_ids: Some(chunk_ids),
            is_chunked: Some(true),
            total_cards: Some(total_cards),
            updated_at: now_iso.to_string(),
            content_hash,
        },
        chunks,
        skipped,
    })
}

fn deck_without_media(deck: &Deck) -> Deck {
    Deck {
        id: deck.id,
        name: deck.name.clone(),
        cards: deck.cards.clone(),
        media: Default::default(),
    }
}

/// Document ids use a lowercased, alphanumeric-only username.
pub fn sanitize_username(username: &str) -> String {
    username
        .to_lowercase()
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect()
}

pub fn manifest_doc_id(sanitized: &str) -> String {
    format!("user_{sanitized}")
}

pub fn deck_doc_id(sanitized: &str, deck_id: i64) -> String {
    format!("deck_{sanitized}_{deck_id}")
}

pub fn chunk_doc_id(sanitized: &str, deck_id: i64, index: usize) -> String {
    format!("deck_chunk_{sanitized}_{deck_id}_{index}")
}

/// SHA-256 hex digest used for skip-unchanged comparisons.
pub fn hash_content(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn classify_transport(err: &reqwest::Error, url: &str) -> String {
    if err.is_timeout() {
        format!("connection to {url} timed out")
    } else if err.is_connect() {
        format!(
            "cannot connect to the document store at {url}; check that the server is running and the URL is correct"
        )
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn card_of_size(id: i64, deck_id: i64, payload_bytes: usize) -> Card {
        Card {
            id,
            note_id: id,
            deck_id,
            ord: 0,
            front: "x".repeat(payload_bytes),
            back: String::new(),
        }
    }

    fn deck_with_cards(id: i64, cards: Vec<Card>) -> Deck {
        Deck {
            id,
            name: "Sized".to_string(),
            cards,
            media: Default::default(),
        }
    }

    #[test]
    fn small_deck_uploads_as_a_single_document() {
        // Just under the 200 KiB target.
        let deck = deck_with_cards(1, vec![card_of_size(1, 1, 190 * 1024)]);
        let plan = plan_deck_upload("Ada", "ada", &deck, "now").unwrap();
        assert!(plan.chunks.is_empty());
        assert!(plan.skipped.is_empty());
        assert_eq!(plan.parent.is_chunked, None);
        assert_eq!(plan.parent.deck.cards.len(), 1);
    }

    #[test]
    fn oversized_deck_splits_into_bounded_chunks() {
        let cards: Vec<Card> = (1..=5).map(|id| card_of_size(id, 1, 60 * 1024)).collect();
        let deck = deck_with_cards(1, cards);
        let plan = plan_deck_upload("Ada", "ada", &deck, "now").unwrap();

        assert!(plan.chunks.len() >= 2);
        for chunk in &plan.chunks {
            let cards_bytes: usize = chunk
                .cards
                .iter()
                .map(|card| serde_json::to_vec(card).unwrap().len() + 2)
                .sum();
            assert!(cards_bytes <= TARGET_DOC_BYTES, "chunk holds {cards_bytes} bytes");
        }
        assert_eq!(plan.parent.is_chunked, Some(true));
        assert_eq!(plan.parent.deck.cards.len(), 0);
        let chunked_total: usize = plan.chunks.iter().map(|chunk| chunk.cards.len()).sum();
        assert_eq!(plan.parent.total_cards, Some(chunked_total));
        assert_eq!(chunked_total, 5);
        assert_eq!(
            plan.parent.chunk_ids.as_ref().unwrap().len(),
            plan.chunks.len()
        );
    }

    #[test]
    fn chunk_indexes_are_sequential() {
        let cards: Vec<Card> = (1..=7).map(|id| card_of_size(id, 2, 60 * 1024)).collect();
        let plan = plan_deck_upload("Ada", "ada", &deck_with_cards(2, cards), "now").unwrap();
        let indexes: Vec<usize> = plan.chunks.iter().map(|chunk| chunk.index).collect();
        assert_eq!(indexes, (0..plan.chunks.len()).collect::<Vec<_>>());
        assert_eq!(
            plan.parent.chunk_ids.as_ref().unwrap()[0],
            "deck_chunk_ada_2_0"
        );
    }

    #[test]
    fn oversized_card_is_skipped_everywhere() {
        let mut cards: Vec<Card> = (1..=4).map(|id| card_of_size(id, 1, 60 * 1024)).collect();
        cards.insert(2, card_of_size(99, 1, 2 * 1024 * 1024));
        let deck = deck_with_cards(1, cards);
        let plan = plan_deck_upload("Ada", "ada", &deck, "now").unwrap();

        assert_eq!(plan.skipped, vec![99]);
        for chunk in &plan.chunks {
            assert!(chunk.cards.iter().all(|card| card.id != 99));
        }
        assert_eq!(plan.parent.total_cards, Some(4));
    }

    #[test]
    fn usernames_sanitize_to_doc_id_characters() {
        assert_eq!(sanitize_username("Ada.Lovelace@Example.com"), "ada_lovelace_example_com");
        assert_eq!(manifest_doc_id("ada"), "user_ada");
        assert_eq!(deck_doc_id("ada", 7), "deck_ada_7");
        assert_eq!(chunk_doc_id("ada", 7, 3), "deck_chunk_ada_7_3");
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let first = hash_content(b"same");
        let second = hash_content(b"same");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(hash_content(b"other"), first);
    }
}
