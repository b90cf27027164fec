//! Core types for the flowcards study application.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deck id of the synthetic "today's review" aggregate. Never persisted.
pub const REVIEW_DECK_ID: i64 = -999;

/// Deck id of the synthetic single-card preview deck. Never persisted.
pub const PREVIEW_DECK_ID: i64 = -1;

/// A single flashcard decoded from a package or created in the app.
///
/// `front` and `back` hold HTML-ish markup. `back` is composed from all
/// trailing note fields; `front` may carry cloze markers and media tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: i64,
    pub note_id: i64,
    pub deck_id: i64,
    pub ord: u32,
    pub front: String,
    pub back: String,
}

/// A deck of cards.
///
/// `media` is populated transiently by the package decoder for decks that
/// reference media blobs; it lives for the parse session only and is never
/// serialized or persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: i64,
    pub name: String,
    pub cards: Vec<Card>,
    #[serde(skip)]
    pub media: HashMap<String, Vec<u8>>,
}

impl Deck {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cards: Vec::new(),
            media: HashMap::new(),
        }
    }

    /// Synthetic decks (review aggregate, single-card preview) are
    /// session-only and must never reach the local store.
    pub fn is_synthetic(&self) -> bool {
        self.id == REVIEW_DECK_ID || self.id == PREVIEW_DECK_ID
    }
}

/// Review scheduling state of one card for one user.
///
/// Replaces a two-valued status flag crossed with an optional timestamp; the
/// "completed but still scheduled" combination is unrepresentable here. The
/// legacy pair survives only as the storage and wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewState {
    /// A status row exists (the card has been seen) but no review is scheduled.
    Unscheduled,
    /// Due for review at `next_review_at` (epoch milliseconds).
    #[serde(rename_all = "camelCase")]
    Scheduled { next_review_at: i64 },
    /// Cleared from the review queue for good.
    Mastered,
}

impl ReviewState {
    pub fn next_review_at(&self) -> Option<i64> {
        match self {
            Self::Scheduled { next_review_at } => Some(*next_review_at),
            _ => None,
        }
    }

    pub fn is_mastered(&self) -> bool {
        matches!(self, Self::Mastered)
    }
}

/// Per-user review state of one card, keyed `(username, deck_id, card_id)`.
/// One row per card per user, overwritten in place on every grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardStatus {
    pub username: String,
    pub deck_id: i64,
    pub card_id: i64,
    #[serde(flatten)]
    pub state: ReviewState,
}

/// Unique cards studied by one user on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyLog {
    pub username: String,
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub card_ids: Vec<i64>,
}

impl StudyLog {
    pub fn new(username: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            date: date.into(),
            card_ids: Vec::new(),
        }
    }

    /// Appends a card id once per day. Duplicates are rejected by membership
    /// check so insertion order is preserved and counts stay exact.
    pub fn record(&mut self, card_id: i64) -> bool {
        if self.card_ids.contains(&card_id) {
            return false;
        }
        self.card_ids.push(card_id);
        true
    }
}

/// A user-named folder grouping bookmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkFolder {
    pub id: String,
    pub name: String,
    pub username: String,
}

impl BookmarkFolder {
    pub fn new(name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            username: username.into(),
        }
    }
}

/// A saved card. Carries a denormalized copy of the card content and deck
/// name so it survives deletion of the originating deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub username: String,
    pub folder_id: String,
    pub card: Card,
    pub deck_name: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl Bookmark {
    pub fn new(
        username: impl Into<String>,
        folder_id: impl Into<String>,
        card: Card,
        deck_name: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.into(),
            folder_id: folder_id.into(),
            card,
            deck_name: deck_name.into(),
            created_at,
        }
    }
}

/// Entity class a deletion marker refers to.
///
/// Folder deletion records a `Bookmark`-kind tombstone carrying the folder
/// id; bookmarks removed by the folder cascade do not get their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TombstoneKind {
    Deck,
    Card,
    Bookmark,
}

impl TombstoneKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deck => "deck",
            Self::Card => "card",
            Self::Bookmark => "bookmark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deck" => Some(Self::Deck),
            "card" => Some(Self::Card),
            "bookmark" => Some(Self::Bookmark),
            _ => None,
        }
    }
}

/// Deletion marker, kept so a merge can tell "never existed" apart from
/// "existed and was removed". Pruned after a retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub username: String,
    pub kind: TombstoneKind,
    pub id: String,
    /// Epoch milliseconds.
    pub deleted_at: i64,
}

/// AI provider selection, stored but only exercised by the (out of scope)
/// explanation feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    Gemini,
    OpenAi,
    Perplexity,
    Custom,
}

impl Default for AiProvider {
    fn default() -> Self {
        Self::Gemini
    }
}

/// Per-provider API keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeys {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perplexity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
}

/// Remote document-store credentials stored per user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDbConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
}

/// Per-user settings, loaded at session start and shallow-merged with the
/// in-memory defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub provider: AiProvider,
    pub model: String,
    #[serde(default)]
    pub api_keys: ApiKeys,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_config: Option<RemoteDbConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: AiProvider::default(),
            model: "gemini-3-flash-preview".to_string(),
            api_keys: ApiKeys::default(),
            custom_endpoint: None,
            custom_model: None,
            db_config: None,
        }
    }
}

impl Settings {
    /// Shallow merge: incoming top-level fields override, fields the incoming
    /// side does not carry keep their existing value.
    pub fn merged_with(&self, incoming: &Settings) -> Settings {
        Settings {
            provider: incoming.provider,
            model: incoming.model.clone(),
            api_keys: incoming.api_keys.clone(),
            custom_endpoint: incoming
                .custom_endpoint
                .clone()
                .or_else(|| self.custom_endpoint.clone()),
            custom_model: incoming
                .custom_model
                .clone()
                .or_else(|| self.custom_model.clone()),
            db_config: incoming.db_config.clone().or_else(|| self.db_config.clone()),
        }
    }
}

/// A due card resolved against the in-memory deck list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueCard {
    pub card: Card,
    pub deck_name: String,
}

/// Ephemeral aggregate of all of one user's data, produced by export and
/// consumed by upload and merge-on-download. Never persisted as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub username: String,
    pub decks: Vec<Deck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub study_logs: Vec<StudyLog>,
    #[serde(default)]
    pub card_statuses: Vec<CardStatus>,
    #[serde(default)]
    pub bookmark_folders: Vec<BookmarkFolder>,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
    /// Epoch milliseconds at export time.
    pub sync_timestamp: i64,
}
