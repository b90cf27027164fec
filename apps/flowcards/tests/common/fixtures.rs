//! Domain-object builders shared across integration tests.

use flowcards_core::types::{
    Bookmark, BookmarkFolder, Card, CardStatus, Deck, ReviewState, StudyLog,
};

pub const USER: &str = "ada";

pub fn card(id: i64, deck_id: i64, front: &str) -> Card {
    Card {
        id,
        note_id: id,
        deck_id,
        ord: 0,
        front: front.to_string(),
        back: format!("back of {id}"),
    }
}

pub fn deck(id: i64, name: &str, cards: Vec<Card>) -> Deck {
    Deck {
        id,
        name: name.to_string(),
        cards,
        media: Default::default(),
    }
}

pub fn status(deck_id: i64, card_id: i64, state: ReviewState) -> CardStatus {
    CardStatus {
        username: USER.to_string(),
        deck_id,
        card_id,
        state,
    }
}

pub fn study_log(date: &str, card_ids: &[i64]) -> StudyLog {
    StudyLog {
        username: USER.to_string(),
        date: date.to_string(),
        card_ids: card_ids.to_vec(),
    }
}

pub fn folder(id: &str, name: &str) -> BookmarkFolder {
    BookmarkFolder {
        id: id.to_string(),
        name: name.to_string(),
        username: USER.to_string(),
    }
}

pub fn bookmark(id: &str, folder_id: &str, card_id: i64, created_at: i64) -> Bookmark {
    Bookmark {
        id: id.to_string(),
        username: USER.to_string(),
        folder_id: folder_id.to_string(),
        card: card(card_id, 1, "bookmarked"),
        deck_name: "Anatomy".to_string(),
        created_at,
    }
}
