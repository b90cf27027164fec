//! Snapshot merge rules for multi-device reconciliation.
//!
//! Every function is pure: it takes both replicas' rows and returns the
//! merged rows, preserving first-seen order. Deletion tombstones are
//! consulted so entities removed on this replica do not resurrect from a
//! remote snapshot while their tombstone is still live.

use std::collections::{HashMap, HashSet};

use crate::types::{
    Bookmark, BookmarkFolder, CardStatus, Deck, ReviewState, StudyLog, Tombstone, TombstoneKind,
};

/// Live deletion markers indexed for merge lookups.
#[derive(Debug, Default)]
pub struct TombstoneIndex {
    entries: HashSet<(TombstoneKind, String)>,
}

impl TombstoneIndex {
    pub fn new(tombstones: &[Tombstone]) -> Self {
        Self {
            entries: tombstones
                .iter()
                .map(|tombstone| (tombstone.kind, tombstone.id.clone()))
                .collect(),
        }
    }

    pub fn contains(&self, kind: TombstoneKind, id: &str) -> bool {
        self.entries.contains(&(kind, id.to_string()))
    }
}

/// Union by deck id. Cards of a deck present on both sides are unioned by
/// card id with incoming content overwriting existing content (schedules
/// live in [`CardStatus`] and are merged separately); deck names follow the
/// incoming side. New incoming decks and cards are suppressed while a
/// matching tombstone is live.
pub fn merge_decks(existing: Vec<Deck>, incoming: Vec<Deck>, tombstones: &TombstoneIndex) -> Vec<Deck> {
    let mut order: Vec<i64> = Vec::with_capacity(existing.len());
    let mut by_id: HashMap<i64, Deck> = HashMap::with_capacity(existing.len());
    for deck in existing {
        order.push(deck.id);
        by_id.insert(deck.id, deck);
    }

    for deck in incoming {
        match by_id.get_mut(&deck.id) {
            Some(current) => {
                let mut index: HashMap<i64, usize> = current
                    .cards
                    .iter()
                    .enumerate()
                    .map(|(position, card)| (card.id, position))
                    .collect();
                for card in deck.cards {
                    match index.get(&card.id) {
                        Some(&position) => current.cards[position] = card,
                        None => {
                            if tombstones.contains(TombstoneKind::Card, &card.id.to_string()) {
                                continue;
                            }
                            index.insert(card.id, current.cards.len());
                            current.cards.push(card);
                        }
                    }
                }
                if current.name != deck.name {
                    current.name = deck.name;
                }
            }
            None => {
                if tombstones.contains(TombstoneKind::Deck, &deck.id.to_string()) {
                    continue;
                }
                order.push(deck.id);
                by_id.insert(deck.id, deck);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect()
}

/// Union by date; a date present on both sides gets the set union of card
/// ids, first-seen order preserved, so daily counts are additive.
pub fn merge_study_logs(existing: Vec<StudyLog>, incoming: Vec<StudyLog>) -> Vec<StudyLog> {
    let mut order: Vec<String> = Vec::with_capacity(existing.len());
    let mut by_date: HashMap<String, StudyLog> = HashMap::with_capacity(existing.len());
    for log in existing {
        order.push(log.date.clone());
        by_date.insert(log.date.clone(), log);
    }

    for log in incoming {
        match by_date.get_mut(&log.date) {
            Some(current) => {
                for card_id in log.card_ids {
                    current.record(card_id);
                }
            }
            None => {
                order.push(log.date.clone());
                by_date.insert(log.date.clone(), log);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|date| by_date.remove(&date))
        .collect()
}

/// Keyed by `(deck_id, card_id)`. The side with the later scheduled
/// timestamp wins ("more progressed"); a scheduled side beats an
/// unscheduled one; with neither scheduled, a mastered side wins.
pub fn merge_card_statuses(existing: Vec<CardStatus>, incoming: Vec<CardStatus>) -> Vec<CardStatus> {
    let mut order: Vec<(i64, i64)> = Vec::with_capacity(existing.len());
    let mut by_key: HashMap<(i64, i64), CardStatus> = HashMap::with_capacity(existing.len());
    for status in existing {
        let key = (status.deck_id, status.card_id);
        order.push(key);
        by_key.insert(key, status);
    }

    for status in incoming {
        let key = (status.deck_id, status.card_id);
        match by_key.get_mut(&key) {
            Some(current) => {
                if incoming_wins(&current.state, &status.state) {
                    *current = status;
                }
            }
            None => {
                order.push(key);
                by_key.insert(key, status);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

fn incoming_wins(existing: &ReviewState, incoming: &ReviewState) -> bool {
    match (existing.next_review_at(), incoming.next_review_at()) {
        (Some(existing_at), Some(incoming_at)) => incoming_at > existing_at,
        (Some(_), None) => false,
        (None, Some(_)) => true,
        (None, None) => incoming.is_mastered(),
    }
}

/// Union by folder id; a folder present on both sides is overwritten by the
/// incoming copy (folders carry no competing-edit-detectable field besides
/// identity). New incoming folders honor their tombstones.
pub fn merge_folders(
    existing: Vec<BookmarkFolder>,
    incoming: Vec<BookmarkFolder>,
    tombstones: &TombstoneIndex,
) -> Vec<BookmarkFolder> {
    let mut order: Vec<String> = Vec::with_capacity(existing.len());
    let mut by_id: HashMap<String, BookmarkFolder> = HashMap::with_capacity(existing.len());
    for folder in existing {
        order.push(folder.id.clone());
        by_id.insert(folder.id.clone(), folder);
    }

    for folder in incoming {
        if by_id.contains_key(&folder.id) {
            by_id.insert(folder.id.clone(), folder);
        } else {
            if tombstones.contains(TombstoneKind::Bookmark, &folder.id) {
                continue;
            }
            order.push(folder.id.clone());
            by_id.insert(folder.id.clone(), folder);
        }
    }

    order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect()
}

/// Union by bookmark id; conflicting ids keep the later `created_at`. New
/// incoming bookmarks are suppressed by their own tombstone or by the
/// tombstone of the folder they point into (folder deletion cascades do not
/// tombstone each bookmark individually).
pub fn merge_bookmarks(
    existing: Vec<Bookmark>,
    incoming: Vec<Bookmark>,
    tombstones: &TombstoneIndex,
) -> Vec<Bookmark> {
    let mut order: Vec<String> = Vec::with_capacity(existing.len());
    let mut by_id: HashMap<String, Bookmark> = HashMap::with_capacity(existing.len());
    for bookmark in existing {
        order.push(bookmark.id.clone());
        by_id.insert(bookmark.id.clone(), bookmark);
    }

    for bookmark in incoming {
        match by_id.get_mut(&bookmark.id) {
            Some(current) => {
                if bookmark.created_at > current.created_at {
                    *current = bookmark;
                }
            }
            None => {
                if tombstones.contains(TombstoneKind::Bookmark, &bookmark.id)
                    || tombstones.contains(TombstoneKind::Bookmark, &bookmark.folder_id)
                {
                    continue;
                }
                order.push(bookmark.id.clone());
                by_id.insert(bookmark.id.clone(), bookmark);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect()
}
