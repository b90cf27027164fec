//! Review scheduling: a fixed interval table applied over [`ReviewState`].
//!
//! The table is a policy constant, not derived from review history. There is
//! no ease factor and no per-card weighting.

use chrono::{DateTime, Utc};

use crate::types::ReviewState;

/// One calendar day in milliseconds.
pub const DAY_MS: i64 = 86_400_000;

/// Interval value that permanently clears a card from the review queue.
pub const MASTERED_INTERVAL: i64 = -1;

/// Review grades offered after flipping a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    TryAgain,
    Hard,
    Good,
    Easy,
    /// Terminal "mastered" grade, offered only inside the synthetic
    /// review-all-due session.
    Done,
}

impl Grade {
    /// Grade → interval table.
    pub fn interval_days(self) -> i64 {
        match self {
            Self::TryAgain => 0,
            Self::Hard => 1,
            Self::Good => 7,
            Self::Easy => 30,
            Self::Done => MASTERED_INTERVAL,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "again" | "try-again" => Some(Self::TryAgain),
            "hard" => Some(Self::Hard),
            "good" => Some(Self::Good),
            "easy" => Some(Self::Easy),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn review_mode_only(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Applies a grading interval at `now_ms`.
///
/// `-1` masters the card (terminal), `0` makes it due immediately again,
/// anything positive schedules it that many days out.
pub fn apply_grade(interval_days: i64, now_ms: i64) -> ReviewState {
    if interval_days < 0 {
        return ReviewState::Mastered;
    }
    ReviewState::Scheduled {
        next_review_at: now_ms + interval_days * DAY_MS,
    }
}

/// First-flip bookkeeping: keeps whatever state already exists, otherwise
/// starts the card as unscheduled. Idempotent.
pub fn mark_read(existing: Option<ReviewState>) -> ReviewState {
    existing.unwrap_or(ReviewState::Unscheduled)
}

/// A card is due once its scheduled timestamp is at or before `now_ms`.
pub fn is_due(state: &ReviewState, now_ms: i64) -> bool {
    matches!(state, ReviewState::Scheduled { next_review_at } if *next_review_at <= now_ms)
}

/// Calendar day used as the study-log key.
pub fn study_date(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}
