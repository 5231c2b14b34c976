use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Learner's self-assessment of recall quality on the 1-4 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceRating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl ConfidenceRating {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            other => Err(Error::Validation(format!(
                "confidence rating must be between 1 and 4, got {other}"
            ))),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Again => "Again",
            Self::Hard => "Hard",
            Self::Good => "Good",
            Self::Easy => "Easy",
        }
    }

    /// Deterministic base interval before context modifiers are applied.
    pub fn base_hours(self) -> f64 {
        match self {
            Self::Again => 0.25,
            Self::Hard => 24.0,
            Self::Good => 72.0,
            Self::Easy => 168.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Motivated,
    #[default]
    Neutral,
    Tired,
    Stressed,
    Excited,
}

impl Mood {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Motivated => "motivated",
            Self::Neutral => "neutral",
            Self::Tired => "tired",
            Self::Stressed => "stressed",
            Self::Excited => "excited",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl SubjectDifficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// Learner context for one grading event. Not persisted; only feeds the
/// interval computation and the advisory prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewContext {
    pub mood: Mood,
    pub energy_level: u8,
    pub subject_difficulty: SubjectDifficulty,
    pub weekly_study_hours: f64,
}

impl Default for ReviewContext {
    fn default() -> Self {
        Self {
            mood: Mood::Neutral,
            energy_level: 5,
            subject_difficulty: SubjectDifficulty::Medium,
            weekly_study_hours: 4.0,
        }
    }
}

impl ReviewContext {
    /// Builds a context from optional request fields, filling gaps with
    /// neutral defaults and rejecting out-of-range values.
    pub fn from_parts(
        mood: Option<Mood>,
        energy_level: Option<u8>,
        subject_difficulty: Option<SubjectDifficulty>,
        weekly_study_hours: Option<f64>,
    ) -> Result<Self> {
        let defaults = Self::default();

        let energy_level = energy_level.unwrap_or(defaults.energy_level);
        if !(1..=10).contains(&energy_level) {
            return Err(Error::Validation(format!(
                "energy level must be between 1 and 10, got {energy_level}"
            )));
        }

        let weekly_study_hours = weekly_study_hours.unwrap_or(defaults.weekly_study_hours);
        if !weekly_study_hours.is_finite() || weekly_study_hours <= 0.0 {
            return Err(Error::Validation(format!(
                "weekly study hours must be a positive number, got {weekly_study_hours}"
            )));
        }

        Ok(Self {
            mood: mood.unwrap_or_default(),
            energy_level,
            subject_difficulty: subject_difficulty.unwrap_or_default(),
            weekly_study_hours,
        })
    }

    pub fn mood_factor(&self) -> f64 {
        match self.mood {
            Mood::Tired | Mood::Stressed => 0.6,
            Mood::Motivated | Mood::Excited => 1.15,
            Mood::Neutral => 1.0,
        }
    }

    pub fn energy_factor(&self) -> f64 {
        if self.energy_level < 4 {
            0.75
        } else if self.energy_level > 7 {
            1.1
        } else {
            1.0
        }
    }

    pub fn difficulty_factor(&self) -> f64 {
        match self.subject_difficulty {
            SubjectDifficulty::Hard => 0.8,
            SubjectDifficulty::Easy => 1.2,
            SubjectDifficulty::Medium => 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(user_id: Uuid, title: String, subject: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            subject,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deck_id: Uuid,
    /// Display order within the deck; irrelevant to scheduling.
    pub position: i64,
    pub question: String,
    pub answer: String,
    /// 1 means "never graded".
    pub confidence_level: u8,
    /// None until the card is graded for the first time.
    pub last_reviewed: Option<DateTime<Utc>>,
    pub next_review: DateTime<Utc>,
    /// Bumped by exactly 1 on every successful update; never decreases.
    pub version: i64,
}

impl Flashcard {
    /// New cards default `next_review` to their creation time so they are
    /// immediately due.
    pub fn new(
        deck_id: Uuid,
        user_id: Uuid,
        position: i64,
        question: String,
        answer: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            deck_id,
            position,
            question,
            answer,
            confidence_level: 1,
            last_reviewed: None,
            next_review: created_at,
            version: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }
}

/// The fields a grading event writes. Applied as a single unit together
/// with the version bump.
#[derive(Debug, Clone, Copy)]
pub struct ReviewPatch {
    pub confidence_level: u8,
    pub last_reviewed: DateTime<Utc>,
    pub next_review: DateTime<Utc>,
}
