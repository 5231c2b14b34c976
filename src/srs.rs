use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gemini::Advisory;
use crate::models::{ConfidenceRating, Flashcard, ReviewContext, ReviewPatch};
use crate::store::EntityStore;

/// 6 minutes. Keeps even a tired "Again" from re-surfacing instantly.
pub const MIN_INTERVAL_HOURS: f64 = 0.1;
/// 30 days. A malformed advisory response cannot schedule a card past this.
pub const MAX_INTERVAL_HOURS: f64 = 720.0;

pub const ADVISORY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Deterministic interval policy: base hours by rating, scaled by the
/// multiplicative context modifiers. The same modifier applies to every
/// rating, so intervals stay non-decreasing in Again < Hard < Good < Easy.
pub fn fallback_hours(rating: ConfidenceRating, context: &ReviewContext) -> f64 {
    rating.base_hours()
        * context.mood_factor()
        * context.energy_factor()
        * context.difficulty_factor()
}

/// Applied to every interval regardless of whether it came from the
/// fallback policy or the advisory.
pub fn clamp_hours(hours: f64) -> f64 {
    hours.clamp(MIN_INTERVAL_HOURS, MAX_INTERVAL_HOURS)
}

fn hours_after(now: DateTime<Utc>, hours: f64) -> DateTime<Utc> {
    now + Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

#[derive(Debug)]
pub struct GradeOutcome {
    pub card: Flashcard,
    /// Present only when the advisory supplied the interval.
    pub advisory_reasoning: Option<String>,
}

/// Computes and persists the next review time for a graded card.
pub struct Scheduler {
    store: Arc<dyn EntityStore>,
    advisory: Option<Arc<dyn Advisory>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn EntityStore>, advisory: Option<Arc<dyn Advisory>>) -> Self {
        Self { store, advisory }
    }

    pub async fn grade_card(
        &self,
        flashcard_id: Uuid,
        rating: ConfidenceRating,
        context: &ReviewContext,
        expected_version: Option<i64>,
    ) -> Result<GradeOutcome> {
        self.grade_card_at(flashcard_id, rating, context, expected_version, Utc::now())
            .await
    }

    /// Same as `grade_card` with an injectable clock.
    pub async fn grade_card_at(
        &self,
        flashcard_id: Uuid,
        rating: ConfidenceRating,
        context: &ReviewContext,
        expected_version: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<GradeOutcome> {
        let card = self
            .store
            .get_flashcard(flashcard_id)
            .await?
            .ok_or(Error::NotFound("flashcard", flashcard_id))?;

        // A caller-supplied version that is already stale fails before any
        // advisory work. Otherwise the commit is conditional on the version
        // we just read, so a concurrent grading still loses cleanly.
        let read_version = card.version;
        if let Some(expected) = expected_version {
            if expected != read_version {
                return Err(Error::Conflict {
                    id: flashcard_id,
                    expected,
                });
            }
        }

        let mut hours = fallback_hours(rating, context);
        let mut advisory_reasoning = None;

        if let Some(advisory) = &self.advisory {
            match tokio::time::timeout(ADVISORY_TIMEOUT, advisory.suggest_interval(rating, context))
                .await
            {
                Ok(Ok(hint)) if hint.next_review_hours.is_finite() && hint.next_review_hours > 0.0 => {
                    // Substitution, not an adjustment: the advisory value
                    // replaces the fallback entirely. Clamping still applies.
                    hours = hint.next_review_hours;
                    advisory_reasoning = Some(hint.reasoning);
                }
                Ok(Ok(hint)) => {
                    log::warn!(
                        "advisory returned unusable interval {}, using fallback",
                        hint.next_review_hours
                    );
                }
                Ok(Err(err)) => {
                    log::warn!("advisory call failed, using fallback: {err:#}");
                }
                Err(_) => {
                    log::warn!("advisory timed out after {ADVISORY_TIMEOUT:?}, using fallback");
                }
            }
        }

        let final_hours = clamp_hours(hours);
        let patch = ReviewPatch {
            confidence_level: rating.as_u8(),
            last_reviewed: now,
            next_review: hours_after(now, final_hours),
        };

        let card = self
            .store
            .update_flashcard(flashcard_id, patch, read_version)
            .await?;

        log::debug!(
            "card {} graded {} -> next review in {:.2}h",
            card.id,
            rating.label(),
            final_hours
        );

        Ok(GradeOutcome {
            card,
            advisory_reasoning,
        })
    }
}
