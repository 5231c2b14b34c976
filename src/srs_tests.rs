use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::Error;
use crate::gemini::{Advisory, AdvisoryHint};
use crate::models::{ConfidenceRating, Deck, Flashcard, Mood, ReviewContext, SubjectDifficulty};
use crate::srs::{clamp_hours, fallback_hours, Scheduler, MAX_INTERVAL_HOURS, MIN_INTERVAL_HOURS};
use crate::store::{EntityStore, MemoryStore};

const RATINGS: [ConfidenceRating; 4] = [
    ConfidenceRating::Again,
    ConfidenceRating::Hard,
    ConfidenceRating::Good,
    ConfidenceRating::Easy,
];

fn ctx(mood: Mood, energy_level: u8, subject_difficulty: SubjectDifficulty) -> ReviewContext {
    ReviewContext {
        mood,
        energy_level,
        subject_difficulty,
        weekly_study_hours: 4.0,
    }
}

async fn seed_card(store: &MemoryStore) -> Flashcard {
    let now = Utc::now();
    let deck = Deck::new(Uuid::new_v4(), "Physics".into(), "Science".into(), now);
    let card = Flashcard::new(
        deck.id,
        deck.user_id,
        0,
        "What is inertia?".into(),
        "Resistance to a change in motion".into(),
        now,
    );
    store
        .insert_deck(&deck, std::slice::from_ref(&card))
        .await
        .unwrap();
    card
}

struct FixedAdvisory {
    hours: f64,
}

#[async_trait]
impl Advisory for FixedAdvisory {
    async fn suggest_interval(
        &self,
        _rating: ConfidenceRating,
        _context: &ReviewContext,
    ) -> anyhow::Result<AdvisoryHint> {
        Ok(AdvisoryHint {
            next_review_hours: self.hours,
            reasoning: "model suggestion".into(),
        })
    }
}

struct StallingAdvisory;

#[async_trait]
impl Advisory for StallingAdvisory {
    async fn suggest_interval(
        &self,
        _rating: ConfidenceRating,
        _context: &ReviewContext,
    ) -> anyhow::Result<AdvisoryHint> {
        std::future::pending::<anyhow::Result<AdvisoryHint>>().await
    }
}

struct FailingAdvisory;

#[async_trait]
impl Advisory for FailingAdvisory {
    async fn suggest_interval(
        &self,
        _rating: ConfidenceRating,
        _context: &ReviewContext,
    ) -> anyhow::Result<AdvisoryHint> {
        Err(anyhow!("advisory offline"))
    }
}

fn fallback_scheduler(store: Arc<MemoryStore>) -> Scheduler {
    Scheduler::new(store, None)
}

fn advisory_scheduler(store: Arc<MemoryStore>, advisory: impl Advisory + 'static) -> Scheduler {
    Scheduler::new(store, Some(Arc::new(advisory) as Arc<dyn Advisory>))
}

#[test]
fn base_hours_with_default_context() {
    let context = ReviewContext::default();
    let expected = [0.25, 24.0, 72.0, 168.0];
    for (rating, hours) in RATINGS.into_iter().zip(expected) {
        assert_eq!(fallback_hours(rating, &context), hours);
    }
}

#[test]
fn interval_is_monotonic_in_rating() {
    let contexts = [
        ReviewContext::default(),
        ctx(Mood::Tired, 2, SubjectDifficulty::Hard),
        ctx(Mood::Excited, 9, SubjectDifficulty::Easy),
        ctx(Mood::Stressed, 10, SubjectDifficulty::Medium),
    ];
    for context in &contexts {
        let hours: Vec<f64> = RATINGS
            .into_iter()
            .map(|r| clamp_hours(fallback_hours(r, context)))
            .collect();
        for pair in hours.windows(2) {
            assert!(pair[0] <= pair[1], "expected {} <= {}", pair[0], pair[1]);
        }
    }
}

#[test]
fn tired_low_energy_again_stays_above_minimum() {
    // 0.25 * 0.6 * 0.75 * 1.0 = 0.1125, just above the 6-minute floor
    let context = ctx(Mood::Tired, 3, SubjectDifficulty::Medium);
    let raw = fallback_hours(ConfidenceRating::Again, &context);
    assert!((raw - 0.1125).abs() < 1e-9);
    assert_eq!(clamp_hours(raw), raw);
    assert!(clamp_hours(raw) >= MIN_INTERVAL_HOURS);
}

#[test]
fn shortest_interval_clamps_to_minimum() {
    // 0.25 * 0.6 * 0.75 * 0.8 = 0.09, below the 6-minute floor
    let context = ctx(Mood::Tired, 3, SubjectDifficulty::Hard);
    let raw = fallback_hours(ConfidenceRating::Again, &context);
    assert!((raw - 0.09).abs() < 1e-9);
    assert_eq!(clamp_hours(raw), MIN_INTERVAL_HOURS);
}

#[test]
fn motivated_easy_stays_within_bounds() {
    // 168 * 1.15 * 1.1 * 1.2 = 255.024 hours, roughly 10.6 days
    let context = ctx(Mood::Motivated, 9, SubjectDifficulty::Easy);
    let raw = fallback_hours(ConfidenceRating::Easy, &context);
    assert!((raw - 255.024).abs() < 1e-9);
    assert_eq!(clamp_hours(raw), raw);
}

#[test]
fn rating_outside_domain_is_rejected() {
    for bad in [0u8, 5, 42] {
        assert!(matches!(
            ConfidenceRating::from_u8(bad),
            Err(Error::Validation(_))
        ));
    }
}

#[test]
fn context_factory_rejects_out_of_range() {
    assert!(matches!(
        ReviewContext::from_parts(None, Some(0), None, None),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        ReviewContext::from_parts(None, Some(11), None, None),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        ReviewContext::from_parts(None, None, None, Some(-1.0)),
        Err(Error::Validation(_))
    ));

    let defaults = ReviewContext::from_parts(None, None, None, None).unwrap();
    assert_eq!(defaults, ReviewContext::default());
}

#[tokio::test]
async fn grading_persists_all_fields_together() {
    let store = Arc::new(MemoryStore::new());
    let card = seed_card(&store).await;
    let scheduler = fallback_scheduler(store.clone());

    let now = Utc::now();
    let outcome = scheduler
        .grade_card_at(
            card.id,
            ConfidenceRating::Good,
            &ReviewContext::default(),
            None,
            now,
        )
        .await
        .unwrap();

    let updated = outcome.card;
    assert_eq!(updated.confidence_level, 3);
    assert_eq!(updated.last_reviewed, Some(now));
    assert_eq!(updated.version, 1);
    let elapsed_hours = (updated.next_review - now).num_minutes() as f64 / 60.0;
    assert!((elapsed_hours - 72.0).abs() < 0.01);
    assert!(updated.next_review >= updated.last_reviewed.unwrap());
    assert!(outcome.advisory_reasoning.is_none());

    let stored = store.get_flashcard(card.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.next_review, updated.next_review);
}

#[tokio::test]
async fn grading_is_idempotent_under_fixed_clock() {
    let store = Arc::new(MemoryStore::new());
    let card = seed_card(&store).await;
    let scheduler = fallback_scheduler(store);

    let now = Utc::now();
    let context = ctx(Mood::Tired, 6, SubjectDifficulty::Hard);

    let first = scheduler
        .grade_card_at(card.id, ConfidenceRating::Hard, &context, None, now)
        .await
        .unwrap();
    let second = scheduler
        .grade_card_at(card.id, ConfidenceRating::Hard, &context, None, now)
        .await
        .unwrap();

    // next_review is a pure function of rating, context, and now
    assert_eq!(first.card.next_review, second.card.next_review);
    assert_eq!(second.card.version, 2);
}

#[tokio::test]
async fn grading_unknown_card_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = fallback_scheduler(store);

    let result = scheduler
        .grade_card(
            Uuid::new_v4(),
            ConfidenceRating::Good,
            &ReviewContext::default(),
            None,
        )
        .await;
    assert!(matches!(result, Err(Error::NotFound("flashcard", _))));
}

#[tokio::test]
async fn stale_expected_version_conflicts_without_mutation() {
    let store = Arc::new(MemoryStore::new());
    let card = seed_card(&store).await;
    let scheduler = fallback_scheduler(store.clone());

    let result = scheduler
        .grade_card(
            card.id,
            ConfidenceRating::Easy,
            &ReviewContext::default(),
            Some(7),
        )
        .await;
    assert!(matches!(result, Err(Error::Conflict { .. })));

    let stored = store.get_flashcard(card.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 0);
    assert_eq!(stored.confidence_level, 1);
    assert!(stored.last_reviewed.is_none());
}

#[tokio::test]
async fn racing_grades_produce_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let card = seed_card(&store).await;
    let scheduler = Arc::new(fallback_scheduler(store.clone()));

    let now = Utc::now();
    let context = ReviewContext::default();
    let hard = scheduler.grade_card_at(card.id, ConfidenceRating::Hard, &context, Some(0), now);
    let easy = scheduler.grade_card_at(card.id, ConfidenceRating::Easy, &context, Some(0), now);

    let (hard_result, easy_result) = tokio::join!(hard, easy);

    let winners = [hard_result.is_ok(), easy_result.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(winners, 1);

    // The persisted state matches the winner exactly, never a mix.
    let stored = store.get_flashcard(card.id).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    match (hard_result, easy_result) {
        (Ok(outcome), Err(Error::Conflict { .. })) | (Err(Error::Conflict { .. }), Ok(outcome)) => {
            assert_eq!(stored.confidence_level, outcome.card.confidence_level);
            assert_eq!(stored.next_review, outcome.card.next_review);
        }
        other => panic!("expected one success and one conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn advisory_interval_substitutes_fallback() {
    let store = Arc::new(MemoryStore::new());
    let card = seed_card(&store).await;
    let scheduler = advisory_scheduler(store, FixedAdvisory { hours: 10.0 });

    let now = Utc::now();
    let outcome = scheduler
        .grade_card_at(
            card.id,
            ConfidenceRating::Good,
            &ReviewContext::default(),
            None,
            now,
        )
        .await
        .unwrap();

    let elapsed_hours = (outcome.card.next_review - now).num_minutes() as f64 / 60.0;
    assert!((elapsed_hours - 10.0).abs() < 0.01);
    assert_eq!(outcome.advisory_reasoning.as_deref(), Some("model suggestion"));
}

#[tokio::test]
async fn oversized_advisory_interval_is_clamped() {
    let store = Arc::new(MemoryStore::new());
    let card = seed_card(&store).await;
    let scheduler = advisory_scheduler(store, FixedAdvisory { hours: 10_000.0 });

    let now = Utc::now();
    let outcome = scheduler
        .grade_card_at(
            card.id,
            ConfidenceRating::Again,
            &ReviewContext::default(),
            None,
            now,
        )
        .await
        .unwrap();

    let elapsed_hours = (outcome.card.next_review - now).num_minutes() as f64 / 60.0;
    assert!((elapsed_hours - MAX_INTERVAL_HOURS).abs() < 0.01);
}

#[tokio::test]
async fn malformed_advisory_values_fall_back() {
    for bad_hours in [f64::NAN, f64::INFINITY, -5.0, 0.0] {
        let store = Arc::new(MemoryStore::new());
        let card = seed_card(&store).await;
        let scheduler = advisory_scheduler(store, FixedAdvisory { hours: bad_hours });

        let now = Utc::now();
        let outcome = scheduler
            .grade_card_at(
                card.id,
                ConfidenceRating::Good,
                &ReviewContext::default(),
                None,
                now,
            )
            .await
            .unwrap();

        let elapsed_hours = (outcome.card.next_review - now).num_minutes() as f64 / 60.0;
        assert!(
            (elapsed_hours - 72.0).abs() < 0.01,
            "hours {bad_hours} should fall back to 72h, got {elapsed_hours}"
        );
        assert!(outcome.advisory_reasoning.is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn advisory_timeout_falls_back() {
    let store = Arc::new(MemoryStore::new());
    let card = seed_card(&store).await;
    let scheduler = advisory_scheduler(store, StallingAdvisory);

    let now = Utc::now();
    let outcome = scheduler
        .grade_card_at(
            card.id,
            ConfidenceRating::Good,
            &ReviewContext::default(),
            None,
            now,
        )
        .await
        .unwrap();

    let elapsed_hours = (outcome.card.next_review - now).num_minutes() as f64 / 60.0;
    assert!((elapsed_hours - 72.0).abs() < 0.01);
    assert!(outcome.advisory_reasoning.is_none());
}

#[tokio::test]
async fn advisory_failure_is_never_surfaced() {
    let store = Arc::new(MemoryStore::new());
    let card = seed_card(&store).await;
    let scheduler = advisory_scheduler(store, FailingAdvisory);

    let now = Utc::now();
    let outcome = scheduler
        .grade_card_at(
            card.id,
            ConfidenceRating::Easy,
            &ReviewContext::default(),
            None,
            now,
        )
        .await
        .unwrap();

    let elapsed_hours = (outcome.card.next_review - now).num_minutes() as f64 / 60.0;
    assert!((elapsed_hours - 168.0).abs() < 0.01);
}
