use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{ConfidenceRating, Deck, Flashcard, Mood, ReviewContext, SubjectDifficulty};
use crate::session::SessionSelector;
use crate::srs::Scheduler;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn EntityStore>,
    pub scheduler: Arc<Scheduler>,
    pub sessions: Arc<SessionSelector>,
}

pub fn app_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/decks", post(create_deck).get(list_decks))
        .route("/api/decks/:deck_id", delete(delete_deck))
        .route("/api/decks/:deck_id/session", get(study_session))
        .route("/api/flashcards/:flashcard_id/review", post(review_flashcard))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(..) => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Persistence(err) => {
                log::error!("storage failure: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = json!({ "status": "error", "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Path ids arrive as strings so a malformed uuid maps to a validation
/// error rather than a framework rejection.
fn parse_id(what: &'static str, raw: &str) -> Result<Uuid, Error> {
    Uuid::parse_str(raw).map_err(|_| Error::Validation(format!("invalid {what} id: {raw}")))
}

#[derive(Deserialize)]
struct AuthoredCard {
    question: String,
    answer: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDeckRequest {
    user_id: Uuid,
    title: String,
    subject: String,
    cards: Vec<AuthoredCard>,
}

async fn create_deck(
    State(state): State<ApiState>,
    Json(req): Json<CreateDeckRequest>,
) -> Result<Response, Error> {
    if req.title.trim().is_empty() {
        return Err(Error::Validation("deck title must not be empty".into()));
    }
    if req.subject.trim().is_empty() {
        return Err(Error::Validation("deck subject must not be empty".into()));
    }
    if req.cards.is_empty() {
        return Err(Error::Validation(
            "deck must contain at least one card".into(),
        ));
    }
    if req
        .cards
        .iter()
        .any(|card| card.question.trim().is_empty() || card.answer.trim().is_empty())
    {
        return Err(Error::Validation(
            "card question and answer must not be empty".into(),
        ));
    }

    let now = Utc::now();
    let deck = Deck::new(req.user_id, req.title, req.subject, now);
    let cards: Vec<Flashcard> = req
        .cards
        .into_iter()
        .enumerate()
        .map(|(position, card)| {
            Flashcard::new(
                deck.id,
                req.user_id,
                position as i64,
                card.question,
                card.answer,
                now,
            )
        })
        .collect();

    state.store.insert_deck(&deck, &cards).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Deck created successfully",
            "data": { "deck": deck, "flashcardsCount": cards.len() }
        })),
    )
        .into_response())
}

#[derive(Deserialize)]
struct ListDecksQuery {
    user_id: Uuid,
}

async fn list_decks(
    State(state): State<ApiState>,
    Query(query): Query<ListDecksQuery>,
) -> Result<Response, Error> {
    let decks = state.store.list_decks(query.user_id).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Flashcard decks retrieved successfully",
        "data": { "decks": decks }
    }))
    .into_response())
}

async fn delete_deck(
    State(state): State<ApiState>,
    Path(deck_id): Path<String>,
) -> Result<Response, Error> {
    let deck_id = parse_id("deck", &deck_id)?;
    state.store.delete_deck_cascade(deck_id).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Deck deleted successfully"
    }))
    .into_response())
}

#[derive(Deserialize)]
struct SessionQuery {
    /// Reference instant override, mainly for testing.
    now: Option<DateTime<Utc>>,
}

async fn study_session(
    State(state): State<ApiState>,
    Path(deck_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, Error> {
    let deck_id = parse_id("deck", &deck_id)?;
    let session = state.sessions.study_session(deck_id, query.now).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Study session loaded successfully",
        "data": session
    }))
    .into_response())
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReviewContextRequest {
    mood: Option<Mood>,
    energy_level: Option<u8>,
    subject_difficulty: Option<SubjectDifficulty>,
    weekly_study_hours: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    confidence_rating: u8,
    #[serde(default)]
    context: Option<ReviewContextRequest>,
    #[serde(default)]
    expected_version: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewedCard {
    flashcard_id: Uuid,
    confidence_level: u8,
    last_reviewed: Option<DateTime<Utc>>,
    next_review: DateTime<Utc>,
    version: i64,
}

async fn review_flashcard(
    State(state): State<ApiState>,
    Path(flashcard_id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> Result<Response, Error> {
    let flashcard_id = parse_id("flashcard", &flashcard_id)?;
    let rating = ConfidenceRating::from_u8(req.confidence_rating)?;

    let ctx = req.context.unwrap_or_default();
    let context = ReviewContext::from_parts(
        ctx.mood,
        ctx.energy_level,
        ctx.subject_difficulty,
        ctx.weekly_study_hours,
    )?;

    let outcome = state
        .scheduler
        .grade_card(flashcard_id, rating, &context, req.expected_version)
        .await?;

    let card = ReviewedCard {
        flashcard_id: outcome.card.id,
        confidence_level: outcome.card.confidence_level,
        last_reviewed: outcome.card.last_reviewed,
        next_review: outcome.card.next_review,
        version: outcome.card.version,
    };

    Ok(Json(json!({
        "status": "success",
        "message": "Flashcard updated successfully",
        "data": { "flashcard": card, "aiReasoning": outcome.advisory_reasoning }
    }))
    .into_response())
}
