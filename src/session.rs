use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Flashcard;
use crate::store::EntityStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSummary {
    pub id: Uuid,
    pub title: String,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueCard {
    pub flashcard_id: Uuid,
    pub question: String,
    pub answer: String,
    pub confidence_level: u8,
    pub next_review: DateTime<Utc>,
}

impl From<Flashcard> for DueCard {
    fn from(card: Flashcard) -> Self {
        Self {
            flashcard_id: card.id,
            question: card.question,
            answer: card.answer,
            confidence_level: card.confidence_level,
            next_review: card.next_review,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub deck: DeckSummary,
    pub due_cards: Vec<DueCard>,
    pub total_due: usize,
}

/// Read-only selection of the cards currently due in a deck. Never mutates
/// card state and is safe to call repeatedly and concurrently.
pub struct SessionSelector {
    store: Arc<dyn EntityStore>,
}

impl SessionSelector {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Cards with `next_review <= now`, weakest confidence first and most
    /// overdue first within equal confidence. The session is front-loaded
    /// with material the learner is least sure about, independent of deck
    /// display order. An empty deck yields `total_due = 0`, not an error.
    pub async fn study_session(
        &self,
        deck_id: Uuid,
        now: Option<DateTime<Utc>>,
    ) -> Result<StudySession> {
        let now = now.unwrap_or_else(Utc::now);

        let deck = self
            .store
            .get_deck(deck_id)
            .await?
            .ok_or(Error::NotFound("deck", deck_id))?;

        let mut cards = self.store.list_due_by_deck(deck_id, now).await?;
        cards.retain(|card| card.is_due(now));
        cards.sort_by(|a, b| {
            a.confidence_level
                .cmp(&b.confidence_level)
                .then(a.next_review.cmp(&b.next_review))
        });

        let due_cards: Vec<DueCard> = cards.into_iter().map(DueCard::from).collect();

        Ok(StudySession {
            deck: DeckSummary {
                id: deck.id,
                title: deck.title,
                subject: deck.subject,
            },
            total_due: due_cards.len(),
            due_cards,
        })
    }
}
