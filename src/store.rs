use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Deck, Flashcard, ReviewPatch};

/// Persistence contract for decks and flashcards.
///
/// `list_due_by_deck` does the due filtering; ordering a study session is
/// the session selector's responsibility, not the store's.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Inserts a deck together with its authored cards as one unit.
    async fn insert_deck(&self, deck: &Deck, cards: &[Flashcard]) -> Result<()>;

    async fn get_deck(&self, id: Uuid) -> Result<Option<Deck>>;

    /// Decks for one user, newest first.
    async fn list_decks(&self, user_id: Uuid) -> Result<Vec<Deck>>;

    /// Removes the deck and every flashcard in it atomically. Fails with
    /// NotFound if the deck does not exist.
    async fn delete_deck_cascade(&self, deck_id: Uuid) -> Result<()>;

    async fn get_flashcard(&self, id: Uuid) -> Result<Option<Flashcard>>;

    /// Applies a review patch and bumps the version by 1, but only if the
    /// stored version still equals `expected_version`; otherwise fails with
    /// Conflict and leaves the record untouched.
    async fn update_flashcard(
        &self,
        id: Uuid,
        patch: ReviewPatch,
        expected_version: i64,
    ) -> Result<Flashcard>;

    /// Cards in the deck with `next_review <= now`, in no particular order.
    async fn list_due_by_deck(&self, deck_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Flashcard>>;
}

/// In-process store backed by hash maps. Carries the same contract as the
/// SQLite store and doubles as the test fake.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    decks: HashMap<Uuid, Deck>,
    cards: HashMap<Uuid, Flashcard>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert_deck(&self, deck: &Deck, cards: &[Flashcard]) -> Result<()> {
        let mut tables = self.inner.write().await;
        tables.decks.insert(deck.id, deck.clone());
        for card in cards {
            tables.cards.insert(card.id, card.clone());
        }
        Ok(())
    }

    async fn get_deck(&self, id: Uuid) -> Result<Option<Deck>> {
        let tables = self.inner.read().await;
        Ok(tables.decks.get(&id).cloned())
    }

    async fn list_decks(&self, user_id: Uuid) -> Result<Vec<Deck>> {
        let tables = self.inner.read().await;
        let mut decks: Vec<Deck> = tables
            .decks
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        decks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(decks)
    }

    async fn delete_deck_cascade(&self, deck_id: Uuid) -> Result<()> {
        let mut tables = self.inner.write().await;
        if tables.decks.remove(&deck_id).is_none() {
            return Err(Error::NotFound("deck", deck_id));
        }
        tables.cards.retain(|_, card| card.deck_id != deck_id);
        Ok(())
    }

    async fn get_flashcard(&self, id: Uuid) -> Result<Option<Flashcard>> {
        let tables = self.inner.read().await;
        Ok(tables.cards.get(&id).cloned())
    }

    async fn update_flashcard(
        &self,
        id: Uuid,
        patch: ReviewPatch,
        expected_version: i64,
    ) -> Result<Flashcard> {
        let mut tables = self.inner.write().await;
        let card = tables
            .cards
            .get_mut(&id)
            .ok_or(Error::NotFound("flashcard", id))?;
        if card.version != expected_version {
            return Err(Error::Conflict {
                id,
                expected: expected_version,
            });
        }
        card.confidence_level = patch.confidence_level;
        card.last_reviewed = Some(patch.last_reviewed);
        card.next_review = patch.next_review;
        card.version += 1;
        Ok(card.clone())
    }

    async fn list_due_by_deck(&self, deck_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Flashcard>> {
        let tables = self.inner.read().await;
        Ok(tables
            .cards
            .values()
            .filter(|card| card.deck_id == deck_id && card.is_due(now))
            .cloned()
            .collect())
    }
}
