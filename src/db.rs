use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Pool, Row, Sqlite};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Deck, Flashcard, ReviewPatch};
use crate::store::EntityStore;

fn parse_uuid(column: &str, value: &str) -> std::result::Result<Uuid, sqlx::Error> {
    Uuid::parse_str(value).map_err(|err| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    })
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Deck {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let user_id: String = row.try_get("user_id")?;
        Ok(Deck {
            id: parse_uuid("id", &id)?,
            user_id: parse_uuid("user_id", &user_id)?,
            title: row.try_get("title")?,
            subject: row.try_get("subject")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Flashcard {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let user_id: String = row.try_get("user_id")?;
        let deck_id: String = row.try_get("deck_id")?;
        let confidence_level: i64 = row.try_get("confidence_level")?;
        let confidence_level =
            u8::try_from(confidence_level).map_err(|err| sqlx::Error::ColumnDecode {
                index: "confidence_level".to_string(),
                source: Box::new(err),
            })?;
        Ok(Flashcard {
            id: parse_uuid("id", &id)?,
            user_id: parse_uuid("user_id", &user_id)?,
            deck_id: parse_uuid("deck_id", &deck_id)?,
            position: row.try_get("position")?,
            question: row.try_get("question")?,
            answer: row.try_get("answer")?,
            confidence_level,
            last_reviewed: row.try_get("last_reviewed")?,
            next_review: row.try_get("next_review")?,
            version: row.try_get("version")?,
        })
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .log_statements(log::LevelFilter::Trace);

        let pool = SqlitePool::connect_with(options).await?;

        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                subject TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flashcards (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                deck_id TEXT NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                confidence_level INTEGER NOT NULL DEFAULT 1,
                last_reviewed DATETIME,
                next_review DATETIME NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_flashcards_deck_due ON flashcards (deck_id, next_review)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn insert_deck(&self, deck: &Deck, cards: &[Flashcard]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO decks (id, user_id, title, subject, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(deck.id.to_string())
        .bind(deck.user_id.to_string())
        .bind(&deck.title)
        .bind(&deck.subject)
        .bind(deck.created_at)
        .execute(&mut *tx)
        .await?;

        for card in cards {
            sqlx::query(
                r#"
                INSERT INTO flashcards
                    (id, user_id, deck_id, position, question, answer,
                     confidence_level, last_reviewed, next_review, version)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(card.id.to_string())
            .bind(card.user_id.to_string())
            .bind(card.deck_id.to_string())
            .bind(card.position)
            .bind(&card.question)
            .bind(&card.answer)
            .bind(card.confidence_level as i64)
            .bind(card.last_reviewed)
            .bind(card.next_review)
            .bind(card.version)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_deck(&self, id: Uuid) -> Result<Option<Deck>> {
        let deck = sqlx::query_as::<_, Deck>("SELECT * FROM decks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(deck)
    }

    async fn list_decks(&self, user_id: Uuid) -> Result<Vec<Deck>> {
        let decks = sqlx::query_as::<_, Deck>(
            "SELECT * FROM decks WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(decks)
    }

    async fn delete_deck_cascade(&self, deck_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM flashcards WHERE deck_id = ?")
            .bind(deck_id.to_string())
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM decks WHERE id = ?")
            .bind(deck_id.to_string())
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(Error::NotFound("deck", deck_id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_flashcard(&self, id: Uuid) -> Result<Option<Flashcard>> {
        let card = sqlx::query_as::<_, Flashcard>("SELECT * FROM flashcards WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(card)
    }

    async fn update_flashcard(
        &self,
        id: Uuid,
        patch: ReviewPatch,
        expected_version: i64,
    ) -> Result<Flashcard> {
        let mut tx = self.pool.begin().await?;

        // Conditional write: the row only changes if nobody else committed
        // since our read. rows_affected tells the two cases apart below.
        let updated = sqlx::query(
            r#"
            UPDATE flashcards
            SET confidence_level = ?, last_reviewed = ?, next_review = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(patch.confidence_level as i64)
        .bind(patch.last_reviewed)
        .bind(patch.next_review)
        .bind(id.to_string())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT version FROM flashcards WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return match exists {
                Some(_) => Err(Error::Conflict {
                    id,
                    expected: expected_version,
                }),
                None => Err(Error::NotFound("flashcard", id)),
            };
        }

        let card = sqlx::query_as::<_, Flashcard>("SELECT * FROM flashcards WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(card)
    }

    async fn list_due_by_deck(&self, deck_id: Uuid, now: DateTime<Utc>) -> Result<Vec<Flashcard>> {
        let cards = sqlx::query_as::<_, Flashcard>(
            "SELECT * FROM flashcards WHERE deck_id = ? AND next_review <= ?",
        )
        .bind(deck_id.to_string())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(cards)
    }
}
