use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Flashcard, MIN_EASE_FACTOR, ScheduleUpdate};
use crate::store::CardStore;
use crate::log_store_operation;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database is a separate database.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(database_url).await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flashcards (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                interval INTEGER NOT NULL DEFAULT 0,
                repetition INTEGER NOT NULL DEFAULT 0,
                ease_factor REAL NOT NULL DEFAULT 2.5,
                due_date TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_flashcards_owner_due ON flashcards (owner_id, due_date)",
        )
        .execute(&self.pool)
        .await?;

        log_store_operation!(info, "migrate", "flashcard schema ready");
        Ok(())
    }

    pub async fn create_flashcard(&self, card: &Flashcard) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flashcards (id, owner_id, course_id, front, back,
                                    interval, repetition, ease_factor, due_date, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(card.id.to_string())
        .bind(&card.owner_id)
        .bind(&card.course_id)
        .bind(&card.front)
        .bind(&card.back)
        .bind(i64::from(card.interval))
        .bind(i64::from(card.repetition))
        .bind(card.ease_factor)
        .bind(format_timestamp(card.due_date))
        .bind(format_timestamp(card.created_at))
        .execute(&self.pool)
        .await?;

        log_store_operation!(debug, "create_flashcard", card_id = card.id);
        Ok(())
    }

    pub async fn get_flashcard(&self, id: Uuid) -> Result<Option<Flashcard>> {
        let row = sqlx::query("SELECT * FROM flashcards WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_flashcard).transpose()
    }

    pub async fn list_flashcards(&self, owner_id: &str, course_id: Option<&str>) -> Result<Vec<Flashcard>> {
        let rows = match course_id {
            Some(course_id) => {
                sqlx::query(
                    "SELECT * FROM flashcards WHERE owner_id = ?1 AND course_id = ?2 ORDER BY created_at DESC",
                )
                .bind(owner_id)
                .bind(course_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM flashcards WHERE owner_id = ?1 ORDER BY created_at DESC")
                    .bind(owner_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows_to_flashcards("list_flashcards", rows))
    }

    pub async fn delete_flashcard(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flashcards WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CardStore for Database {
    async fn fetch_due_cards(&self, owner_id: &str, now: DateTime<Utc>) -> Result<Vec<Flashcard>> {
        let rows = sqlx::query("SELECT * FROM flashcards WHERE owner_id = ?1 AND due_date <= ?2")
            .bind(owner_id)
            .bind(format_timestamp(now))
            .fetch_all(&self.pool)
            .await?;

        let cards = rows_to_flashcards("fetch_due_cards", rows);
        log_store_operation!(debug, "fetch_due_cards", owner_id = owner_id, count = cards.len());
        Ok(cards)
    }

    async fn persist_card_schedule(&self, card_id: Uuid, update: &ScheduleUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE flashcards
            SET interval = ?1, repetition = ?2, ease_factor = ?3, due_date = ?4
            WHERE id = ?5
            "#,
        )
        .bind(i64::from(update.interval))
        .bind(i64::from(update.repetition))
        .bind(update.ease_factor)
        .bind(format_timestamp(update.due_date))
        .bind(card_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Flashcard {} not found", card_id));
        }

        log_store_operation!(debug, "persist_card_schedule", card_id = card_id);
        Ok(())
    }
}

/// Fixed-width UTC timestamps so text comparison in SQL matches time order.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn rows_to_flashcards(operation: &str, rows: Vec<SqliteRow>) -> Vec<Flashcard> {
    rows.iter()
        .filter_map(|row| match row_to_flashcard(row) {
            Ok(card) => Some(card),
            Err(e) => {
                log_store_operation!(skip, operation, error = e);
                None
            }
        })
        .collect()
}

/// Reads one row, rejecting records that violate the scheduling invariants.
fn row_to_flashcard(row: &SqliteRow) -> Result<Flashcard> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id).map_err(|e| anyhow!("Invalid flashcard id '{}': {}", id, e))?;

    let interval: i64 = row.try_get("interval")?;
    let interval = u32::try_from(interval)
        .map_err(|_| anyhow!("Flashcard {} has invalid interval {}", id, interval))?;

    let repetition: i64 = row.try_get("repetition")?;
    let repetition = u32::try_from(repetition)
        .map_err(|_| anyhow!("Flashcard {} has invalid repetition {}", id, repetition))?;

    let ease_factor: f64 = row.try_get("ease_factor")?;
    if !ease_factor.is_finite() || ease_factor < MIN_EASE_FACTOR {
        return Err(anyhow!("Flashcard {} has invalid ease factor {}", id, ease_factor));
    }

    Ok(Flashcard {
        id,
        owner_id: row.try_get("owner_id")?,
        course_id: row.try_get("course_id")?,
        front: row.try_get("front")?,
        back: row.try_get("back")?,
        interval,
        repetition,
        ease_factor,
        due_date: parse_timestamp(&row.try_get::<String, _>("due_date")?)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}
