use anyhow::{Result, anyhow};
use chrono::{SubsecRound, Utc};
use uuid::Uuid;

use crate::database::Database;
use crate::models::*;
use crate::store::CardStore;
use crate::{log_service_start, log_service_success};

#[derive(Clone)]
pub struct CardService {
    db: Database,
}

impl CardService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates a card for a course. New cards are due immediately.
    pub async fn create_flashcard(&self, request: CreateFlashcardRequest) -> Result<Flashcard> {
        log_service_start!("card_service", "create_flashcard");

        let front = request.front.trim();
        let back = request.back.trim();
        if front.is_empty() {
            return Err(anyhow!("Flashcard front cannot be empty"));
        }
        if back.is_empty() {
            return Err(anyhow!("Flashcard back cannot be empty"));
        }
        if request.owner_id.trim().is_empty() {
            return Err(anyhow!("owner_id is required"));
        }

        let card = Flashcard::new(
            request.owner_id,
            request.course_id,
            front.to_string(),
            back.to_string(),
            // Stored timestamps keep microseconds
            Utc::now().trunc_subsecs(6),
        );
        self.db.create_flashcard(&card).await?;

        log_service_success!("card_service", "create_flashcard", card_id = card.id);
        Ok(card)
    }

    pub async fn get_flashcard(&self, id: Uuid) -> Result<Option<Flashcard>> {
        self.db.get_flashcard(id).await
    }

    pub async fn list_flashcards(&self, owner_id: &str, course_id: Option<&str>) -> Result<Vec<Flashcard>> {
        self.db.list_flashcards(owner_id, course_id).await
    }

    pub async fn due_cards(&self, owner_id: &str) -> Result<DueCardsSummary> {
        let cards = self.db.fetch_due_cards(owner_id, Utc::now()).await?;
        Ok(DueCardsSummary {
            owner_id: owner_id.to_string(),
            due_count: cards.len(),
            cards,
        })
    }

    pub async fn delete_flashcard(&self, id: Uuid) -> Result<bool> {
        self.db.delete_flashcard(id).await
    }
}
