use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Flashcard, ScheduleUpdate};

/// The two capabilities a review session needs from persistent storage.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Every card owned by `owner_id` whose due date is at or before `now`.
    /// No ordering is guaranteed.
    async fn fetch_due_cards(&self, owner_id: &str, now: DateTime<Utc>) -> Result<Vec<Flashcard>>;

    /// Overwrites the four scheduling fields of one card. Fails if the card
    /// does not exist.
    async fn persist_card_schedule(&self, card_id: Uuid, update: &ScheduleUpdate) -> Result<()>;
}

/// Card store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCardStore {
    cards: Arc<RwLock<HashMap<Uuid, Flashcard>>>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, card: Flashcard) {
        self.cards.write().await.insert(card.id, card);
    }

    pub async fn get(&self, id: Uuid) -> Option<Flashcard> {
        self.cards.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn fetch_due_cards(&self, owner_id: &str, now: DateTime<Utc>) -> Result<Vec<Flashcard>> {
        let cards = self.cards.read().await;
        Ok(cards
            .values()
            .filter(|card| card.owner_id == owner_id && card.is_due(now))
            .cloned()
            .collect())
    }

    async fn persist_card_schedule(&self, card_id: Uuid, update: &ScheduleUpdate) -> Result<()> {
        let mut cards = self.cards.write().await;
        let card = cards
            .get_mut(&card_id)
            .ok_or_else(|| anyhow!("Flashcard {} not found", card_id))?;
        card.apply_schedule(update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn card(owner: &str, front: &str, due_in_days: i64) -> Flashcard {
        let now = Utc::now();
        let mut card = Flashcard::new(
            owner.to_string(),
            "course".to_string(),
            front.to_string(),
            "answer".to_string(),
            now,
        );
        card.due_date = now + Duration::days(due_in_days);
        card
    }

    #[tokio::test]
    async fn test_fetch_due_cards_scopes_by_owner_and_date() {
        let store = InMemoryCardStore::new();
        store.insert(card("alice", "due", -1)).await;
        store.insert(card("alice", "later", 3)).await;
        store.insert(card("bob", "other owner", -1)).await;

        let due = store.fetch_due_cards("alice", Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].front, "due");
    }

    #[tokio::test]
    async fn test_persist_updates_schedule_only() {
        let store = InMemoryCardStore::new();
        let original = card("alice", "Q", 0);
        let id = original.id;
        store.insert(original.clone()).await;

        let update = ScheduleUpdate {
            interval: 6,
            repetition: 2,
            ease_factor: 2.6,
            due_date: original.due_date + Duration::days(6),
        };
        store.persist_card_schedule(id, &update).await.unwrap();

        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.schedule().interval, 6);
        assert_eq!(stored.due_date, update.due_date);
        assert_eq!(stored.front, original.front);
        assert_eq!(stored.course_id, original.course_id);
    }

    #[tokio::test]
    async fn test_persist_unknown_card_fails() {
        let store = InMemoryCardStore::new();
        let update = ScheduleUpdate {
            interval: 1,
            repetition: 0,
            ease_factor: 2.5,
            due_date: Utc::now(),
        };
        assert!(store.persist_card_schedule(Uuid::new_v4(), &update).await.is_err());
    }
}
