use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ease factor every new card starts with.
pub const INITIAL_EASE_FACTOR: f64 = 2.5;

/// Hard floor for the ease factor.
pub const MIN_EASE_FACTOR: f64 = 1.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub owner_id: String,
    pub course_id: String,
    pub front: String,
    pub back: String,
    pub interval: u32,    // Days until the next review
    pub repetition: u32,  // Consecutive successful recalls
    pub ease_factor: f64,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Flashcard {
    /// A freshly created card, due immediately.
    pub fn new(owner_id: String, course_id: String, front: String, back: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            course_id,
            front,
            back,
            interval: 0,
            repetition: 0,
            ease_factor: INITIAL_EASE_FACTOR,
            due_date: now,
            created_at: now,
        }
    }

    pub fn schedule(&self) -> ScheduleState {
        ScheduleState {
            interval: self.interval,
            repetition: self.repetition,
            ease_factor: self.ease_factor,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date <= now
    }

    /// Overwrites the scheduling fields and nothing else.
    pub fn apply_schedule(&mut self, update: &ScheduleUpdate) {
        self.interval = update.interval;
        self.repetition = update.repetition;
        self.ease_factor = update.ease_factor;
        self.due_date = update.due_date;
    }
}

/// The per-card inputs of the scheduling engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub interval: u32,
    pub repetition: u32,
    pub ease_factor: f64,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self {
            interval: 0,
            repetition: 0,
            ease_factor: INITIAL_EASE_FACTOR,
        }
    }
}

/// Exactly the fields written back to the store after a review.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub interval: u32,
    pub repetition: u32,
    pub ease_factor: f64,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFlashcardRequest {
    pub owner_id: String,
    pub course_id: String,
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueCardsSummary {
    pub owner_id: String,
    pub due_count: usize,
    pub cards: Vec<Flashcard>,
}
