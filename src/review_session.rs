//! Review session state machine.
//!
//! A session snapshots the cards due at load time, shuffles them and walks
//! each one through reveal, rate and advance. It moves from `Loading` to
//! `Active` to `Complete` and never back, except through an explicit
//! restart which re-fetches from the store.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ReviewError;
use crate::log_session_event;
use crate::models::{Flashcard, ScheduleUpdate};
use crate::scheduler::{Quality, Sm2Scheduler};
use crate::store::CardStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Nothing was due when the session loaded.
    NothingDue,
    /// The due-card query failed; presented like an empty session.
    FetchFailed,
    /// Every card in the queue has been rated.
    AllReviewed,
}

impl CompletionReason {
    pub fn was_empty(self) -> bool {
        !matches!(self, CompletionReason::AllReviewed)
    }
}

/// Serialized as `{"status": "active"}` or
/// `{"status": "complete", "reason": "all_reviewed"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    Loading,
    Active,
    Complete(CompletionReason),
}

impl SessionState {
    fn name(self) -> &'static str {
        match self {
            SessionState::Loading => "loading",
            SessionState::Active => "active",
            SessionState::Complete(_) => "complete",
        }
    }
}

/// A rating whose schedule is computed but not yet acknowledged by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRating {
    pub card_id: Uuid,
    pub quality: Quality,
    pub update: ScheduleUpdate,
}

/// Serializable view of a session, as shown to the reviewer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub owner_id: String,
    pub state: SessionState,
    pub was_empty: Option<bool>,
    pub position: usize,
    pub total: usize,
    pub remaining: usize,
    pub revealed: bool,
    pub card: Option<CardView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    pub id: Uuid,
    pub course_id: String,
    pub front: String,
    pub back: Option<String>,
}

pub struct ReviewSession {
    id: Uuid,
    owner_id: String,
    store: Arc<dyn CardStore>,
    scheduler: Sm2Scheduler,
    timezone: Tz,
    rng: StdRng,
    state: SessionState,
    queue: Vec<Flashcard>,
    cursor: usize,
    revealed: bool,
    in_flight: Option<Uuid>,
}

impl ReviewSession {
    pub fn new(store: Arc<dyn CardStore>, owner_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            store,
            scheduler: Sm2Scheduler::new(),
            timezone: Tz::UTC,
            rng: StdRng::from_entropy(),
            state: SessionState::Loading,
            queue: Vec::new(),
            cursor: 0,
            revealed: false,
            in_flight: None,
        }
    }

    /// Time zone used for calendar-day due date arithmetic.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Makes the shuffle order reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn store(&self) -> Arc<dyn CardStore> {
        self.store.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, SessionState::Complete(_))
    }

    pub fn current_card(&self) -> Option<&Flashcard> {
        match self.state {
            SessionState::Active => self.queue.get(self.cursor),
            _ => None,
        }
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.queue.len()
    }

    /// Cards not yet rated, including the current one.
    pub fn remaining(&self) -> usize {
        match self.state {
            SessionState::Active => self.queue.len() - self.cursor,
            _ => 0,
        }
    }

    pub fn is_rating_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub async fn load(&mut self) -> Result<(), ReviewError> {
        self.load_at(Utc::now()).await
    }

    /// Fetches the due set once and shuffles it into the session queue.
    ///
    /// A failed fetch does not surface as an error: the session completes
    /// with [`CompletionReason::FetchFailed`].
    pub async fn load_at(&mut self, now: DateTime<Utc>) -> Result<(), ReviewError> {
        if self.state != SessionState::Loading {
            return Err(self.reject("load"));
        }

        let fetched = self.store.fetch_due_cards(&self.owner_id, now).await;
        self.install(fetched);
        Ok(())
    }

    fn install(&mut self, fetched: anyhow::Result<Vec<Flashcard>>) {
        self.queue.clear();
        self.cursor = 0;
        self.revealed = false;

        let mut cards = match fetched {
            Ok(cards) => cards,
            Err(e) => {
                log_session_event!(failed, session_id = self.id, error = e);
                self.complete(CompletionReason::FetchFailed);
                return;
            }
        };

        if cards.is_empty() {
            self.complete(CompletionReason::NothingDue);
            return;
        }

        cards.shuffle(&mut self.rng);
        log_session_event!(loaded, session_id = self.id, owner_id = self.owner_id, card_count = cards.len());

        self.queue = cards;
        self.state = SessionState::Active;
    }

    /// Shows the answer of the current card. Calling it again is a no-op.
    pub fn reveal(&mut self) -> Result<(), ReviewError> {
        if self.state != SessionState::Active {
            return Err(self.reject("reveal"));
        }
        self.revealed = true;
        Ok(())
    }

    pub async fn rate(&mut self, quality: impl Into<Quality>) -> Result<ScheduleUpdate, ReviewError> {
        self.rate_at(quality, Utc::now()).await
    }

    /// Schedules the current card, persists it and advances.
    ///
    /// The session only advances once the store acknowledges the write. On
    /// failure it stays on the same card, still revealed, so the rating can
    /// be retried. Nothing is changed before the write completes, so
    /// dropping the returned future leaves the session as it was.
    pub async fn rate_at(
        &mut self,
        quality: impl Into<Quality>,
        now: DateTime<Utc>,
    ) -> Result<ScheduleUpdate, ReviewError> {
        if let Some(card_id) = self.in_flight {
            return Err(ReviewError::RatingInFlight(card_id));
        }
        let pending = self.plan_rating(quality.into(), now)?;
        let outcome = self
            .store
            .persist_card_schedule(pending.card_id, &pending.update)
            .await;
        self.apply_outcome(&pending, outcome)?;
        Ok(pending.update)
    }

    /// First half of a rating whose store write happens outside the session,
    /// e.g. while the session lock is released. Computes the new schedule and
    /// marks the card as in flight until [`finish_rating`](Self::finish_rating)
    /// is called with the store's answer.
    ///
    /// While a rating is in flight, further ratings are rejected without
    /// touching the session.
    pub fn begin_rating(&mut self, quality: Quality, now: DateTime<Utc>) -> Result<PendingRating, ReviewError> {
        if let Some(card_id) = self.in_flight {
            return Err(ReviewError::RatingInFlight(card_id));
        }
        let pending = self.plan_rating(quality, now)?;
        self.in_flight = Some(pending.card_id);
        Ok(pending)
    }

    /// Second half of [`begin_rating`](Self::begin_rating): applies the store's answer.
    pub fn finish_rating(
        &mut self,
        pending: &PendingRating,
        outcome: anyhow::Result<()>,
    ) -> Result<(), ReviewError> {
        if self.in_flight != Some(pending.card_id) {
            return Err(ReviewError::InvalidTransition(format!(
                "no rating in flight for card {}",
                pending.card_id
            )));
        }
        self.in_flight = None;
        self.apply_outcome(pending, outcome)
    }

    fn plan_rating(&self, quality: Quality, now: DateTime<Utc>) -> Result<PendingRating, ReviewError> {
        if self.state != SessionState::Active {
            return Err(self.reject("rate"));
        }
        if !self.revealed {
            return Err(ReviewError::invalid_transition("rate", "unrevealed"));
        }

        let card = &self.queue[self.cursor];
        let update = self
            .scheduler
            .compute(&card.schedule(), quality, now.with_timezone(&self.timezone))
            .to_update();

        Ok(PendingRating {
            card_id: card.id,
            quality,
            update,
        })
    }

    fn apply_outcome(&mut self, pending: &PendingRating, outcome: anyhow::Result<()>) -> Result<(), ReviewError> {
        if let Err(source) = outcome {
            let error = ReviewError::PersistFailure {
                card_id: pending.card_id,
                source,
            };
            log_session_event!(failed, session_id = self.id, error = error);
            return Err(error);
        }

        log_session_event!(
            rated,
            session_id = self.id,
            card_id = pending.card_id,
            quality = pending.quality.value(),
            interval = pending.update.interval
        );
        self.queue[self.cursor].apply_schedule(&pending.update);

        if self.cursor + 1 < self.queue.len() {
            self.cursor += 1;
            self.revealed = false;
        } else {
            self.complete(CompletionReason::AllReviewed);
        }
        Ok(())
    }

    pub async fn restart(&mut self) -> Result<(), ReviewError> {
        self.restart_at(Utc::now()).await
    }

    /// Drops the finished queue and loads a fresh due set. The session is
    /// left untouched until the fetch returns.
    pub async fn restart_at(&mut self, now: DateTime<Utc>) -> Result<(), ReviewError> {
        if !self.is_complete() {
            return Err(self.reject("restart"));
        }

        let fetched = self.store.fetch_due_cards(&self.owner_id, now).await;
        self.install(fetched);
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let was_empty = match self.state {
            SessionState::Complete(reason) => Some(reason.was_empty()),
            _ => None,
        };
        let card = self.current_card().map(|card| CardView {
            id: card.id,
            course_id: card.course_id.clone(),
            front: card.front.clone(),
            back: self.revealed.then(|| card.back.clone()),
        });
        let position = match self.state {
            SessionState::Active => self.cursor + 1,
            SessionState::Complete(CompletionReason::AllReviewed) => self.queue.len(),
            _ => 0,
        };

        SessionSnapshot {
            session_id: self.id,
            owner_id: self.owner_id.clone(),
            state: self.state,
            was_empty,
            position,
            total: self.queue.len(),
            remaining: self.remaining(),
            revealed: self.revealed,
            card,
        }
    }

    fn complete(&mut self, reason: CompletionReason) {
        self.state = SessionState::Complete(reason);
        self.revealed = false;
        log_session_event!(complete, session_id = self.id, reason = reason);
    }

    fn reject(&self, operation: &str) -> ReviewError {
        let error = ReviewError::invalid_transition(operation, self.state.name());
        log_session_event!(rejected, session_id = self.id, error = error);
        error
    }
}
