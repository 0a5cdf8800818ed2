use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use study_dashboard::{
    CardStore, CompletionReason, Flashcard, InMemoryCardStore, Quality, Rating, ReviewError, ReviewSession,
    ScheduleUpdate, SessionState,
};
use uuid::Uuid;

/// In-memory store that records every write and can be told to fail.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryCardStore,
    persisted: Mutex<Vec<(Uuid, ScheduleUpdate)>>,
    fetch_calls: AtomicUsize,
    fail_fetch: AtomicBool,
    fail_persist: AtomicBool,
    hang_fetch: AtomicBool,
    hang_persist: AtomicBool,
}

impl RecordingStore {
    async fn with_cards(fronts: &[&str]) -> Arc<Self> {
        let store = Arc::new(Self::default());
        for front in fronts {
            store.add(front, base_time() - Duration::hours(1)).await;
        }
        store
    }

    async fn add(&self, front: &str, due_date: DateTime<Utc>) -> Uuid {
        let mut card = Flashcard::new(
            "alice".to_string(),
            "rust-101".to_string(),
            front.to_string(),
            format!("answer to {}", front),
            due_date,
        );
        card.due_date = due_date;
        let id = card.id;
        self.inner.insert(card).await;
        id
    }

    fn persisted(&self) -> Vec<(Uuid, ScheduleUpdate)> {
        self.persisted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CardStore for RecordingStore {
    async fn fetch_due_cards(&self, owner_id: &str, now: DateTime<Utc>) -> Result<Vec<Flashcard>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_fetch.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied"));
        }
        self.inner.fetch_due_cards(owner_id, now).await
    }

    async fn persist_card_schedule(&self, card_id: Uuid, update: &ScheduleUpdate) -> Result<()> {
        if self.hang_persist.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(anyhow!("network unavailable"));
        }
        self.inner.persist_card_schedule(card_id, update).await?;
        self.persisted.lock().unwrap().push((card_id, *update));
        Ok(())
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
}

async fn loaded_session(store: &Arc<RecordingStore>) -> ReviewSession {
    let mut session = ReviewSession::new(store.clone(), "alice").with_seed(42);
    session.load_at(base_time()).await.unwrap();
    session
}

#[tokio::test]
async fn test_two_card_session_walkthrough() {
    let store = RecordingStore::with_cards(&["Q1", "Q2"]).await;
    let mut session = ReviewSession::new(store.clone(), "alice");
    assert_eq!(session.state(), SessionState::Loading);

    session.load_at(base_time()).await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.cursor(), 0);
    assert!(!session.is_revealed());

    let first = session.current_card().unwrap().id;
    session.reveal().unwrap();
    let update = session.rate_at(Quality::new(5).unwrap(), base_time()).await.unwrap();
    assert_eq!(update.repetition, 1);
    assert_eq!(update.interval, 1);

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.cursor(), 1);
    assert!(!session.is_revealed());

    let second = session.current_card().unwrap().id;
    assert_ne!(first, second);
    session.reveal().unwrap();
    session.rate_at(Quality::new(1).unwrap(), base_time()).await.unwrap();

    assert_eq!(session.state(), SessionState::Complete(CompletionReason::AllReviewed));
    assert!(!CompletionReason::AllReviewed.was_empty());
    assert!(session.current_card().is_none());

    let persisted = store.persisted();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[0].0, first);
    assert_eq!((persisted[0].1.repetition, persisted[0].1.interval), (1, 1));
    assert_eq!(persisted[1].0, second);
    assert_eq!((persisted[1].1.repetition, persisted[1].1.interval), (0, 1));
    assert_eq!(persisted[1].1.ease_factor, 2.5);
}

#[tokio::test]
async fn test_empty_due_set_completes_immediately() {
    let store = RecordingStore::with_cards(&[]).await;
    store.add("tomorrow", base_time() + Duration::days(1)).await;

    let session = loaded_session(&store).await;

    assert_eq!(session.state(), SessionState::Complete(CompletionReason::NothingDue));
    assert_eq!(session.snapshot().was_empty, Some(true));
    assert!(session.current_card().is_none());
    assert_eq!(session.total(), 0);
}

#[tokio::test]
async fn test_fetch_failure_is_presented_as_empty() {
    let store = RecordingStore::with_cards(&["Q1"]).await;
    store.fail_fetch.store(true, Ordering::SeqCst);

    let mut session = loaded_session(&store).await;

    assert_eq!(session.state(), SessionState::Complete(CompletionReason::FetchFailed));
    assert_eq!(session.snapshot().was_empty, Some(true));
    assert!(matches!(session.reveal(), Err(ReviewError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_reveal_is_idempotent() {
    let store = RecordingStore::with_cards(&["Q1", "Q2"]).await;
    let mut session = loaded_session(&store).await;

    session.reveal().unwrap();
    session.reveal().unwrap();

    assert!(session.is_revealed());
    assert_eq!(session.cursor(), 0);
    assert!(store.persisted().is_empty());
}

#[tokio::test]
async fn test_rate_before_reveal_is_rejected() {
    let store = RecordingStore::with_cards(&["Q1", "Q2"]).await;
    let mut session = loaded_session(&store).await;
    let current = session.current_card().unwrap().id;

    let result = session.rate_at(Rating::Good, base_time()).await;

    assert!(matches!(result, Err(ReviewError::InvalidTransition(_))));
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.cursor(), 0);
    assert_eq!(session.current_card().unwrap().id, current);
    assert!(store.persisted().is_empty());
}

#[tokio::test]
async fn test_persist_failure_leaves_session_unchanged() {
    let store = RecordingStore::with_cards(&["Q1", "Q2"]).await;
    let mut session = loaded_session(&store).await;
    let current = session.current_card().unwrap().id;
    session.reveal().unwrap();

    store.fail_persist.store(true, Ordering::SeqCst);
    let result = session.rate_at(Rating::Good, base_time()).await;

    assert!(matches!(result, Err(ReviewError::PersistFailure { card_id, .. }) if card_id == current));
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.cursor(), 0);
    assert!(session.is_revealed());
    assert!(!session.is_rating_in_flight());

    store.fail_persist.store(false, Ordering::SeqCst);
    session.rate_at(Rating::Good, base_time()).await.unwrap();

    assert_eq!(session.cursor(), 1);
    assert_eq!(store.persisted().len(), 1);
    assert_eq!(store.persisted()[0].0, current);
}

#[tokio::test]
async fn test_cancelled_rating_can_be_retried() {
    let store = RecordingStore::with_cards(&["Q1", "Q2"]).await;
    let mut session = loaded_session(&store).await;
    let current = session.current_card().unwrap().id;
    session.reveal().unwrap();

    store.hang_persist.store(true, Ordering::SeqCst);
    let cancelled = tokio::time::timeout(
        StdDuration::from_millis(50),
        session.rate_at(Rating::Good, base_time()),
    )
    .await;
    assert!(cancelled.is_err());

    assert!(!session.is_rating_in_flight());
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.cursor(), 0);
    assert!(session.is_revealed());
    assert_eq!(session.current_card().unwrap().id, current);

    store.hang_persist.store(false, Ordering::SeqCst);
    session.rate_at(Rating::Good, base_time()).await.unwrap();

    assert_eq!(session.cursor(), 1);
    assert_eq!(store.persisted().len(), 1);
    assert_eq!(store.persisted()[0].0, current);
}

#[tokio::test]
async fn test_cancelled_restart_keeps_completed_session() {
    let store = RecordingStore::with_cards(&["Q1"]).await;
    let mut session = loaded_session(&store).await;
    session.reveal().unwrap();
    session.rate_at(Rating::Good, base_time()).await.unwrap();
    assert_eq!(session.state(), SessionState::Complete(CompletionReason::AllReviewed));

    store.hang_fetch.store(true, Ordering::SeqCst);
    let cancelled = tokio::time::timeout(StdDuration::from_millis(50), session.restart_at(base_time())).await;
    assert!(cancelled.is_err());
    assert_eq!(session.state(), SessionState::Complete(CompletionReason::AllReviewed));

    store.hang_fetch.store(false, Ordering::SeqCst);
    session.restart_at(base_time()).await.unwrap();
    assert_eq!(session.state(), SessionState::Complete(CompletionReason::NothingDue));
}

#[tokio::test]
async fn test_each_due_card_is_presented_once() {
    let fronts = ["Q1", "Q2", "Q3", "Q4", "Q5", "Q6"];
    let store = RecordingStore::with_cards(&fronts).await;
    store.add("not yet", base_time() + Duration::days(2)).await;
    let mut session = loaded_session(&store).await;

    let mut shown = Vec::new();
    while let Some(card) = session.current_card() {
        shown.push(card.front.clone());
        session.reveal().unwrap();
        session.rate_at(Rating::Good, base_time()).await.unwrap();
    }

    shown.sort();
    assert_eq!(shown, fronts);
    assert_eq!(session.state(), SessionState::Complete(CompletionReason::AllReviewed));
    assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_same_seed_gives_same_order() {
    let store = RecordingStore::with_cards(&["Q1", "Q2", "Q3", "Q4", "Q5", "Q6", "Q7", "Q8"]).await;

    let mut orders = Vec::new();
    for _ in 0..2 {
        let mut session = ReviewSession::new(store.clone(), "alice").with_seed(9);
        session.load_at(base_time()).await.unwrap();
        let mut order = Vec::new();
        while let Some(card) = session.current_card() {
            order.push(card.id);
            session.reveal().unwrap();
            let pending = session.begin_rating(Rating::Good.quality(), base_time()).unwrap();
            // Skip the store so the due set stays the same for the next run.
            session.finish_rating(&pending, Ok(())).unwrap();
        }
        orders.push(order);
    }

    assert_eq!(orders[0].len(), 8);
    assert_eq!(orders[0], orders[1]);
}

#[tokio::test]
async fn test_operations_after_complete_are_rejected() {
    let store = RecordingStore::with_cards(&["Q1"]).await;
    let mut session = loaded_session(&store).await;
    session.reveal().unwrap();
    session.rate_at(Rating::Easy, base_time()).await.unwrap();
    assert!(session.is_complete());

    assert!(matches!(session.reveal(), Err(ReviewError::InvalidTransition(_))));
    assert!(matches!(
        session.rate_at(Rating::Easy, base_time()).await,
        Err(ReviewError::InvalidTransition(_))
    ));
    assert_eq!(store.persisted().len(), 1);
}

#[tokio::test]
async fn test_restart_refetches_due_cards() {
    let store = RecordingStore::with_cards(&["Q1"]).await;
    let mut session = loaded_session(&store).await;

    assert!(matches!(
        session.restart_at(base_time()).await,
        Err(ReviewError::InvalidTransition(_))
    ));

    session.reveal().unwrap();
    session.rate_at(Rating::Good, base_time()).await.unwrap();
    assert!(session.is_complete());

    let newcomer = store.add("Q2", base_time() - Duration::minutes(5)).await;
    session.restart_at(base_time()).await.unwrap();

    // Q1 is now due tomorrow, so only the new card is queued.
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.total(), 1);
    assert_eq!(session.current_card().unwrap().id, newcomer);
    assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_due_dates_use_session_timezone() {
    let store = RecordingStore::with_cards(&["Q1"]).await;
    let mut session = ReviewSession::new(store.clone(), "alice")
        .with_timezone(chrono_tz::Europe::London)
        .with_seed(3);
    let saturday_morning = Utc.with_ymd_and_hms(2024, 10, 26, 8, 0, 0).unwrap();
    session.load_at(saturday_morning).await.unwrap();
    session.reveal().unwrap();

    let update = session.rate_at(Rating::Good, saturday_morning).await.unwrap();

    // 09:00 BST on Saturday becomes 09:00 GMT on Sunday.
    assert_eq!(update.due_date, Utc.with_ymd_and_hms(2024, 10, 27, 9, 0, 0).unwrap());
}
