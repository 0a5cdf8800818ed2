use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::{
    api_error,
    card_service::CardService,
    config::ReviewConfig,
    database::Database,
    errors::{ApiError, ErrorContext, classify_database_error},
    models::*,
    review_session::{ReviewSession, SessionSnapshot},
    scheduler::{Quality, Rating},
    store::CardStore,
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn};

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

type SessionHandle = Arc<Mutex<ReviewSession>>;

#[derive(Clone)]
pub struct AppState {
    pub card_service: CardService,
    pub store: Arc<dyn CardStore>,
    pub review: ReviewConfig,
    pub review_sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl AppState {
    pub fn new(db: Database, review: ReviewConfig) -> Self {
        let store: Arc<dyn CardStore> = Arc::new(db.clone());
        Self::with_store(db, store, review)
    }

    /// Review sessions read and write through `store` instead of `db`.
    pub fn with_store(db: Database, store: Arc<dyn CardStore>, review: ReviewConfig) -> Self {
        Self {
            card_service: CardService::new(db),
            store,
            review,
            review_sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[derive(Deserialize)]
pub struct OwnerParams {
    pub owner_id: String,
}

#[derive(Deserialize)]
pub struct ListCardsParams {
    pub owner_id: String,
    pub course_id: Option<String>,
}

#[derive(Deserialize)]
pub struct StartSessionRequest {
    pub owner_id: String,
}

/// Either one of the four answer buttons or a raw 0-5 quality.
#[derive(Deserialize)]
pub struct RateRequest {
    pub rating: Option<Rating>,
    pub quality: Option<i32>,
}

impl RateRequest {
    fn quality(&self) -> Result<Quality, ApiError> {
        match (self.rating, self.quality) {
            (Some(rating), _) => Ok(rating.quality()),
            (None, Some(value)) => Quality::new(value).ok_or_else(|| {
                ApiError::ValidationError(format!("quality must be between 0 and 5, got {}", value))
            }),
            (None, None) => Err(ApiError::BadRequest(
                "either 'rating' or 'quality' is required".to_string(),
            )),
        }
    }
}

#[derive(Serialize)]
pub struct RateResponse {
    pub update: ScheduleUpdate,
    pub session: SessionSnapshot,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

// Card endpoints
pub async fn create_card(
    State(state): State<AppState>,
    Json(request): Json<CreateFlashcardRequest>,
) -> ApiResult<Flashcard> {
    info!(
        owner_id = %request.owner_id,
        course_id = %request.course_id,
        "Creating new flashcard"
    );

    match state.card_service.create_flashcard(request).await {
        Ok(card) => {
            log_api_success!("create_card", card_id = card.id, "flashcard created");
            Ok(Json(ApiResponse::success(card)))
        }
        Err(e) => {
            let context = ErrorContext::new("create_card", "flashcard");
            Err(classify_database_error(&e).to_response_with_context(context))
        }
    }
}

pub async fn list_cards(
    State(state): State<AppState>,
    Query(params): Query<ListCardsParams>,
) -> ApiResult<Vec<Flashcard>> {
    log_api_start!("list_cards", owner_id = params.owner_id);

    match state
        .card_service
        .list_flashcards(&params.owner_id, params.course_id.as_deref())
        .await
    {
        Ok(cards) => {
            log_api_success!("list_cards", count = cards.len(), "flashcards listed");
            Ok(Json(ApiResponse::success(cards)))
        }
        Err(e) => Err(api_error!(database, "list_cards", "flashcard", e)),
    }
}

pub async fn get_card(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Flashcard> {
    log_api_start!("get_card", card_id = id);

    match state.card_service.get_flashcard(id).await {
        Ok(Some(card)) => Ok(Json(ApiResponse::success(card))),
        Ok(None) => {
            log_api_warn!("get_card", card_id = id, "flashcard not found");
            Err(api_error!(not_found, "get_card", "flashcard", id))
        }
        Err(e) => Err(api_error!(database, "get_card", "flashcard", e)),
    }
}

pub async fn get_due_cards(
    State(state): State<AppState>,
    Query(params): Query<OwnerParams>,
) -> ApiResult<DueCardsSummary> {
    log_api_start!("get_due_cards", owner_id = params.owner_id);

    match state.card_service.due_cards(&params.owner_id).await {
        Ok(summary) => {
            log_api_success!("get_due_cards", count = summary.due_count, "due flashcards listed");
            Ok(Json(ApiResponse::success(summary)))
        }
        Err(e) => Err(api_error!(database, "get_due_cards", "flashcard", e)),
    }
}

pub async fn delete_card(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<()> {
    log_api_start!("delete_card", card_id = id);

    match state.card_service.delete_flashcard(id).await {
        Ok(true) => {
            log_api_success!("delete_card", card_id = id, "flashcard deleted");
            Ok(Json(ApiResponse::success(())))
        }
        Ok(false) => Err(api_error!(not_found, "delete_card", "flashcard", id)),
        Err(e) => Err(api_error!(database, "delete_card", "flashcard", e)),
    }
}

// Review session endpoints
pub async fn start_review_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> ApiResult<SessionSnapshot> {
    log_api_start!("start_review_session", owner_id = request.owner_id);

    if request.owner_id.trim().is_empty() {
        return Err(api_error!(validation, "start_review_session", "review_session", "owner_id is required"));
    }

    let mut session = ReviewSession::new(state.store.clone(), request.owner_id)
        .with_timezone(state.review.timezone);
    if let Some(seed) = state.review.shuffle_seed {
        session = session.with_seed(seed);
    }

    if let Err(e) = session.load().await {
        let context = ErrorContext::new("start_review_session", "review_session");
        return Err(ApiError::from(e).to_response_with_context(context));
    }

    let snapshot = session.snapshot();
    state
        .review_sessions
        .write()
        .await
        .insert(session.id(), Arc::new(Mutex::new(session)));

    log_api_success!("start_review_session", session_id = snapshot.session_id, "review session started");
    Ok(Json(ApiResponse::success(snapshot)))
}

async fn find_session(state: &AppState, operation: &str, id: Uuid) -> Result<SessionHandle, (StatusCode, Json<ApiResponse<()>>)> {
    let sessions = state.review_sessions.read().await;
    match sessions.get(&id) {
        Some(session) => Ok(session.clone()),
        None => {
            log_api_warn!(operation, session_id = id, "review session not found");
            Err(api_error!(not_found, operation, "review_session", id))
        }
    }
}

fn session_error(operation: &str, id: Uuid, error: impl Into<ApiError>) -> (StatusCode, Json<ApiResponse<()>>) {
    let context = ErrorContext::new(operation, "review_session").with_id(&id.to_string());
    error.into().to_response_with_context(context)
}

pub async fn get_review_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSnapshot> {
    let session = find_session(&state, "get_review_session", id).await?;
    let session = session.lock().await;
    Ok(Json(ApiResponse::success(session.snapshot())))
}

pub async fn reveal_card(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSnapshot> {
    log_api_start!("reveal_card", session_id = id);

    let session = find_session(&state, "reveal_card", id).await?;
    let mut session = session.lock().await;
    session
        .reveal()
        .map_err(|e| session_error("reveal_card", id, e))?;

    Ok(Json(ApiResponse::success(session.snapshot())))
}

/// Rates the current card.
///
/// The session lock is released while the store write is outstanding; a
/// second rating arriving in that window is rejected by the session. The
/// write and its bookkeeping run on their own task so a dropped request
/// cannot leave the card marked as in flight.
pub async fn rate_card(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RateRequest>,
) -> ApiResult<RateResponse> {
    log_api_start!("rate_card", session_id = id);

    let quality = request
        .quality()
        .map_err(|e| session_error("rate_card", id, e))?;
    let handle = find_session(&state, "rate_card", id).await?;

    let (pending, store) = {
        let mut session = handle.lock().await;
        let pending = session
            .begin_rating(quality, Utc::now())
            .map_err(|e| session_error("rate_card", id, e))?;
        (pending, session.store())
    };

    let card_id = pending.card_id;
    let update = pending.update;
    let write = tokio::spawn(async move {
        let outcome = store
            .persist_card_schedule(pending.card_id, &pending.update)
            .await;
        let mut session = handle.lock().await;
        session
            .finish_rating(&pending, outcome)
            .map(|()| session.snapshot())
    });

    let snapshot = match write.await {
        Ok(result) => result.map_err(|e| session_error("rate_card", id, e))?,
        Err(e) => {
            let error = ApiError::StoreUnavailable(format!("rating task failed: {}", e));
            return Err(session_error("rate_card", id, error));
        }
    };

    log_api_success!("rate_card", card_id = card_id, "card rated");
    Ok(Json(ApiResponse::success(RateResponse {
        update,
        session: snapshot,
    })))
}

pub async fn restart_review_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSnapshot> {
    log_api_start!("restart_review_session", session_id = id);

    let session = find_session(&state, "restart_review_session", id).await?;
    let mut session = session.lock().await;
    session
        .restart()
        .await
        .map_err(|e| session_error("restart_review_session", id, e))?;

    log_api_success!("restart_review_session", session_id = id, "review session restarted");
    Ok(Json(ApiResponse::success(session.snapshot())))
}

pub async fn delete_review_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    match state.review_sessions.write().await.remove(&id) {
        Some(_) => {
            log_api_success!("delete_review_session", session_id = id, "review session discarded");
            Ok(Json(ApiResponse::success(())))
        }
        None => Err(api_error!(not_found, "delete_review_session", "review_session", id)),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Card routes
        .route("/api/cards", post(create_card))
        .route("/api/cards", get(list_cards))
        .route("/api/cards/due", get(get_due_cards))
        .route("/api/cards/:id", get(get_card))
        .route("/api/cards/:id", delete(delete_card))

        // Review session routes
        .route("/api/review/sessions", post(start_review_session))
        .route("/api/review/sessions/:id", get(get_review_session))
        .route("/api/review/sessions/:id", delete(delete_review_session))
        .route("/api/review/sessions/:id/reveal", post(reveal_card))
        .route("/api/review/sessions/:id/rate", post(rate_card))
        .route("/api/review/sessions/:id/restart", post(restart_review_session))

        .with_state(state)
}
