use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::sync::watch;
use shared::protocol::API_PREFIX;
use shared::types::{Medication, MedicationDraft, MedicationId};
use crate::alarm::notify::Notification;
use crate::alarm::{NotificationBoard, ScheduleEntry};
use crate::engine::{EngineError, ReminderEngine};
use crate::schedule::ScheduleError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReminderEngine>,
    pub board: Arc<NotificationBoard>,
    pub hash_rx: watch::Receiver<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub enum ApiError {
    Engine(EngineError),
    /// Body could not be read as a medication draft
    BadBody(String),
    NoSchedule(MedicationId),
    NoNotification(MedicationId),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::Engine(e) => {
                let status = match &e {
                    EngineError::MissingField(_) => StatusCode::BAD_REQUEST,
                    EngineError::Schedule(ScheduleError::ScheduleInThePast { .. }) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    EngineError::Schedule(_) => StatusCode::BAD_REQUEST,
                    EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                    EngineError::RegistrationFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
                    EngineError::Storage(e) => {
                        tracing::error!("Storage failure: {:#}", e);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string())
            }
            Self::BadBody(reason) => (StatusCode::BAD_REQUEST, reason),
            Self::NoSchedule(id) => (StatusCode::NOT_FOUND, format!("no alarm armed for medication {}", id)),
            Self::NoNotification(id) => {
                (StatusCode::NOT_FOUND, format!("no active notification for medication {}", id))
            }
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/medications", get(list_medications).post(create_medication))
        .route("/medications/hash", get(get_hash))
        .route(
            "/medications/:id",
            get(get_medication).put(edit_medication).delete(delete_medication),
        )
        .route("/schedules", get(list_schedules))
        .route("/schedules/:id", get(get_schedule))
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id", get(get_notification).delete(dismiss_notification));

    Router::new().nest(API_PREFIX, api).with_state(state)
}

async fn list_medications(State(state): State<AppState>) -> Result<Json<Vec<Medication>>, ApiError> {
    Ok(Json(state.engine.list().await?))
}

async fn create_medication(
    State(state): State<AppState>,
    payload: Result<Json<MedicationDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Medication>), ApiError> {
    let Json(draft) = payload?;
    let medication = state.engine.submit(draft).await?;
    Ok((StatusCode::CREATED, Json(medication)))
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.hash_rx.borrow().clone()
}

async fn get_medication(
    State(state): State<AppState>,
    Path(id): Path<MedicationId>,
) -> Result<Json<Medication>, ApiError> {
    Ok(Json(state.engine.get(id).await?))
}

async fn edit_medication(
    State(state): State<AppState>,
    Path(id): Path<MedicationId>,
    payload: Result<Json<MedicationDraft>, JsonRejection>,
) -> Result<Json<Medication>, ApiError> {
    let Json(draft) = payload?;
    Ok(Json(state.engine.edit(id, draft).await?))
}

async fn delete_medication(
    State(state): State<AppState>,
    Path(id): Path<MedicationId>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_schedules(State(state): State<AppState>) -> Json<Vec<ScheduleEntry>> {
    Json(state.engine.schedules().await)
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<MedicationId>,
) -> Result<Json<ScheduleEntry>, ApiError> {
    match state.engine.schedule(id).await {
        Ok(entry) => Ok(Json(entry)),
        Err(EngineError::NotFound(_)) => Err(ApiError::NoSchedule(id)),
        Err(e) => Err(e.into()),
    }
}

async fn list_notifications(State(state): State<AppState>) -> Json<Vec<Notification>> {
    Json(state.board.active())
}

async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<MedicationId>,
) -> Result<Json<Notification>, ApiError> {
    state.board.get(id).map(Json).ok_or(ApiError::NoNotification(id))
}

async fn dismiss_notification(
    State(state): State<AppState>,
    Path(id): Path<MedicationId>,
) -> StatusCode {
    if state.board.dismiss(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
