use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{current_user, parse_day, parse_id, AppState};
use crate::application::{
    auth::Authenticator,
    medication_service::{MarkOutcome, MedicationService},
};
use crate::http::types::ApiError;

pub fn router<S, A>(state: AppState<S, A>) -> Router
where
    S: MedicationService + Clone,
    A: Authenticator + Clone,
{
    Router::new()
        .route("/logs/today", get(logs_for_day::<S, A>))
        .route("/logs", post(mark_taken::<S, A>))
        .route("/logs/:medication_id", delete(unmark::<S, A>))
        .with_state(state)
}

#[derive(Deserialize)]
struct DayQuery { date: Option<String> }

#[derive(Deserialize)]
struct MarkBody {
    #[serde(default)]
    medication_id: String,
    marked_by: Option<String>,
}

async fn logs_for_day<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Query(query): Query<DayQuery>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let date = parse_day(query.date.as_deref())?;
    let logs = state.service.logs_for_day(user.id, date).await?;
    Ok(Json(json!({ "date": date, "logs": logs })))
}

async fn mark_taken<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Json(payload): Json<MarkBody>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    if payload.medication_id.trim().is_empty() {
        return Err(ApiError::bad_request("medication_id is required"));
    }
    let id = parse_id(&payload.medication_id)?;
    // Default to the caller's display name; the service falls back to the patient.
    let marked_by = payload.marked_by.or_else(|| Some(user.name.clone()).filter(|name| !name.trim().is_empty()));
    let outcome = state.service.mark_taken(user.id, id, marked_by).await?;
    let already_taken = matches!(outcome, MarkOutcome::AlreadyTaken(_));
    Ok(Json(json!({ "success": true, "already_taken": already_taken, "log": outcome.log() })))
}

async fn unmark<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Path(medication_id): Path<String>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let id = parse_id(&medication_id)?;
    let date = parse_day(query.date.as_deref())?;
    let removed = state.service.unmark(user.id, id, date).await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}
