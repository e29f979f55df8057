use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{current_user, parse_day, parse_id, AppState};
use crate::application::{auth::Authenticator, medication_service::MedicationService};
use crate::domain::medication::{MedicationPatch, NewMedication};
use crate::domain::schedule::projector::SortBy;
use crate::http::types::ApiError;

pub fn router<S, A>(state: AppState<S, A>) -> Router
where
    S: MedicationService + Clone,
    A: Authenticator + Clone,
{
    Router::new()
        .route("/medications", get(list_medications::<S, A>).post(create_medication::<S, A>))
        .route(
            "/medications/:id",
            get(get_medication::<S, A>).put(update_medication::<S, A>).delete(delete_medication::<S, A>),
        )
        .route("/medications/:id/duplicate", post(duplicate_medication::<S, A>))
        .route("/schedule", get(schedule::<S, A>))
        .with_state(state)
}

#[derive(Deserialize)]
struct DayQuery { date: Option<String> }

#[derive(Deserialize)]
struct ScheduleQuery {
    date: Option<String>,
    sort_by: Option<String>,
    show_completed: Option<bool>,
}

async fn list_medications<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Query(query): Query<DayQuery>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let date = parse_day(query.date.as_deref())?;
    let medications = state.service.day_view(user.id, date).await?;
    tracing::debug!(user_id = %user.id.0, %date, count = medications.len(), "medications listed");
    Ok(Json(json!({ "success": true, "date": date, "medications": medications })))
}

async fn create_medication<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Json(payload): Json<NewMedication>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let medication = state.service.create(user.id, payload).await?;
    Ok(Json(json!({ "medication": medication })))
}

async fn get_medication<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let id = parse_id(&id)?;
    match state.service.get(user.id, id).await? {
        Some(medication) => Ok(Json(json!({ "medication": medication }))),
        None => Err(ApiError::not_found()),
    }
}

async fn update_medication<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<MedicationPatch>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let id = parse_id(&id)?;
    match state.service.update(user.id, id, payload).await? {
        Some(medication) => Ok(Json(json!({ "medication": medication }))),
        None => Err(ApiError::not_found()),
    }
}

async fn delete_medication<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let id = parse_id(&id)?;
    if state.service.delete(user.id, id).await? {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(ApiError::not_found())
    }
}

async fn duplicate_medication<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let id = parse_id(&id)?;
    match state.service.duplicate(user.id, id).await? {
        Some(medication) => Ok(Json(json!({ "medication": medication }))),
        None => Err(ApiError::not_found()),
    }
}

async fn schedule<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let date = parse_day(query.date.as_deref())?;
    let sort_by = match query.sort_by.as_deref() {
        Some(raw) => raw.parse::<SortBy>()?,
        None => SortBy::default(),
    };
    let show_completed = query.show_completed.unwrap_or(true);
    let items = state.service.schedule(user.id, date, show_completed, sort_by).await?;
    Ok(Json(json!({ "date": date, "sort_by": sort_by, "show_completed": show_completed, "items": items })))
}
