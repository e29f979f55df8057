pub mod auth;
pub mod events;
pub mod logs;
pub mod medications;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{Local, NaiveDate};

use super::types::ApiError;
use crate::application::{
    auth::{AuthUser, Authenticator},
    medication_service::MedicationService,
};
use crate::domain::{medication::MedicationId, schedule::parse_calendar_date};

#[derive(Clone)]
pub struct AppState<S: MedicationService, A: Authenticator> {
    pub service: S,
    pub auth: A,
}

pub(crate) async fn current_user<S: MedicationService, A: Authenticator>(
    state: &AppState<S, A>,
    headers: &HeaderMap,
) -> Result<AuthUser, ApiError> {
    let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    Ok(state.auth.authenticate(header).await?)
}

/// `?date=YYYY-MM-DD`, defaulting to the local today.
pub(crate) fn parse_day(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Ok(parse_calendar_date(raw)?),
        None => Ok(Local::now().date_naive()),
    }
}

pub(crate) fn parse_id(s: &str) -> Result<MedicationId, ApiError> {
    uuid::Uuid::parse_str(s).map(MedicationId).map_err(|_| ApiError::bad_request("invalid id"))
}
