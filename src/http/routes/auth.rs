use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::application::{auth::Authenticator, medication_service::MedicationService};
use crate::http::types::ApiError;

pub fn router<S, A>(state: AppState<S, A>) -> Router
where
    S: MedicationService + Clone,
    A: Authenticator + Clone,
{
    Router::new()
        .route("/auth/signup", post(signup::<S, A>))
        .with_state(state)
}

#[derive(Deserialize)]
struct SignupBody {
    #[serde(default)]
    email: String,
    name: Option<String>,
}

async fn signup<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    Json(payload): Json<SignupBody>,
) -> Result<Json<Value>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    let (user, token) = state.auth.signup(&payload.email, payload.name.as_deref()).await?;
    Ok(Json(json!({ "success": true, "message": "Account created successfully", "user": user, "token": token })))
}
