use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use super::routes::{auth, events, logs, medications, AppState};
use crate::application::{auth::Authenticator, medication_service::MedicationService};

pub fn app<S, A>(state: AppState<S, A>) -> Router
where
    S: MedicationService + Clone,
    A: Authenticator + Clone,
{
    Router::new()
        .route("/health", get(health::<S, A>).with_state(state.clone()))
        .merge(auth::router(state.clone()))
        .merge(medications::router(state.clone()))
        .merge(logs::router(state.clone()))
        .merge(events::router(state))
}

/// Always answers 200 so clients can read whether setup is still needed.
async fn health<S: MedicationService, A: Authenticator>(State(state): State<AppState<S, A>>) -> Json<Value> {
    match state.service.check_setup().await {
        Ok(true) => Json(json!({ "status": "ok", "isSetup": true, "message": "Database tables are ready" })),
        Ok(false) => Json(json!({ "status": "setup_required", "isSetup": false, "message": "Database tables not found" })),
        Err(err) => {
            tracing::error!(error = %err, "health check failed");
            Json(json!({ "status": "error", "isSetup": false, "message": err.to_string() }))
        }
    }
}
