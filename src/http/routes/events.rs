use std::convert::Infallible;

use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;

use super::{current_user, AppState};
use crate::application::{auth::Authenticator, medication_service::MedicationService};
use crate::http::types::ApiError;

pub fn router<S, A>(state: AppState<S, A>) -> Router
where
    S: MedicationService + Clone,
    A: Authenticator + Clone,
{
    Router::new()
        .route("/events", get(events::<S, A>))
        .with_state(state)
}

/// Streams `change` events for the caller's rows. Payloads name the table
/// only; clients reload everything on receipt.
async fn events<S: MedicationService, A: Authenticator>(
    State(state): State<AppState<S, A>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let user_id = user.id;
    let receiver = state.service.subscribe();
    tracing::debug!(user_id = %user_id.0, "change stream opened");

    let stream = stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(signal) if signal.user_id == user_id => {
                    let event = Event::default().event("change").data(signal.table.as_str());
                    return Some((Ok::<_, Infallible>(event), receiver));
                }
                Ok(_) => continue,
                // Missed signals collapse into one reload.
                Err(RecvError::Lagged(_)) => {
                    return Some((Ok::<_, Infallible>(Event::default().event("change").data("reload")), receiver));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
