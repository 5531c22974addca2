use axum::{body::Bytes, extract::State, Extension, Json};
use scrapbook_core::errors::{ApplicationError, DomainError};
use scrapbook_flock::{
    events::{DispatchError, EventContext, EventHandlerError, FlockEvent},
    token::EventTokenClaims,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{errors::ApiError, routes::AppState};

pub async fn receive(
    State(state): State<AppState>,
    Extension(claims): Extension<EventTokenClaims>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let event = FlockEvent::from_slice(&body).map_err(|parse_error| {
        warn!(
            event_name = "ingress.flock.event_malformed",
            correlation_id = %correlation_id,
            error = %parse_error,
            "rejecting malformed event"
        );
        ApiError::from_application(
            DomainError::MalformedEvent(parse_error.to_string()).into(),
            &correlation_id,
        )
    })?;

    info!(
        event_name = "ingress.flock.event_received",
        correlation_id = %correlation_id,
        flock_event = event.name(),
        event_user_id = ?event.user_id(),
        token_user_id = %claims.user_id,
        "flock event received"
    );

    let ctx = EventContext { correlation_id: correlation_id.clone() };
    let outcome = state.dispatcher.dispatch(&event, &ctx).await.map_err(|dispatch_error| {
        error!(
            event_name = "ingress.flock.event_failed",
            correlation_id = %correlation_id,
            flock_event = event.name(),
            error = %dispatch_error,
            "flock event handler failed"
        );
        ApiError::from_application(application_error(dispatch_error), &correlation_id)
    })?;

    info!(
        event_name = "ingress.flock.event_handled",
        correlation_id = %correlation_id,
        flock_event = event.name(),
        outcome = ?outcome,
        "flock event handled"
    );

    Ok(Json(json!({})))
}

fn application_error(error: DispatchError) -> ApplicationError {
    match error {
        DispatchError::Handler(EventHandlerError::Store(error)) => {
            ApplicationError::Persistence(error.to_string())
        }
        DispatchError::Handler(EventHandlerError::Render(error)) => {
            ApplicationError::Rendering(error.to_string())
        }
    }
}
