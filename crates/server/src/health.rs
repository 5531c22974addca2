use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use scrapbook_db::ScrapStore;
use serde::Serialize;

use crate::routes::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(state.store.as_ref()).await;
    let ready = store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!(
                "scrapbook-server handling events with {} handlers",
                state.dispatcher.handler_count()
            ),
        },
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn store_check(store: &dyn ScrapStore) -> HealthCheck {
    let backend = store.backend_name();
    match store.ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: format!("{backend} store reachable") },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("{backend} store check failed: {error}"),
        },
    }
}
