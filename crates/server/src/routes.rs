//! HTTP surface.
//!
//! - `POST /events`  Flock event webhook (token required)
//! - `GET  /scraps`  scrap list widget (token required)
//! - `GET  /health`  readiness report

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use scrapbook_db::ScrapStore;
use scrapbook_flock::{events::EventDispatcher, token::EventTokenVerifier};
use tera::Tera;

use crate::{auth, events, health, widget};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScrapStore>,
    pub dispatcher: Arc<EventDispatcher>,
    pub verifier: Arc<EventTokenVerifier>,
    pub templates: Arc<Tera>,
}

pub fn router(state: AppState) -> Router {
    let flock_routes = Router::new()
        .route("/events", post(events::receive))
        .route("/scraps", get(widget::scraps))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_event_token));

    Router::new().merge(flock_routes).route("/health", get(health::health)).with_state(state)
}
