//! Event token gate for routes Flock calls.
//!
//! The token is taken from the `X-Flock-Event-Token` header, falling back to
//! the `flockEventToken` query parameter (widget loads arrive as plain GETs).
//! Verified claims are handed to handlers as a request extension.

use std::collections::HashMap;

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use scrapbook_core::errors::ApplicationError;
use scrapbook_flock::token::{EVENT_TOKEN_HEADER, EVENT_TOKEN_QUERY_PARAM};
use tracing::warn;

use crate::{errors::ApiError, routes::AppState};

pub async fn require_event_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = event_token(&request).unwrap_or_default();

    match state.verifier.verify(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(error) => {
            warn!(
                event_name = "ingress.flock.token_rejected",
                correlation_id = "unauthenticated",
                path = %request.uri().path(),
                error = %error,
                "event token rejected"
            );
            ApiError::from_application(
                ApplicationError::Authentication(error.to_string()),
                "unauthenticated",
            )
            .into_response()
        }
    }
}

fn event_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(EVENT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    from_header.or_else(|| {
        Query::<HashMap<String, String>>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(mut params)| params.remove(EVENT_TOKEN_QUERY_PARAM))
    })
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};

    use super::event_token;

    #[test]
    fn header_takes_precedence_over_query() {
        let request = Request::builder()
            .uri("/scraps?flockEventToken=from-query")
            .header("X-Flock-Event-Token", "from-header")
            .body(Body::empty())
            .expect("request");

        assert_eq!(event_token(&request).as_deref(), Some("from-header"));
    }

    #[test]
    fn query_parameter_is_used_without_header() {
        let request = Request::builder()
            .uri("/scraps?flockEvent=%7B%7D&flockEventToken=abc.def.ghi")
            .body(Body::empty())
            .expect("request");

        assert_eq!(event_token(&request).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn absent_everywhere_is_none() {
        let request = Request::builder().uri("/events").body(Body::empty()).expect("request");

        assert_eq!(event_token(&request), None);
    }
}
