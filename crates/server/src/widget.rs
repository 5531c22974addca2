//! Scrap list widget.
//!
//! Flock loads the widget with the triggering event in the `flockEvent` query
//! parameter. The event must name the same user as the verified token; a
//! mismatch is answered with an empty `403` before the store is touched.

use axum::{
    extract::{Query, State},
    response::Html,
    Extension,
};
use scrapbook_core::{
    domain::scrap::{ConversationId, UserId},
    errors::{ApplicationError, DomainError},
    linkify::{split_first_url, Segments},
};
use scrapbook_db::ScrapRepository;
use scrapbook_flock::token::EventTokenClaims;
use serde::{Deserialize, Serialize};
use tera::{escape_html, Context};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{errors::ApiError, routes::AppState, templates::WIDGET_TEMPLATE};

#[derive(Debug, Deserialize)]
pub struct WidgetQuery {
    #[serde(rename = "flockEvent")]
    pub flock_event: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WidgetEvent {
    user_id: UserId,
    chat: ConversationId,
    #[serde(default)]
    chat_name: Option<String>,
}

#[derive(Serialize)]
struct WidgetContext<'a> {
    scraps: Vec<String>,
    chat_name: Option<&'a str>,
}

pub async fn scraps(
    State(state): State<AppState>,
    Extension(claims): Extension<EventTokenClaims>,
    Query(query): Query<WidgetQuery>,
) -> Result<Html<String>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let bad_request = |reason: String| {
        warn!(
            event_name = "ingress.widget.bad_request",
            correlation_id = %correlation_id,
            reason = %reason,
            "widget request rejected"
        );
        ApiError::from_application(DomainError::MalformedEvent(reason).into(), &correlation_id)
    };

    let raw = query
        .flock_event
        .ok_or_else(|| bad_request("flockEvent query parameter is missing".to_owned()))?;
    let event: WidgetEvent = serde_json::from_str(&raw)
        .map_err(|parse_error| bad_request(format!("flockEvent is not valid: {parse_error}")))?;

    if event.user_id != claims.user_id {
        warn!(
            event_name = "ingress.widget.identity_mismatch",
            correlation_id = %correlation_id,
            event_user_id = %event.user_id,
            token_user_id = %claims.user_id,
            "widget event user does not match event token"
        );
        let mismatch = DomainError::IdentityMismatch {
            event_user: event.user_id.to_string(),
            token_user: claims.user_id.to_string(),
        };
        return Err(ApiError::from_application(mismatch.into(), &correlation_id));
    }

    let stored = state.store.list_scraps(&claims.user_id, &event.chat).await.map_err(|error| {
        error!(
            event_name = "ingress.widget.store_failed",
            correlation_id = %correlation_id,
            error = %error,
            "could not list scraps"
        );
        let failure = ApplicationError::Persistence(error.to_string());
        ApiError::from_application(failure, &correlation_id)
    })?;

    let scraps: Vec<String> =
        stored.unwrap_or_default().iter().map(|text| linkify_html(text)).collect();
    info!(
        event_name = "ingress.widget.rendered",
        correlation_id = %correlation_id,
        user_id = %claims.user_id,
        conversation_id = %event.chat,
        scrap_count = scraps.len(),
        "rendering scrap widget"
    );

    let html = Context::from_serialize(WidgetContext {
        scraps,
        chat_name: event.chat_name.as_deref(),
    })
    .and_then(|context| state.templates.render(WIDGET_TEMPLATE, &context))
    .map_err(|render_error| {
        error!(
            event_name = "ingress.widget.render_failed",
            correlation_id = %correlation_id,
            error = %render_error,
            "widget template failed to render"
        );
        ApiError::from_application(
            ApplicationError::Rendering(render_error.to_string()),
            &correlation_id,
        )
    })?;

    Ok(Html(html))
}

/// Escapes a scrap for HTML and wraps its first URL in an anchor.
pub fn linkify_html(text: &str) -> String {
    match split_first_url(text) {
        Segments::Plain(text) => escape_html(text),
        Segments::Linked { before, url, after } => {
            let url = escape_url(url);
            format!(r#"{}<a href="{url}">{url}</a>{}"#, escape_html(before), escape_html(after))
        }
    }
}

/// The URL pattern admits no markup characters other than `&`.
fn escape_url(url: &str) -> String {
    url.replace('&', "&amp;")
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use scrapbook_core::domain::scrap::{ConversationId, UserId};
    use scrapbook_db::ScrapRepository;
    use tower::ServiceExt;

    use super::linkify_html;
    use crate::routes::{router, test_support::harness};

    fn widget_request(flock_event: Option<&str>, token: Option<&str>) -> Request<Body> {
        let mut params = Vec::new();
        if let Some(event) = flock_event {
            params.push(format!("flockEvent={}", encode(event)));
        }
        if let Some(token) = token {
            params.push(format!("flockEventToken={token}"));
        }
        Request::builder()
            .uri(format!("/scraps?{}", params.join("&")))
            .body(Body::empty())
            .expect("request")
    }

    fn encode(value: &str) -> String {
        value
            .bytes()
            .map(|byte| match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    (byte as char).to_string()
                }
                other => format!("%{other:02X}"),
            })
            .collect()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[test]
    fn linkify_wraps_first_url_and_escapes_the_rest() {
        assert_eq!(
            linkify_html("hello http://example.com world"),
            r#"hello <a href="http://example.com">http://example.com</a> world"#
        );
        assert_eq!(
            linkify_html("<i>see</i> https://a.example.com?x=1&y=2"),
            r#"&lt;i&gt;see&lt;&#x2F;i&gt; <a href="https://a.example.com?x=1&amp;y=2">https://a.example.com?x=1&amp;y=2</a>"#
        );
        assert_eq!(linkify_html("no links & <b>"), "no links &amp; &lt;b&gt;");
    }

    #[tokio::test]
    async fn owner_sees_linkified_scraps() {
        let harness = harness();
        harness
            .store
            .save_scrap(
                &UserId::from("U1"),
                &ConversationId::from("C1"),
                "hello http://example.com world",
            )
            .await
            .expect("save");
        let token = harness.token_for("U1");

        let response = router(harness.state.clone())
            .oneshot(widget_request(Some(r#"{"userId":"U1","chat":"C1"}"#), Some(&token)))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        assert!(content_type.starts_with("text/html"));
        let html = body_text(response).await;
        assert!(html.contains(r#"<a href="http://example.com">http://example.com</a>"#));
    }

    #[tokio::test]
    async fn other_users_event_is_forbidden_without_data() {
        let harness = harness();
        harness
            .store
            .save_scrap(&UserId::from("U2"), &ConversationId::from("C1"), "private note")
            .await
            .expect("save");
        let token = harness.token_for("U1");

        let response = router(harness.state.clone())
            .oneshot(widget_request(Some(r#"{"userId":"U2","chat":"C1"}"#), Some(&token)))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn conversation_without_scraps_renders_empty_state() {
        let harness = harness();
        let token = harness.token_for("U1");

        let response = router(harness.state.clone())
            .oneshot(widget_request(Some(r#"{"userId":"U1","chat":"C9"}"#), Some(&token)))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("No scraps saved"));
    }

    #[tokio::test]
    async fn missing_or_malformed_event_is_bad_request() {
        let harness = harness();
        let token = harness.token_for("U1");

        let missing = router(harness.state.clone())
            .oneshot(widget_request(None, Some(&token)))
            .await
            .expect("response");
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let malformed = router(harness.state.clone())
            .oneshot(widget_request(Some("{userId"), Some(&token)))
            .await
            .expect("response");
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let harness = harness();

        let response = router(harness.state.clone())
            .oneshot(widget_request(Some(r#"{"userId":"U1","chat":"C1"}"#), None))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
