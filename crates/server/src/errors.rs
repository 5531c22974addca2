use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scrapbook_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;

/// HTTP face of an [`InterfaceError`].
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    correlation_id: &'a str,
}

impl ApiError {
    pub fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Access denials carry no body at all.
        if matches!(self.0, InterfaceError::Forbidden { .. }) {
            return status.into_response();
        }

        let body =
            ErrorBody { error: self.0.user_message(), correlation_id: self.0.correlation_id() };
        (status, Json(body)).into_response()
    }
}
