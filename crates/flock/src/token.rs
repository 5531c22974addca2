//! Event token verification.
//!
//! Every request Flock sends (event webhooks and widget loads) carries an event
//! token: an HS256 JWT signed with the app secret whose `appId` claim names the
//! app and whose `userId` claim names the user the request acts for.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use scrapbook_core::domain::scrap::UserId;

/// Header carrying the token on event webhooks.
pub const EVENT_TOKEN_HEADER: &str = "x-flock-event-token";
/// Query parameter carrying the token on widget and browser requests.
pub const EVENT_TOKEN_QUERY_PARAM: &str = "flockEventToken";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTokenClaims {
    #[serde(rename = "appId")]
    pub app_id: String,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("event token is missing")]
    Missing,
    #[error("event token is invalid: {0}")]
    Invalid(String),
    #[error("event token was issued for app `{actual}`")]
    WrongApp { actual: String },
}

#[derive(Clone)]
pub struct EventTokenVerifier {
    app_id: String,
    app_secret: SecretString,
}

impl EventTokenVerifier {
    pub fn new(app_id: impl Into<String>, app_secret: SecretString) -> Self {
        Self { app_id: app_id.into(), app_secret }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn verify(&self, token: &str) -> Result<EventTokenClaims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        let key = DecodingKey::from_secret(self.app_secret.expose_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        // exp is checked when present; Flock does not promise it on every token.
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        let data = decode::<EventTokenClaims>(token, &key, &validation)
            .map_err(|error| TokenError::Invalid(error.to_string()))?;

        if data.claims.app_id != self.app_id {
            return Err(TokenError::WrongApp { actual: data.claims.app_id });
        }

        Ok(data.claims)
    }

    /// Signs a token the way the platform does. Used by local tooling and tests.
    pub fn issue(&self, user_id: &UserId, exp: Option<u64>) -> Result<String, TokenError> {
        let claims =
            EventTokenClaims { app_id: self.app_id.clone(), user_id: user_id.clone(), exp };
        let key = EncodingKey::from_secret(self.app_secret.expose_secret().as_bytes());
        encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|error| TokenError::Invalid(error.to_string()))
    }
}

impl std::fmt::Debug for EventTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTokenVerifier").field("app_id", &self.app_id).finish_non_exhaustive()
    }
}
