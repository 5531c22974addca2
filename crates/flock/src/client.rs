//! Flock API client
//!
//! Outbound calls to `https://api.flock.co/v1/<method>`. Calls are made on
//! behalf of a user with the token handed to the bot at install time.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

const USER_TOKEN_HEADER: &str = "X-Flock-User-Token";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendMessageRequest {
    /// Recipient conversation (user or group id).
    pub to: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flockml: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SendMessageResponse {
    pub uid: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Error)]
pub enum FlockApiError {
    #[error("request to flock api failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("flock api returned {status}: {error} ({description})")]
    Api { status: u16, error: String, description: String },
    #[error("could not parse flock api response `{body}`: {source}")]
    Parse { body: String, source: serde_json::Error },
}

#[async_trait]
pub trait FlockApi: Send + Sync {
    async fn send_message(
        &self,
        token: &SecretString,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, FlockApiError>;
}

pub struct FlockClient {
    client: Client,
    base_url: String,
}

impl FlockClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FlockApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_owned() })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn call_method<B, R>(
        &self,
        method: &str,
        token: &SecretString,
        body: &B,
    ) -> Result<R, FlockApiError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        debug!(method, "calling flock api");

        let response = self
            .client
            .post(self.method_url(method))
            .header(USER_TOKEN_HEADER, token.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<ApiErrorBody>(&body).ok();
            let (error, description) = match parsed {
                Some(parsed) => (
                    parsed.error.unwrap_or_else(|| "unknown".to_owned()),
                    parsed.description.unwrap_or_default(),
                ),
                None => ("unknown".to_owned(), body),
            };
            error!(method, status = %status, error = %error, "flock api error");
            return Err(FlockApiError::Api { status: status.as_u16(), error, description });
        }

        serde_json::from_str(&body).map_err(|source| FlockApiError::Parse { body, source })
    }
}

#[async_trait]
impl FlockApi for FlockClient {
    async fn send_message(
        &self,
        token: &SecretString,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, FlockApiError> {
        self.call_method("chat.sendMessage", token, request).await
    }
}
