//! Social-profile lookups through the Twitter API on RapidAPI.

use agentpay_types::proto::ProviderErrorResponse;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use url::Url;

pub const DEFAULT_RAPIDAPI_URL: &str = "https://twitter241.p.rapidapi.com";
/// Value of `x-rapidapi-host`, whatever base URL the client talks to.
pub const RAPIDAPI_HOST: &str = "twitter241.p.rapidapi.com";

/// Provider failures, surfaced to clients as `{error, details}`.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Twitter API responded with {status}: {details}")]
    Status { status: StatusCode, details: String },
    #[error("Twitter API request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("Twitter API returned invalid JSON: {0}")]
    Json(#[source] serde_json::Error),
}

impl ProviderError {
    pub const ERROR: &'static str = "Failed to fetch Twitter user data";

    pub fn status(&self) -> StatusCode {
        match self {
            ProviderError::Status { status, .. } => *status,
            ProviderError::Http(_) | ProviderError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn details(&self) -> String {
        match self {
            ProviderError::Status { details, .. } => details.clone(),
            ProviderError::Http(e) => e.to_string(),
            ProviderError::Json(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ProviderError {
    fn into_response(self) -> Response {
        let body = ProviderErrorResponse {
            error: Self::ERROR.to_string(),
            details: self.details(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct RapidApiClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl RapidApiClient {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: api_key.into(),
        }
    }

    fn user_url(&self, username: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path("/user");
        url.query_pairs_mut()
            .clear()
            .append_pair("username", username);
        url
    }

    /// Fetches the profile of `username`.
    pub async fn user(&self, username: &str) -> Result<Value, ProviderError> {
        let response = self
            .client
            .get(self.user_url(username))
            .header("x-rapidapi-host", RAPIDAPI_HOST)
            .header("x-rapidapi-key", &self.api_key)
            .send()
            .await
            .map_err(ProviderError::Http)?;
        let status = response.status();
        let text = response.text().await.map_err(ProviderError::Http)?;
        if !status.is_success() {
            tracing::error!(%status, details = %text, "RapidAPI error");
            return Err(ProviderError::Status {
                status,
                details: text,
            });
        }
        serde_json::from_str(&text).map_err(ProviderError::Json)
    }
}
