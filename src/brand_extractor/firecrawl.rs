use std::time::Duration;

use http::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::{event, Level};

use crate::error::Error;

#[derive(thiserror::Error, Debug)]
pub enum FirecrawlError
where
    Self: Send + Sync,
{
    #[error("Firecrawl server error: {0}")]
    ServerError(String),
    #[error("Firecrawl rate limited")]
    RateLimited,
    #[error("{0}")]
    Failed(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
    #[error("Extraction not ready")]
    Pending,
}

impl FirecrawlError {
    /// Errors worth asking again for, on idempotent calls only.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FirecrawlError::ServerError(_) | FirecrawlError::RateLimited | FirecrawlError::Pending
        )
    }
}

impl From<FirecrawlError> for Error {
    fn from(e: FirecrawlError) -> Self {
        Error::ExtractionFailed(e.to_string())
    }
}

/// Thin client for the Firecrawl v1 HTTP API.
#[derive(Debug, Clone)]
pub struct FirecrawlClient {
    client: reqwest::Client,
    headers: HeaderMap,
    base_url: String,
}

impl FirecrawlClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| Error::Config("Invalid FIRECRAWL_API_KEY".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            headers,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check_response(res: reqwest::Response) -> Result<Value, FirecrawlError> {
        let status = res.status();
        if status.is_success() {
            return res.json::<Value>().await.map_err(|e| {
                FirecrawlError::Unexpected(format!("Error parsing Firecrawl response: {}", e))
            });
        }
        let body = res.text().await.unwrap_or_default();
        event!(Level::ERROR, %status, body = %body, "Firecrawl request failed");
        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => FirecrawlError::RateLimited,
            s if s.is_server_error() => {
                FirecrawlError::ServerError(format!("status {}: {}", s.as_u16(), body))
            }
            s => FirecrawlError::Failed(error_message(&body).unwrap_or_else(|| {
                format!("Firecrawl status code: {}", s.as_u16())
            })),
        })
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, FirecrawlError> {
        event!(Level::DEBUG, "POST to Firecrawl: {} with body: {:?}", path, body);
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                FirecrawlError::Unexpected(format!("Error sending request to Firecrawl: {}", e))
            })?;
        Self::check_response(res).await
    }

    pub async fn get(&self, path: &str) -> Result<Value, FirecrawlError> {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| FirecrawlError::Unexpected(format!("Error on GET {}: {}", path, e)))?;
        Self::check_response(res).await
    }
}

/// Pulls the human-readable reason out of a `{ success: false, error }` body.
pub fn error_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v.get("error")
        .and_then(|e| e.as_str())
        .map(|e| e.to_string())
}

/// Rejects payloads whose `success` flag is not `true`.
pub fn ensure_success(v: &Value) -> Result<(), FirecrawlError> {
    if v.get("success").and_then(|s| s.as_bool()) == Some(true) {
        return Ok(());
    }
    let reason = v
        .get("error")
        .and_then(|e| e.as_str())
        .unwrap_or("crawler reported failure");
    Err(FirecrawlError::Failed(reason.to_string()))
}
