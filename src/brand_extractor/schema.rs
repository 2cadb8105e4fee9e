use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoff;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{event, Level};

use crate::brand_extractor::firecrawl::{ensure_success, FirecrawlClient, FirecrawlError};
use crate::brand_extractor::{BrandExtractorBackend, BrandSignal, ExtractedBrand};
use crate::error::Error;

const EXTRACT_PROMPT: &str = "Analyze the theme of this website and generate a highly detailed \
image prompt for a marketing image.";

fn brand_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "company_name": { "type": "string" },
            "brand_colors": { "type": "string" },
            "visual_style": { "type": "string" },
            "description": { "type": "string" },
            "suggested_image_prompt": {
                "type": "string",
                "description": "A highly detailed prompt for a high-quality marketing image that represents the brand's theme and purpose. Mention colors, mood, and objects."
            }
        },
        "required": ["company_name", "suggested_image_prompt"]
    })
}

/// Schema-guided extraction: the crawler fills in typed brand fields,
/// including the image prompt.
#[derive(Debug, Clone)]
pub struct SchemaExtractor {
    client: FirecrawlClient,
    poll_timeout: Duration,
}

/// Reads an extraction job payload. Jobs still running are `Pending`.
pub fn parse_job(v: &Value) -> Result<ExtractedBrand, FirecrawlError> {
    ensure_success(v)?;
    match v.get("status").and_then(|s| s.as_str()) {
        Some("completed") | None => {
            let data = v
                .get("data")
                .filter(|d| !d.is_null())
                .ok_or(FirecrawlError::Pending)?;
            serde_json::from_value(data.clone()).map_err(|e| {
                FirecrawlError::Unexpected(format!("Unexpected extraction payload: {}", e))
            })
        }
        Some("processing") | Some("pending") => Err(FirecrawlError::Pending),
        Some(other) => Err(FirecrawlError::Failed(
            v.get("error")
                .and_then(|e| e.as_str())
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("extraction {}", other)),
        )),
    }
}

impl SchemaExtractor {
    pub fn new(client: FirecrawlClient, poll_timeout: Duration) -> Self {
        Self {
            client,
            poll_timeout,
        }
    }

    async fn start(&self, url: &str) -> Result<Value, FirecrawlError> {
        let body = json!({
            "urls": [url],
            "prompt": EXTRACT_PROMPT,
            "schema": brand_schema(),
        });
        let res = self.client.post("/v1/extract", body).await?;
        ensure_success(&res)?;
        Ok(res)
    }

    async fn wait_for(&self, id: &str) -> Result<ExtractedBrand, FirecrawlError> {
        retry(
            ExponentialBackoff {
                max_elapsed_time: Some(self.poll_timeout),
                ..ExponentialBackoff::default()
            },
            || async {
                let status = self
                    .client
                    .get(&format!("/v1/extract/{}", id))
                    .await
                    .and_then(|v| parse_job(&v));
                status.map_err(|e| {
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            },
        )
        .await
    }

    async fn extract(&self, url: &str) -> Result<ExtractedBrand, FirecrawlError> {
        let started = self.start(url).await?;
        // Some deployments answer synchronously.
        if let Ok(brand) = parse_job(&started) {
            return Ok(brand);
        }
        let id = started
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| FirecrawlError::Unexpected("Extraction response without id".into()))?
            .to_string();
        event!(Level::DEBUG, id = %id, "Waiting for Firecrawl extraction");
        match self.wait_for(&id).await {
            Err(FirecrawlError::Pending) => Err(FirecrawlError::Failed(format!(
                "extraction did not finish within {}s",
                self.poll_timeout.as_secs()
            ))),
            r => r,
        }
    }
}

impl BrandExtractorBackend for SchemaExtractor {
    fn fetch_signal(&self, url: String) -> BoxFuture<'_, Result<BrandSignal, Error>> {
        Box::pin(async move {
            let brand = self.extract(&url).await?;
            Ok(BrandSignal::Structured(brand))
        })
    }
}
