use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoff;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{event, Level};

use crate::error::Error;
use crate::image_generator::{lenient_f64, lenient_string, GeneratedImage, ImageGenerator};

/// How long a download of a finished image may keep retrying.
static FETCH_RETRY_WINDOW: Duration = Duration::from_secs(30);

/// Client for the JSON text-to-image endpoint configured by `GENERATION_API`.
#[derive(Debug, Clone)]
pub struct GenerationApiClient {
    reqwest: reqwest::Client,
    endpoint: String,
}

pub fn request_body(prompt: &str, model_id: &str) -> Value {
    json!({
        "model": model_id,
        "prompt": prompt,
        "img_count": 1,
        "size": "1:1",
        "resType": "url",
    })
}

/// Reads the service answer. A success flag without an image is a failure.
pub fn parse_generation(v: Value) -> Result<GeneratedImage, Error> {
    if v.get("success").and_then(|s| s.as_bool()) != Some(true) {
        return Err(Error::GenerationFailed {
            message: "image service reported failure".into(),
            details: Some(v),
        });
    }
    let image_url = v
        .get("img_urls")
        .and_then(|u| u.as_array())
        .and_then(|urls| urls.iter().filter_map(|u| u.as_str()).find(|u| !u.is_empty()))
        .map(|u| u.to_string());
    let Some(image_url) = image_url else {
        return Err(Error::GenerationFailed {
            message: "image service returned no image".into(),
            details: Some(v),
        });
    };
    Ok(GeneratedImage {
        image_url,
        task_id: lenient_string(v.get("taskId")),
        time_taken: lenient_f64(v.get("time_taken")),
    })
}

impl GenerationApiClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, Error> {
        let reqwest = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            reqwest,
            endpoint: endpoint.to_string(),
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, backoff::Error<Error>> {
        let resp = self.reqwest.get(url).send().await.map_err(|e| {
            backoff::Error::transient(Error::FetchFailed(format!(
                "Failed to fetch image from {}: {}",
                url, e
            )))
        })?;
        let status = resp.status();
        if !status.is_success() {
            let err = Error::FetchFailed(format!("Failed to fetch image from {}: {}", url, status));
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            });
        }
        let bytes = resp.bytes().await.map_err(|e| {
            backoff::Error::transient(Error::FetchFailed(format!(
                "Failed to read image bytes: {}",
                e
            )))
        })?;
        Ok(bytes.to_vec())
    }
}

impl ImageGenerator for GenerationApiClient {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        model_id: &'a str,
    ) -> BoxFuture<'a, Result<GeneratedImage, Error>> {
        Box::pin(async move {
            event!(Level::DEBUG, "Creating image for {}", prompt);
            let resp = self
                .reqwest
                .post(&self.endpoint)
                .json(&request_body(prompt, model_id))
                .send()
                .await
                .map_err(|e| Error::generation(format!("Failed to send request: {}", e)))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| Error::generation(format!("Failed to read response: {}", e)))?;
            let v: Value = match serde_json::from_str(&body) {
                Ok(v) => v,
                Err(_) => {
                    event!(Level::ERROR, %status, body = %body, "Image service returned non-JSON");
                    return Err(Error::generation(format!(
                        "Unexpected response from image service: {}",
                        status
                    )));
                }
            };
            if !status.is_success() {
                event!(Level::ERROR, %status, response = ?v, "Image service error");
                return Err(Error::GenerationFailed {
                    message: format!("image service status {}", status),
                    details: Some(v),
                });
            }
            let generated = parse_generation(v);
            if let Err(e) = &generated {
                event!(Level::ERROR, "API Error: {:?}", e);
            }
            generated
        })
    }

    fn fetch_image<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        Box::pin(async move {
            retry(
                ExponentialBackoff {
                    max_elapsed_time: Some(FETCH_RETRY_WINDOW),
                    ..ExponentialBackoff::default()
                },
                || self.download(url),
            )
            .await
        })
    }
}
