use std::time::Duration;

use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{event, Level};

use crate::asset_store::{AssetStore, PNG_CONTENT_TYPE};
use crate::error::Error;

/// Upserts are keyed by filename, so retrying them is safe within this window.
static UPLOAD_RETRY_WINDOW: Duration = Duration::from_secs(30);

const LIST_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct StoredObject {
    pub name: String,
    /// `None` for folder placeholders.
    pub id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Supabase Storage over its REST API.
#[derive(Debug, Clone)]
pub struct SupabaseAssetStore {
    reqwest: reqwest::Client,
    headers: HeaderMap,
    storage_url: String,
    bucket: String,
}

/// Turns the relative `signedURL` Supabase answers with into an absolute link.
pub fn absolute_signed_url(storage_url: &str, signed: &str) -> String {
    if signed.starts_with("http://") || signed.starts_with("https://") {
        signed.to_string()
    } else {
        format!("{}/{}", storage_url, signed.trim_start_matches('/'))
    }
}

/// Strips the bucket prefix from an upload answer's `Key`.
pub fn key_from_upload(bucket: &str, v: &Value, filename: &str) -> String {
    v.get("Key")
        .or_else(|| v.get("path"))
        .and_then(|k| k.as_str())
        .map(|k| {
            k.strip_prefix(&format!("{}/", bucket))
                .unwrap_or(k)
                .to_string()
        })
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| filename.to_string())
}

impl SupabaseAssetStore {
    pub fn new(
        supabase_url: &str,
        service_key: &str,
        bucket: &str,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", service_key))
                .map_err(|_| Error::Config("Invalid SUPABASE_SERVICE_KEY".into()))?,
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(service_key)
                .map_err(|_| Error::Config("Invalid SUPABASE_SERVICE_KEY".into()))?,
        );
        let reqwest = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            reqwest,
            headers,
            storage_url: format!("{}/storage/v1", supabase_url.trim_end_matches('/')),
            bucket: bucket.to_string(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.storage_url, self.bucket, key)
    }

    async fn upload_once(&self, bytes: &[u8], filename: &str) -> Result<Value, backoff::Error<Error>> {
        let resp = self
            .reqwest
            .post(self.object_url(filename))
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, PNG_CONTENT_TYPE)
            .header("x-upsert", "true")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(Error::Storage(format!("Upload failed: {}", e)))
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = Error::Storage(format!("Upload failed with {}: {}", status, body));
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            });
        }
        resp.json::<Value>().await.map_err(|e| {
            backoff::Error::permanent(Error::Storage(format!("Unexpected upload answer: {}", e)))
        })
    }

    /// Every object in the bucket root, folders excluded.
    pub async fn list_objects(&self) -> Result<Vec<StoredObject>, Error> {
        let mut objects = Vec::new();
        let mut offset = 0;
        loop {
            let resp = self
                .reqwest
                .post(format!("{}/object/list/{}", self.storage_url, self.bucket))
                .headers(self.headers.clone())
                .json(&json!({
                    "prefix": "",
                    "limit": LIST_PAGE_SIZE,
                    "offset": offset,
                    "sortBy": { "column": "name", "order": "asc" },
                }))
                .send()
                .await
                .map_err(|e| Error::Storage(format!("List failed: {}", e)))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(Error::Storage(format!("List failed with {}", status)));
            }
            let page: Vec<StoredObject> = resp
                .json()
                .await
                .map_err(|e| Error::Storage(format!("Unexpected list answer: {}", e)))?;
            let count = page.len();
            objects.extend(page.into_iter().filter(|o| o.id.is_some()));
            if count < LIST_PAGE_SIZE {
                return Ok(objects);
            }
            offset += count;
        }
    }
}

impl AssetStore for SupabaseAssetStore {
    fn store<'a>(
        &'a self,
        bytes: Vec<u8>,
        filename: &'a str,
    ) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            let answer = retry(
                ExponentialBackoff {
                    max_elapsed_time: Some(UPLOAD_RETRY_WINDOW),
                    ..ExponentialBackoff::default()
                },
                || self.upload_once(&bytes, filename),
            )
            .await?;
            let key = key_from_upload(&self.bucket, &answer, filename);
            event!(Level::INFO, key = %key, "Stored asset");
            Ok(key)
        })
    }

    fn sign<'a>(&'a self, key: &'a str, ttl_secs: u64) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            let resp = self
                .reqwest
                .post(format!(
                    "{}/object/sign/{}/{}",
                    self.storage_url, self.bucket, key
                ))
                .headers(self.headers.clone())
                .json(&json!({ "expiresIn": ttl_secs }))
                .send()
                .await
                .map_err(|e| Error::SigningFailed(format!("{}: {}", key, e)))?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::SigningFailed(format!("{}: {} {}", key, status, body)));
            }
            let v: Value = resp
                .json()
                .await
                .map_err(|e| Error::SigningFailed(format!("{}: {}", key, e)))?;
            let signed = v
                .get("signedURL")
                .or_else(|| v.get("signedUrl"))
                .and_then(|s| s.as_str())
                .ok_or_else(|| Error::SigningFailed(format!("{}: no signed URL returned", key)))?;
            Ok(absolute_signed_url(&self.storage_url, signed))
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let resp = self
                .reqwest
                .delete(format!("{}/object/{}", self.storage_url, self.bucket))
                .headers(self.headers.clone())
                .json(&json!({ "prefixes": [key] }))
                .send()
                .await
                .map_err(|e| Error::Storage(format!("Delete of {} failed: {}", key, e)))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(Error::Storage(format!(
                    "Delete of {} failed with {}",
                    key, status
                )));
            }
            event!(Level::INFO, key, "Deleted asset");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORAGE: &str = "https://proj.supabase.co/storage/v1";

    #[test]
    fn relative_signed_url_is_joined() {
        assert_eq!(
            absolute_signed_url(STORAGE, "/object/sign/assets/gen-1.png?token=abc"),
            "https://proj.supabase.co/storage/v1/object/sign/assets/gen-1.png?token=abc"
        );
    }

    #[test]
    fn absolute_signed_url_is_kept() {
        let url = "https://cdn.example/object/sign/assets/gen-1.png?token=abc";
        assert_eq!(absolute_signed_url(STORAGE, url), url);
    }

    #[test]
    fn upload_key_without_bucket() {
        let v = json!({ "Key": "assets/gen-1.png", "Id": "0b5c" });
        assert_eq!(key_from_upload("assets", &v, "gen-1.png"), "gen-1.png");
        let v = json!({ "path": "gen-2.png" });
        assert_eq!(key_from_upload("assets", &v, "gen-2.png"), "gen-2.png");
        assert_eq!(key_from_upload("assets", &json!({}), "gen-3.png"), "gen-3.png");
    }

    #[test]
    fn list_entries_parse() {
        let page: Vec<StoredObject> = serde_json::from_value(json!([
            { "name": "gen-1.png", "id": "a1", "created_at": "2025-01-02T03:04:05.678Z" },
            { "name": "folder", "id": null, "created_at": null }
        ]))
        .unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at.is_some());
        assert!(page[1].id.is_none());
    }
}
