use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, event, warn, Level};
use url::Url;

use crate::asset_store::{next_asset_filename, AssetStore, PNG_CONTENT_TYPE};
use crate::brand_extractor::{BrandExtractor, BrandProfile};
use crate::credit_ledger::CreditLedger;
use crate::error::Error;
use crate::generation_store::{GenerationStore, NewGeneration};
use crate::image_generator::{to_png, ImageGenerator};

/// Where the image of a successful run ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageOutcome {
    #[serde(rename = "supabase")]
    Durable,
    /// Upload failed, the image is only referenced by a same-origin path.
    #[serde(rename = "local (supabase failed)")]
    LocalFallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutcome {
    pub success: bool,
    pub image_url: String,
    pub task_id: String,
    pub time_taken: Option<f64>,
    pub brand_info: BrandProfile,
    pub storage: StorageOutcome,
    #[serde(skip)]
    pub generation_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model_id: String,
    pub signed_url_ttl: u64,
    /// Bound for each remote step on its own.
    pub step_timeout: Duration,
    /// Local copy target when the upload fails. `None` keeps nothing.
    pub fallback_dir: Option<PathBuf>,
}

/// Checks the submitted URL before anything is charged. The trimmed input is
/// returned as submitted, without normalization.
pub fn validate_url(raw: &str) -> Result<String, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::BadRequest("URL is required".into()));
    }
    let parsed =
        Url::parse(trimmed).map_err(|e| Error::BadRequest(format!("Invalid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        scheme => Err(Error::BadRequest(format!(
            "Only http and https URLs are supported, got {}",
            scheme
        ))),
    }
}

/// Runs one generation request: charge, extract, generate, store, record.
///
/// Once a credit is taken every failure gives it back before the error is
/// returned. The one step allowed to fail softly is the upload, which turns
/// into a [`StorageOutcome::LocalFallback`] success without a record.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    ledger: Arc<dyn CreditLedger>,
    extractor: BrandExtractor,
    image_generator: Arc<dyn ImageGenerator>,
    assets: Arc<dyn AssetStore>,
    generations: Arc<dyn GenerationStore>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn CreditLedger>,
        extractor: BrandExtractor,
        image_generator: Arc<dyn ImageGenerator>,
        assets: Arc<dyn AssetStore>,
        generations: Arc<dyn GenerationStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            ledger,
            extractor,
            image_generator,
            assets,
            generations,
            settings,
        }
    }

    /// Past the gate the pipeline runs on its own task, so a caller that goes
    /// away does not cancel it halfway and the refund still happens.
    pub async fn generate(&self, user_id: &str, url: &str) -> Result<GenerationOutcome, Error> {
        let url = validate_url(url)?;
        if !self.ledger.try_consume(user_id).await? {
            return Err(Error::InsufficientCredit);
        }
        event!(Level::INFO, user_id, url = %url, "Credit consumed, starting generation");
        let this = self.clone();
        let owner = user_id.to_string();
        let task = tokio::spawn(async move {
            match this.run(&owner, &url).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    event!(Level::ERROR, user_id = %owner, "Generation failed: {}", e);
                    this.refund(&owner).await;
                    Err(e)
                }
            }
        });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                // The task panicked, its error arm never ran.
                event!(Level::ERROR, user_id, "Generation task aborted: {}", e);
                self.refund(user_id).await;
                Err(Error::Internal(format!("generation task aborted: {}", e)))
            }
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, Error>>,
        on_timeout: impl FnOnce(String) -> Error,
    ) -> Result<T, Error> {
        match tokio::time::timeout(self.settings.step_timeout, fut).await {
            Ok(r) => r,
            Err(_) => Err(on_timeout(format!(
                "timed out after {:?}",
                self.settings.step_timeout
            ))),
        }
    }

    async fn run(&self, user_id: &str, url: &str) -> Result<GenerationOutcome, Error> {
        let profile = self
            .bounded(self.extractor.extract(url), Error::ExtractionFailed)
            .await?;
        let prompt = profile.suggested_image_prompt.clone();

        let generated = self
            .bounded(
                self.image_generator
                    .generate(&prompt, &self.settings.model_id),
                Error::generation,
            )
            .await?;
        let raw = self
            .bounded(
                self.image_generator.fetch_image(&generated.image_url),
                Error::FetchFailed,
            )
            .await?;
        let png = to_png(&raw)?;
        let filename = next_asset_filename();

        let key = match self
            .bounded(self.assets.store(png.clone(), &filename), Error::Storage)
            .await
        {
            Ok(key) => key,
            Err(e) => {
                warn!(filename = %filename, "Upload failed, answering with a local path: {}", e);
                self.keep_local_copy(&filename, &png).await;
                return Ok(GenerationOutcome {
                    success: true,
                    image_url: format!("/generations/{}", filename),
                    task_id: generated.task_id,
                    time_taken: generated.time_taken,
                    brand_info: profile,
                    storage: StorageOutcome::LocalFallback,
                    generation_id: None,
                });
            }
        };

        // Signed before the record so a failure leaves neither row nor object.
        let image_url = match self
            .bounded(
                self.assets.sign(&key, self.settings.signed_url_ttl),
                Error::SigningFailed,
            )
            .await
        {
            Ok(url) => url,
            Err(e) => {
                self.discard_asset(&key).await;
                return Err(e);
            }
        };

        let record = self
            .generations
            .record(NewGeneration {
                website_url: url.to_string(),
                prompt,
                asset_id: key.clone(),
                mime_type: PNG_CONTENT_TYPE.to_string(),
                user_id: user_id.to_string(),
            })
            .await;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                self.discard_asset(&key).await;
                return Err(match e {
                    Error::Database(detail) => Error::PersistenceFailed(detail),
                    other => Error::PersistenceFailed(other.to_string()),
                });
            }
        };

        event!(Level::INFO, user_id, generation = %record.id, key = %key, "Generation stored");
        Ok(GenerationOutcome {
            success: true,
            image_url,
            task_id: generated.task_id,
            time_taken: generated.time_taken,
            brand_info: profile,
            storage: StorageOutcome::Durable,
            generation_id: Some(record.id),
        })
    }

    async fn refund(&self, user_id: &str) {
        match self.ledger.refund(user_id).await {
            Ok(()) => event!(Level::INFO, user_id, "Credit refunded"),
            Err(e) => error!(
                target: "reconciliation",
                user_id,
                "Credit refund failed, balance is short by one: {}",
                e
            ),
        }
    }

    async fn discard_asset(&self, key: &str) {
        if let Err(e) = self.bounded(self.assets.delete(key), Error::Storage).await {
            error!(
                target: "orphan",
                key,
                "Uploaded asset has no generation record and could not be deleted: {}",
                e
            );
        }
    }

    async fn keep_local_copy(&self, filename: &str, png: &[u8]) {
        let Some(dir) = &self.settings.fallback_dir else {
            return;
        };
        let path = dir.join(filename);
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, png).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;
        if let Err(e) = written {
            warn!(path = %path.display(), "Could not keep local copy: {}", e);
        }
    }
}
