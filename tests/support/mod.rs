#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use brandshot::app_state::{AppState, Collaborators};
use brandshot::asset_store::AssetStore;
use brandshot::auth::SessionVerifier;
use brandshot::brand_extractor::{
    BrandExtractor, BrandExtractorBackend, BrandSignal, ExtractedBrand, PageContent,
};
use brandshot::credit_ledger::CreditLedger;
use brandshot::entities::generation;
use brandshot::error::Error;
use brandshot::generation_store::{GenerationStore, NewGeneration};
use brandshot::image_generator::{GeneratedImage, ImageGenerator};
use brandshot::orchestrator::{Orchestrator, PipelineSettings};
use brandshot::rate_limit::RateLimitState;

pub const USER: &str = "user-1";
pub const SECRET: &str = "test-secret";
pub const COOKIE: &str = "session_token";

pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 30, 30]));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

#[derive(Debug, Default)]
pub struct FakeLedger {
    balances: Mutex<HashMap<String, i32>>,
    pub fail_refund: AtomicBool,
    pub refunds: AtomicUsize,
}

impl FakeLedger {
    pub fn with(user: &str, credit: i32) -> Self {
        let ledger = Self::default();
        ledger.set(user, credit);
        ledger
    }

    pub fn set(&self, user: &str, credit: i32) {
        self.balances
            .lock()
            .unwrap()
            .insert(user.to_string(), credit);
    }

    pub fn credit(&self, user: &str) -> i32 {
        self.balances.lock().unwrap().get(user).copied().unwrap_or(0)
    }
}

impl CreditLedger for FakeLedger {
    fn try_consume<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            let mut balances = self.balances.lock().unwrap();
            match balances.get_mut(user_id) {
                Some(credit) if *credit > 0 => {
                    *credit -= 1;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn refund<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if self.fail_refund.load(Ordering::SeqCst) {
                return Err(Error::Database("ledger unavailable".into()));
            }
            self.refunds.fetch_add(1, Ordering::SeqCst);
            *self
                .balances
                .lock()
                .unwrap()
                .entry(user_id.to_string())
                .or_insert(0) += 1;
            Ok(())
        })
    }

    fn balance<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<i32>, Error>> {
        Box::pin(async move { Ok(self.balances.lock().unwrap().get(user_id).copied()) })
    }
}

#[derive(Debug)]
pub struct FakeExtractor {
    signal: Mutex<Result<BrandSignal, String>>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn structured(prompt: &str) -> Self {
        Self::returning(Ok(BrandSignal::Structured(ExtractedBrand {
            company_name: Some("Acme".into()),
            suggested_image_prompt: Some(prompt.into()),
            ..ExtractedBrand::default()
        })))
    }

    pub fn page(title: &str, description: &str) -> Self {
        Self::returning(Ok(BrandSignal::PageContent(PageContent {
            title: title.into(),
            description: description.into(),
            markdown: "# Example Domain\n\nThis domain is for use in examples.".into(),
        })))
    }

    pub fn failing(message: &str) -> Self {
        Self::returning(Err(message.into()))
    }

    fn returning(signal: Result<BrandSignal, String>) -> Self {
        Self {
            signal: Mutex::new(signal),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Holds every answer back for `delay`.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl BrandExtractorBackend for FakeExtractor {
    fn fetch_signal(&self, _url: String) -> BoxFuture<'_, Result<BrandSignal, Error>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Lets concurrent pipelines interleave after the gate.
            tokio::task::yield_now().await;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.signal
                .lock()
                .unwrap()
                .clone()
                .map_err(Error::ExtractionFailed)
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeImageGenerator {
    pub fail_with: Mutex<Option<serde_json::Value>>,
    pub prompts: Mutex<Vec<String>>,
    pub downloads: AtomicUsize,
}

impl FakeImageGenerator {
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl ImageGenerator for FakeImageGenerator {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        _model_id: &'a str,
    ) -> BoxFuture<'a, Result<GeneratedImage, Error>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(payload) = self.fail_with.lock().unwrap().clone() {
                return Err(Error::GenerationFailed {
                    message: "image service reported failure".into(),
                    details: Some(payload),
                });
            }
            Ok(GeneratedImage {
                image_url: "https://images.example/out.png".into(),
                task_id: "task-1".into(),
                time_taken: Some(3.5),
            })
        })
    }

    fn fetch_image<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, Error>> {
        Box::pin(async move {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(png_bytes())
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeAssetStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_store: AtomicBool,
    pub fail_sign: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Keys whose links cannot be minted.
    pub unsignable: Mutex<Vec<String>>,
}

impl FakeAssetStore {
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

impl AssetStore for FakeAssetStore {
    fn store<'a>(
        &'a self,
        bytes: Vec<u8>,
        filename: &'a str,
    ) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            if self.fail_store.load(Ordering::SeqCst) {
                return Err(Error::Storage("bucket unavailable".into()));
            }
            self.objects
                .lock()
                .unwrap()
                .insert(filename.to_string(), bytes);
            Ok(filename.to_string())
        })
    }

    fn sign<'a>(&'a self, key: &'a str, ttl_secs: u64) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(async move {
            if self.fail_sign.load(Ordering::SeqCst)
                || self.unsignable.lock().unwrap().iter().any(|k| k == key)
            {
                return Err(Error::SigningFailed(key.to_string()));
            }
            Ok(format!(
                "https://storage.example/object/sign/assets/{}?ttl={}",
                key, ttl_secs
            ))
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(Error::Storage("delete refused".into()));
            }
            self.objects.lock().unwrap().remove(key);
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeGenerationStore {
    pub rows: Mutex<Vec<generation::Model>>,
    pub fail_record: AtomicBool,
    pub fail_list: AtomicBool,
}

impl FakeGenerationStore {
    pub fn insert(&self, id: &str, user_id: &str, asset_id: &str, age_secs: i64) {
        self.rows.lock().unwrap().push(generation::Model {
            id: id.into(),
            website_url: "https://example.com".into(),
            prompt: "A premium marketing image".into(),
            asset_id: asset_id.into(),
            mime_type: "image/png".into(),
            user_id: user_id.into(),
            created_at: (chrono::Utc::now() - chrono::Duration::seconds(age_secs)).naive_utc(),
        });
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

impl GenerationStore for FakeGenerationStore {
    fn record(&self, new: NewGeneration) -> BoxFuture<'_, Result<generation::Model, Error>> {
        Box::pin(async move {
            if self.fail_record.load(Ordering::SeqCst) {
                return Err(Error::Database("insert failed".into()));
            }
            let mut rows = self.rows.lock().unwrap();
            let model = generation::Model {
                id: format!("gen-row-{}", rows.len() + 1),
                website_url: new.website_url,
                prompt: new.prompt,
                asset_id: new.asset_id,
                mime_type: new.mime_type,
                user_id: new.user_id,
                created_at: chrono::Utc::now().naive_utc(),
            };
            rows.push(model.clone());
            Ok(model)
        })
    }

    fn list_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<generation::Model>, Error>> {
        Box::pin(async move {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(Error::Database("connection reset".into()));
            }
            let mut rows: Vec<_> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rows)
        })
    }

    fn find_owned<'a>(
        &'a self,
        id: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<generation::Model>, Error>> {
        Box::pin(async move {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id && r.user_id == user_id)
                .cloned())
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.rows.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        })
    }
}

/// Every fake, kept around so tests can inspect them after a run.
#[derive(Debug, Clone)]
pub struct Harness {
    pub ledger: Arc<FakeLedger>,
    pub extractor: Arc<FakeExtractor>,
    pub images: Arc<FakeImageGenerator>,
    pub assets: Arc<FakeAssetStore>,
    pub generations: Arc<FakeGenerationStore>,
}

impl Harness {
    pub fn new(credit: i32, extractor: FakeExtractor) -> Self {
        Self {
            ledger: Arc::new(FakeLedger::with(USER, credit)),
            extractor: Arc::new(extractor),
            images: Arc::new(FakeImageGenerator::default()),
            assets: Arc::new(FakeAssetStore::default()),
            generations: Arc::new(FakeGenerationStore::default()),
        }
    }

    pub fn settings(fallback_dir: Option<PathBuf>) -> PipelineSettings {
        PipelineSettings {
            model_id: "test-model".into(),
            signed_url_ttl: 31_536_000,
            step_timeout: Duration::from_secs(5),
            fallback_dir,
        }
    }

    pub fn orchestrator(&self, fallback_dir: Option<PathBuf>) -> Orchestrator {
        Orchestrator::new(
            self.ledger.clone(),
            BrandExtractor::new(self.extractor.clone()),
            self.images.clone(),
            self.assets.clone(),
            self.generations.clone(),
            Self::settings(fallback_dir),
        )
    }

    pub fn app_state(&self, static_dir: PathBuf, per_hour: u32) -> AppState {
        AppState::new(
            Collaborators {
                ledger: self.ledger.clone(),
                extractor: self.extractor.clone(),
                image_generator: self.images.clone(),
                assets: self.assets.clone(),
                generations: self.generations.clone(),
            },
            Self::settings(None),
            SessionVerifier::new(SECRET, COOKIE),
            RateLimitState::per_hour(per_hour),
            static_dir,
        )
    }
}

pub fn session_token(user_id: &str) -> String {
    SessionVerifier::new(SECRET, COOKIE)
        .issue(user_id, chrono::Utc::now().timestamp() + 3600)
        .unwrap()
}

pub fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("brandshot-test-{}", uuid::Uuid::new_v4()))
}
