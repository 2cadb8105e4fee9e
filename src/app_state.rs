use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{event, Level};

use crate::asset_store::supabase::SupabaseAssetStore;
use crate::asset_store::AssetStore;
use crate::auth::SessionVerifier;
use crate::brand_extractor::firecrawl::FirecrawlClient;
use crate::brand_extractor::markdown::MarkdownExtractor;
use crate::brand_extractor::schema::SchemaExtractor;
use crate::brand_extractor::{BrandExtractor, BrandExtractorBackend};
use crate::config::{Config, ExtractorMode};
use crate::credit_ledger::{CreditLedger, SeaOrmCreditLedger};
use crate::error::Error;
use crate::gallery::Gallery;
use crate::generation_store::{GenerationStore, SeaOrmGenerationStore};
use crate::image_generator::generation_api::GenerationApiClient;
use crate::image_generator::ImageGenerator;
use crate::orchestrator::{Orchestrator, PipelineSettings};
use crate::rate_limit::RateLimitState;

/// The remote and persistent collaborators of the pipeline.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn CreditLedger>,
    pub extractor: Arc<dyn BrandExtractorBackend>,
    pub image_generator: Arc<dyn ImageGenerator>,
    pub assets: Arc<dyn AssetStore>,
    pub generations: Arc<dyn GenerationStore>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub gallery: Gallery,
    pub ledger: Arc<dyn CreditLedger>,
    pub sessions: SessionVerifier,
    pub rate_limit: RateLimitState,
    pub static_dir: PathBuf,
}

async fn connect_database(url: &str) -> Result<DatabaseConnection, Error> {
    let mut options = ConnectOptions::new(url.to_string());
    options
        .max_connections(10)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    Ok(db)
}

fn extractor_backend(config: &Config) -> Result<Arc<dyn BrandExtractorBackend>, Error> {
    let client = FirecrawlClient::new(
        &config.firecrawl_api_url,
        &config.firecrawl_api_key,
        config.step_timeout,
    )?;
    Ok(match config.extractor_mode {
        ExtractorMode::Schema => Arc::new(SchemaExtractor::new(client, config.step_timeout)),
        ExtractorMode::Markdown => Arc::new(MarkdownExtractor::new(client)),
    })
}

impl AppState {
    pub fn new(
        collaborators: Collaborators,
        settings: PipelineSettings,
        sessions: SessionVerifier,
        rate_limit: RateLimitState,
        static_dir: PathBuf,
    ) -> Self {
        let gallery = Gallery::new(
            collaborators.generations.clone(),
            collaborators.assets.clone(),
            settings.signed_url_ttl,
        );
        let orchestrator = Orchestrator::new(
            collaborators.ledger.clone(),
            BrandExtractor::new(collaborators.extractor),
            collaborators.image_generator,
            collaborators.assets,
            collaborators.generations,
            settings,
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            gallery,
            ledger: collaborators.ledger,
            sessions,
            rate_limit,
            static_dir,
        }
    }

    pub async fn init(config: &Config) -> Result<Self, Error> {
        let db = connect_database(&config.database_url).await?;
        let collaborators = Collaborators {
            ledger: Arc::new(SeaOrmCreditLedger::new(db.clone())),
            extractor: extractor_backend(config)?,
            image_generator: Arc::new(GenerationApiClient::new(
                &config.generation_api,
                config.step_timeout,
            )?),
            assets: Arc::new(SupabaseAssetStore::new(
                &config.supabase_url,
                &config.supabase_service_key,
                &config.storage_bucket,
                config.step_timeout,
            )?),
            generations: Arc::new(SeaOrmGenerationStore::new(db)),
        };
        let settings = PipelineSettings {
            model_id: config.model_id.clone(),
            signed_url_ttl: config.signed_url_ttl,
            step_timeout: config.step_timeout,
            fallback_dir: Some(config.fallback_dir()),
        };
        event!(
            Level::INFO,
            extractor = ?config.extractor_mode,
            bucket = %config.storage_bucket,
            "Collaborators configured"
        );
        Ok(Self::new(
            collaborators,
            settings,
            SessionVerifier::new(&config.session_secret, &config.session_cookie),
            RateLimitState::per_hour(config.generations_per_hour),
            config.static_dir.clone(),
        ))
    }
}
