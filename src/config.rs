use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// One year, the lifetime of every signed retrieval link.
pub const DEFAULT_SIGNED_URL_TTL: u64 = 60 * 60 * 24 * 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorMode {
    /// Schema-guided extraction, the crawler returns a ready-made image prompt.
    Schema,
    /// Raw markdown and metadata, the prompt is synthesized locally.
    Markdown,
}

impl FromStr for ExtractorMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "schema" | "extract" => Ok(ExtractorMode::Schema),
            "markdown" | "scrape" => Ok(ExtractorMode::Markdown),
            other => Err(Error::Config(format!("unknown BRAND_EXTRACTOR: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub session_secret: String,
    pub session_cookie: String,
    pub extractor_mode: ExtractorMode,
    pub firecrawl_api_key: String,
    pub firecrawl_api_url: String,
    pub generation_api: String,
    pub model_id: String,
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub storage_bucket: String,
    pub signed_url_ttl: u64,
    pub step_timeout: Duration,
    pub generations_per_hour: u32,
    pub static_dir: PathBuf,
}

fn required(name: &str) -> Result<String, Error> {
    env::var(name).map_err(|_| Error::Config(format!("{} must be set", name)))
}

fn or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, Error> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, v))),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        let generations_per_hour: u32 = parsed("GENERATIONS_PER_HOUR", 100)?;
        if generations_per_hour == 0 {
            return Err(Error::Config(
                "GENERATIONS_PER_HOUR must be greater than zero".into(),
            ));
        }
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            port: parsed("PORT", 8000)?,
            session_secret: required("SESSION_SECRET")?,
            session_cookie: or_default("SESSION_COOKIE", "session_token"),
            extractor_mode: parsed("BRAND_EXTRACTOR", ExtractorMode::Schema)?,
            firecrawl_api_key: required("FIRECRAWL_API_KEY")?,
            firecrawl_api_url: or_default("FIRECRAWL_API_URL", "https://api.firecrawl.dev"),
            generation_api: required("GENERATION_API")?,
            model_id: required("MODEL_ID")?,
            supabase_url: required("SUPABASE_URL")?,
            supabase_service_key: required("SUPABASE_SERVICE_KEY")?,
            storage_bucket: or_default("STORAGE_BUCKET", "assets"),
            signed_url_ttl: parsed("SIGNED_URL_TTL_SECS", DEFAULT_SIGNED_URL_TTL)?,
            step_timeout: Duration::from_secs(parsed("STEP_TIMEOUT_SECS", 120)?),
            generations_per_hour,
            static_dir: PathBuf::from(or_default("STATIC_DIR", "static")),
        })
    }

    /// Where degraded uploads keep a local copy, served under `/generations`.
    pub fn fallback_dir(&self) -> PathBuf {
        self.static_dir.join("generations")
    }
}
