use std::fmt::Debug;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use crate::error::Error;
use crate::prompt;

pub mod firecrawl;
pub mod markdown;
pub mod schema;

/// Brand signal as returned by schema-guided extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExtractedBrand {
    pub company_name: Option<String>,
    pub brand_colors: Option<String>,
    pub visual_style: Option<String>,
    pub description: Option<String>,
    pub suggested_image_prompt: Option<String>,
}

/// Raw page signal, the prompt still has to be synthesized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    pub title: String,
    pub description: String,
    pub markdown: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrandSignal {
    Structured(ExtractedBrand),
    PageContent(PageContent),
}

/// What the rest of the pipeline sees: brand fields plus a prompt that is
/// never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrandProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_colors: Option<String>,
    pub suggested_image_prompt: String,
}

pub trait BrandExtractorBackend: Debug + Send + Sync {
    fn fetch_signal(&self, url: String) -> BoxFuture<'_, Result<BrandSignal, Error>>;
}

#[derive(Debug, Clone)]
pub struct BrandExtractor {
    backend: Arc<dyn BrandExtractorBackend>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl BrandProfile {
    pub fn resolve(signal: BrandSignal) -> Result<BrandProfile, Error> {
        match signal {
            BrandSignal::Structured(brand) => {
                let prompt = non_empty(brand.suggested_image_prompt).ok_or_else(|| {
                    Error::ExtractionFailed(
                        "Could not generate an image prompt from the website theme.".into(),
                    )
                })?;
                Ok(BrandProfile {
                    company_name: non_empty(brand.company_name),
                    description: non_empty(brand.description),
                    visual_style: non_empty(brand.visual_style),
                    brand_colors: non_empty(brand.brand_colors),
                    suggested_image_prompt: prompt,
                })
            }
            BrandSignal::PageContent(page) => {
                let prompt = prompt::synthesize(&page.title, &page.description, &page.markdown)
                    .ok_or_else(|| {
                        Error::ExtractionFailed(
                            "Website has neither a title nor a description to build a prompt from."
                                .into(),
                        )
                    })?;
                Ok(BrandProfile {
                    company_name: non_empty(Some(page.title)),
                    description: non_empty(Some(page.description)),
                    visual_style: None,
                    brand_colors: None,
                    suggested_image_prompt: prompt,
                })
            }
        }
    }
}

impl BrandExtractor {
    pub fn new(backend: Arc<dyn BrandExtractorBackend>) -> Self {
        Self { backend }
    }

    pub async fn extract(&self, url: &str) -> Result<BrandProfile, Error> {
        event!(Level::INFO, url, "Extracting brand signal");
        let signal = self.backend.fetch_signal(url.to_string()).await?;
        let profile = BrandProfile::resolve(signal)?;
        event!(
            Level::DEBUG,
            company = ?profile.company_name,
            prompt = %profile.suggested_image_prompt,
            "Resolved brand profile"
        );
        Ok(profile)
    }
}
