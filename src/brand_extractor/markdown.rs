use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::brand_extractor::firecrawl::{ensure_success, FirecrawlClient, FirecrawlError};
use crate::brand_extractor::{BrandExtractorBackend, BrandSignal, PageContent};
use crate::error::Error;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageMetadata {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "ogTitle")]
    og_title: Option<String>,
    #[serde(rename = "ogDescription")]
    og_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScrapedPage {
    markdown: Option<String>,
    metadata: Option<PageMetadata>,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    data: Option<ScrapedPage>,
    // Some crawlers answer with the page at the top level.
    #[serde(flatten)]
    inline: ScrapedPage,
}

/// Reads a scrape payload into page content.
pub fn parse_scrape(v: &Value) -> Result<PageContent, FirecrawlError> {
    ensure_success(v)?;
    let res: ScrapeResponse = serde_json::from_value(v.clone())
        .map_err(|e| FirecrawlError::Unexpected(format!("Unexpected scrape payload: {}", e)))?;
    let page = res.data.unwrap_or(res.inline);
    let metadata = page.metadata.unwrap_or_default();
    let pick = |a: Option<String>, b: Option<String>| {
        a.filter(|s| !s.trim().is_empty())
            .or(b)
            .unwrap_or_default()
    };
    Ok(PageContent {
        title: pick(metadata.title, metadata.og_title),
        description: pick(metadata.description, metadata.og_description),
        markdown: page.markdown.unwrap_or_default(),
    })
}

/// Raw content retrieval: page markdown and metadata, prompt built locally.
#[derive(Debug, Clone)]
pub struct MarkdownExtractor {
    client: FirecrawlClient,
}

impl MarkdownExtractor {
    pub fn new(client: FirecrawlClient) -> Self {
        Self { client }
    }
}

impl BrandExtractorBackend for MarkdownExtractor {
    fn fetch_signal(&self, url: String) -> BoxFuture<'_, Result<BrandSignal, Error>> {
        Box::pin(async move {
            let body = json!({
                "url": url,
                "formats": ["markdown"],
                "onlyMainContent": true,
            });
            let res = self.client.post("/v1/scrape", body).await?;
            let page = parse_scrape(&res)?;
            Ok(BrandSignal::PageContent(page))
        })
    }
}
