use std::fmt::Debug;
use std::io::Cursor;

use futures::future::BoxFuture;
use image::ImageFormat;
use serde_json::Value;

use crate::error::Error;

pub mod generation_api;

/// A finished generation, still living on the provider's side.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub image_url: String,
    pub task_id: String,
    pub time_taken: Option<f64>,
}

pub trait ImageGenerator: Debug + Send + Sync {
    /// Requests exactly one square image for `prompt`. Never retried.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        model_id: &'a str,
    ) -> BoxFuture<'a, Result<GeneratedImage, Error>>;

    /// Downloads the bytes behind a generated image URL.
    fn fetch_image<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, Error>>;
}

/// Decodes whatever the provider produced and re-encodes it as PNG.
pub fn to_png(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::FetchFailed(format!("Invalid image: {}", e)))?;
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| Error::FetchFailed(format!("Failed to encode as png: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Providers are loose about id and timing types; accept strings and numbers.
pub(crate) fn lenient_string(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn lenient_f64(v: Option<&Value>) -> Option<f64> {
    match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}
