use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, event, warn, Level};

use crate::asset_store::AssetStore;
use crate::entities::generation;
use crate::error::Error;
use crate::generation_store::GenerationStore;

/// Concurrent signing requests per listing.
const SIGN_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    pub url: String,
    pub name: String,
    /// Creation time in epoch milliseconds.
    pub time: i64,
}

/// Read side of the generations: listing with fresh links, and removal.
#[derive(Debug, Clone)]
pub struct Gallery {
    generations: Arc<dyn GenerationStore>,
    assets: Arc<dyn AssetStore>,
    signed_url_ttl: u64,
}

impl Gallery {
    pub fn new(
        generations: Arc<dyn GenerationStore>,
        assets: Arc<dyn AssetStore>,
        signed_url_ttl: u64,
    ) -> Self {
        Self {
            generations,
            assets,
            signed_url_ttl,
        }
    }

    async fn entry(&self, row: generation::Model) -> Option<ImageEntry> {
        match self.assets.sign(&row.asset_id, self.signed_url_ttl).await {
            Ok(url) => Some(ImageEntry {
                url,
                name: row.asset_id,
                time: row.created_at.and_utc().timestamp_millis(),
            }),
            Err(e) => {
                warn!(generation = %row.id, "Dropping image from listing: {}", e);
                None
            }
        }
    }

    /// Newest first. Items whose link cannot be minted are left out.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ImageEntry>, Error> {
        let rows = self.generations.list_for_user(user_id).await?;
        let images: Vec<ImageEntry> = stream::iter(rows)
            .map(|row| self.entry(row))
            .buffered(SIGN_CONCURRENCY)
            .filter_map(|entry| async move { entry })
            .collect()
            .await;
        Ok(images)
    }

    /// Removes the row first, then the stored object.
    pub async fn delete(&self, user_id: &str, id: &str) -> Result<(), Error> {
        let row = self
            .generations
            .find_owned(id, user_id)
            .await?
            .ok_or(Error::NotFound)?;
        self.generations.delete(&row.id).await?;
        if let Err(e) = self.assets.delete(&row.asset_id).await {
            error!(
                target: "orphan",
                key = %row.asset_id,
                "Generation deleted but its asset could not be removed: {}",
                e
            );
        }
        event!(Level::INFO, user_id, generation = %row.id, "Generation deleted");
        Ok(())
    }
}
