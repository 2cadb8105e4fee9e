use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

use futures::future::BoxFuture;

use crate::error::Error;

pub mod supabase;

pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Durable object storage for generated images.
pub trait AssetStore: Debug + Send + Sync {
    /// Writes `bytes` under `filename`, overwriting any existing object, and
    /// returns the storage key.
    fn store<'a>(&'a self, bytes: Vec<u8>, filename: &'a str)
        -> BoxFuture<'a, Result<String, Error>>;

    /// Mints a read link for `key` valid for `ttl_secs`.
    fn sign<'a>(&'a self, key: &'a str, ttl_secs: u64) -> BoxFuture<'a, Result<String, Error>>;

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), Error>>;
}

/// Last millisecond stamp handed out by this process.
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// `gen-<epoch-millis>.png`
fn filename_for(millis: i64) -> String {
    format!("gen-{}.png", millis)
}

/// Filename for the current time. The same millisecond is never handed out
/// twice: a stamp already taken moves on to the next free one.
pub fn next_asset_filename() -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let prev = match LAST_STAMP.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last + 1))
    }) {
        Ok(prev) | Err(prev) => prev,
    };
    filename_for(now.max(prev + 1))
}
