//! Bounded, persisted history of generated images.
//!
//! The newest image is always at the head. On every insert the history is
//! trimmed to [`MAX_IMAGES`] entries, and a persisted snapshot is only kept
//! while its serialized form fits in [`MAX_STORAGE_BYTES`].

mod cache;
mod migrate;
mod storage;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generation::GenerationSettings;

pub use cache::{CacheUpdate, ImageCache, PersistOutcome};
pub use migrate::{decode_state, migrate};
pub use storage::{FileStorage, MemoryStorage, StorageError, StoragePort};

pub const MAX_IMAGES: usize = 10;
pub const MAX_STORAGE_BYTES: usize = 4_718_592;
pub const CURRENT_SCHEMA_VERSION: u32 = 1;
pub const STORAGE_KEY: &str = "image-storage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    /// `data:` URI holding the encoded image.
    pub url: String,
    pub prompt: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub settings: GenerationSettings,
}

impl GeneratedImage {
    pub fn new(
        url: impl Into<String>,
        prompt: impl Into<String>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            prompt: prompt.into(),
            timestamp: Utc::now().timestamp_millis(),
            settings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCacheState {
    pub schema_version: u32,
    pub images: Vec<GeneratedImage>,
}

impl Default for ImageCacheState {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            images: Vec::new(),
        }
    }
}
