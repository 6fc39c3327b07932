use std::sync::{Mutex, MutexGuard, PoisonError};

use super::migrate::decode_state;
use super::storage::StoragePort;
use super::{
    GeneratedImage, ImageCacheState, CURRENT_SCHEMA_VERSION, MAX_IMAGES, MAX_STORAGE_BYTES,
    STORAGE_KEY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// The snapshot could not be stored whole, so the persisted record was
    /// dropped instead.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheUpdate {
    pub evicted: Vec<GeneratedImage>,
    pub persisted: PersistOutcome,
}

/// Newest-first image history backed by a [`StoragePort`].
///
/// Every mutation runs as one locked read-modify-write-persist step, so
/// concurrent completions cannot lose each other's inserts.
#[derive(Debug)]
pub struct ImageCache<S: StoragePort> {
    storage: S,
    key: String,
    state: Mutex<ImageCacheState>,
}

impl<S: StoragePort> ImageCache<S> {
    pub fn open(storage: S) -> Self {
        Self::with_key(storage, STORAGE_KEY)
    }

    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let state = load_state(&storage, &key).unwrap_or_default();
        Self {
            storage,
            key,
            state: Mutex::new(state),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn add(&self, image: GeneratedImage) -> CacheUpdate {
        let mut state = self.lock_fresh();
        state.images.insert(0, image);
        let mut evicted = Vec::new();
        while state.images.len() > MAX_IMAGES {
            if let Some(oldest) = state.images.pop() {
                tracing::debug!(id = %oldest.id, "evicting oldest cached image");
                evicted.push(oldest);
            }
        }
        let persisted = self.persist(&state);
        CacheUpdate { evicted, persisted }
    }

    /// Returns whether an entry was removed. Unknown ids are a no-op.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.lock_fresh();
        let before = state.images.len();
        state.images.retain(|image| image.id != id);
        if state.images.len() == before {
            return false;
        }
        self.persist(&state);
        true
    }

    pub fn clear(&self) {
        let mut state = self.lock_state();
        *state = ImageCacheState {
            schema_version: CURRENT_SCHEMA_VERSION,
            images: Vec::new(),
        };
        self.persist(&state);
    }

    pub fn list(&self) -> Vec<GeneratedImage> {
        self.lock_state().images.clone()
    }

    pub fn get(&self, id: &str) -> Option<GeneratedImage> {
        self.lock_state()
            .images
            .iter()
            .find(|image| image.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_state().images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> ImageCacheState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, ImageCacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the in-memory state after refreshing it from storage, so another
    /// writer sharing the same store is merged rather than overwritten. When
    /// nothing is persisted (first run, or a discarded snapshot) the in-memory
    /// state stays authoritative.
    fn lock_fresh(&self) -> MutexGuard<'_, ImageCacheState> {
        let mut state = self.lock_state();
        if let Some(stored) = load_state(&self.storage, &self.key) {
            *state = stored;
        }
        state
    }

    fn persist(&self, state: &ImageCacheState) -> PersistOutcome {
        let serialized = match serde_json::to_string(state) {
            Ok(serialized) => serialized,
            Err(err) => {
                tracing::warn!(error = %err, "image cache serialization failed");
                return self.discard();
            }
        };
        if serialized.len() > MAX_STORAGE_BYTES {
            tracing::warn!(
                bytes = serialized.len(),
                limit = MAX_STORAGE_BYTES,
                "image cache exceeds storage budget; dropping persisted copy"
            );
            return self.discard();
        }
        match self.storage.set(&self.key, &serialized) {
            Ok(()) => PersistOutcome::Written,
            Err(err) => {
                tracing::warn!(error = %err, "image cache write failed; dropping persisted copy");
                self.discard()
            }
        }
    }

    fn discard(&self) -> PersistOutcome {
        if let Err(err) = self.storage.remove(&self.key) {
            tracing::warn!(error = %err, "failed to drop persisted image cache");
        }
        PersistOutcome::Discarded
    }
}

fn load_state<S: StoragePort>(storage: &S, key: &str) -> Option<ImageCacheState> {
    let raw = match storage.get(key) {
        Ok(raw) => raw?,
        Err(err) => {
            tracing::warn!(error = %err, "image cache read failed; starting empty");
            return None;
        }
    };
    let mut state = decode_state(&raw);
    state.images.truncate(MAX_IMAGES);
    Some(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::gallery::storage::{FileStorage, MemoryStorage, StorageError};
    use crate::generation::GenerationSettings;

    fn image(id: &str) -> GeneratedImage {
        sized_image(id, 8)
    }

    fn sized_image(id: &str, payload_len: usize) -> GeneratedImage {
        GeneratedImage {
            id: id.to_string(),
            url: format!("data:image/png;base64,{}", "A".repeat(payload_len)),
            prompt: format!("prompt {id} (1)"),
            timestamp: 1_700_000_000_000,
            settings: GenerationSettings::default(),
        }
    }

    fn ids<S: StoragePort>(cache: &ImageCache<S>) -> Vec<String> {
        cache.list().into_iter().map(|image| image.id).collect()
    }

    struct RejectingStorage {
        inner: MemoryStorage,
    }

    impl StoragePort for RejectingStorage {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Rejected {
                key: key.to_string(),
                reason: "quota exceeded".to_string(),
            })
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn add_inserts_newest_first_and_persists() -> anyhow::Result<()> {
        let cache = ImageCache::open(MemoryStorage::new());
        cache.add(image("a"));
        let update = cache.add(image("b"));
        assert_eq!(update.persisted, PersistOutcome::Written);
        assert!(update.evicted.is_empty());
        assert_eq!(ids(&cache), vec!["b", "a"]);

        let raw = cache.storage().get(STORAGE_KEY)?.unwrap_or_default();
        let stored: Value = serde_json::from_str(&raw)?;
        assert_eq!(stored["schemaVersion"], Value::from(1));
        assert_eq!(stored["images"][0]["id"], Value::from("b"));
        Ok(())
    }

    #[test]
    fn add_never_exceeds_capacity_and_keeps_latest_ten() {
        let cache = ImageCache::open(MemoryStorage::new());
        let mut evicted = Vec::new();
        for idx in 0..25 {
            let update = cache.add(image(&format!("img-{idx}")));
            assert!(cache.len() <= MAX_IMAGES);
            evicted.extend(update.evicted.into_iter().map(|image| image.id));
        }
        let expected: Vec<String> = (15..25).rev().map(|idx| format!("img-{idx}")).collect();
        assert_eq!(ids(&cache), expected);
        let expected_evicted: Vec<String> = (0..15).map(|idx| format!("img-{idx}")).collect();
        assert_eq!(evicted, expected_evicted);
    }

    #[test]
    fn remove_unknown_id_is_a_noop() {
        let cache = ImageCache::open(MemoryStorage::new());
        cache.add(image("a"));
        assert!(!cache.remove("missing"));
        assert!(cache.remove("a"));
        assert!(cache.is_empty());
        assert!(!cache.remove("a"));
    }

    #[test]
    fn clear_resets_to_current_schema() -> anyhow::Result<()> {
        let storage = MemoryStorage::new();
        storage.set(STORAGE_KEY, r#"{"images":[]}"#)?;
        let cache = ImageCache::open(storage);
        cache.add(image("a"));
        cache.clear();
        assert_eq!(cache.snapshot(), ImageCacheState::default());
        let raw = cache.storage().get(STORAGE_KEY)?.unwrap_or_default();
        assert_eq!(decode_state(&raw), ImageCacheState::default());
        Ok(())
    }

    #[test]
    fn oversized_snapshot_clears_the_store() -> anyhow::Result<()> {
        let cache = ImageCache::open(MemoryStorage::new());
        // Six of these fit in the budget, seven do not.
        for idx in 0..6 {
            let update = cache.add(sized_image(&format!("big-{idx}"), 700_000));
            assert_eq!(update.persisted, PersistOutcome::Written);
        }
        assert!(cache.storage().contains(STORAGE_KEY));

        let update = cache.add(sized_image("big-6", 700_000));
        assert_eq!(update.persisted, PersistOutcome::Discarded);
        assert!(!cache.storage().contains(STORAGE_KEY));
        assert_eq!(cache.storage().get(STORAGE_KEY)?, None);
        // The session keeps working from memory.
        assert_eq!(cache.len(), 7);
        Ok(())
    }

    #[test]
    fn failed_write_drops_previous_snapshot() -> anyhow::Result<()> {
        let inner = MemoryStorage::new();
        inner.set(STORAGE_KEY, r#"{"schemaVersion":1,"images":[]}"#)?;
        let cache = ImageCache::open(RejectingStorage { inner });
        let update = cache.add(image("a"));
        assert_eq!(update.persisted, PersistOutcome::Discarded);
        assert_eq!(cache.storage().get(STORAGE_KEY)?, None);
        assert_eq!(ids(&cache), vec!["a"]);
        Ok(())
    }

    #[test]
    fn unreadable_blob_loads_as_empty() -> anyhow::Result<()> {
        let storage = MemoryStorage::new();
        storage.set(STORAGE_KEY, "{{{ definitely not json")?;
        let cache = ImageCache::open(storage);
        assert!(cache.is_empty());
        cache.add(image("a"));
        assert_eq!(ids(&cache), vec!["a"]);
        Ok(())
    }

    #[test]
    fn unversioned_blob_is_upgraded_on_open() -> anyhow::Result<()> {
        let storage = MemoryStorage::new();
        storage.set(
            STORAGE_KEY,
            r#"{"images":[{"id":"old","url":"data:image/png;base64,AA","prompt":"p","timestamp":1}]}"#,
        )?;
        let cache = ImageCache::open(storage);
        assert_eq!(cache.snapshot().schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(ids(&cache), vec!["old"]);
        Ok(())
    }

    #[test]
    fn reopening_file_storage_restores_history() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let cache = ImageCache::open(FileStorage::new(temp.path()));
        cache.add(image("a"));
        cache.add(image("b"));

        let reopened = ImageCache::open(FileStorage::new(temp.path()));
        assert_eq!(ids(&reopened), vec!["b", "a"]);
        Ok(())
    }

    #[test]
    fn add_merges_with_concurrent_writer() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let cache_a = ImageCache::open(FileStorage::new(temp.path()));
        let cache_b = ImageCache::open(FileStorage::new(temp.path()));

        cache_a.add(image("a"));
        cache_b.add(image("b"));
        cache_a.add(image("c"));

        let reloaded = ImageCache::open(FileStorage::new(temp.path()));
        assert_eq!(ids(&reloaded), vec!["c", "b", "a"]);
        Ok(())
    }

    #[test]
    fn concurrent_adds_from_threads_are_not_lost() {
        let cache = Arc::new(ImageCache::open(MemoryStorage::new()));
        let handles: Vec<_> = (0..8)
            .map(|idx| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.add(image(&format!("t-{idx}")));
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().is_ok());
        }
        assert_eq!(cache.len(), 8);
        let raw = cache.storage().get(STORAGE_KEY).ok().flatten().unwrap_or_default();
        assert_eq!(decode_state(&raw).images.len(), 8);
    }
}
