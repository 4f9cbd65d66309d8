//! Locally materialized item payloads.
//!
//! The cache owns one revocable [`PayloadHandle`] per item id. Handles are
//! cheap to clone and hand out; revoking drops the cache's copy of the bytes
//! and makes every clone report the payload as gone.
//!
//! A generation counter is bumped by [`PayloadCache::release_all`]. Fetches
//! that started under an older generation are thrown away when they finish,
//! so a slow download can never bring a handle back after a reset.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::gateway::Gateway;
use crate::model::ItemId;

/// Errors from reading a payload handle.
#[derive(Error, Debug)]
pub enum PayloadError {
    /// The handle was revoked before it was read
    #[error("Payload for item {0} has been released")]
    Revoked(ItemId),

    /// The bytes are not a decodable image
    #[error("Failed to decode payload: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug)]
struct HandleInner {
    item_id: ItemId,
    data: Mutex<Option<Arc<[u8]>>>,
}

/// A revocable reference to the raw bytes of one item's payload.
#[derive(Debug, Clone)]
pub struct PayloadHandle {
    inner: Arc<HandleInner>,
}

impl PayloadHandle {
    fn new(item_id: ItemId, bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                item_id,
                data: Mutex::new(Some(Arc::from(bytes))),
            }),
        }
    }

    fn data(&self) -> MutexGuard<'_, Option<Arc<[u8]>>> {
        self.inner.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn item_id(&self) -> ItemId {
        self.inner.item_id
    }

    /// The payload bytes, or `None` once revoked.
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        self.data().clone()
    }

    pub fn is_revoked(&self) -> bool {
        self.data().is_none()
    }

    /// Release the bytes. Calling this more than once has no further effect.
    pub fn revoke(&self) {
        self.data().take();
    }

    /// Image dimensions read from the header without a full decode.
    pub fn dimensions(&self) -> Result<(u32, u32), PayloadError> {
        let bytes = self.bytes().ok_or(PayloadError::Revoked(self.item_id()))?;
        let reader = image::ImageReader::new(Cursor::new(&bytes[..]))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)?;
        Ok(reader.into_dimensions()?)
    }

    /// Decode the payload into an image.
    pub fn decode(&self) -> Result<image::DynamicImage, PayloadError> {
        let bytes = self.bytes().ok_or(PayloadError::Revoked(self.item_id()))?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

/// Outcome of a materialize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    /// The payload was fetched and a new handle stored
    Inserted,
    /// A handle for this id already existed
    AlreadyCached,
    /// The fetch failed; the error was logged
    Failed,
    /// The cache was released while fetching; the bytes were dropped
    Stale,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<ItemId, PayloadHandle>,
    failed: HashSet<ItemId>,
    generation: u64,
}

/// Shared cache of payload handles keyed by item id.
#[derive(Debug, Clone, Default)]
pub struct PayloadCache {
    inner: Arc<Mutex<CacheState>>,
}

impl PayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current generation; changes on every [`release_all`](Self::release_all).
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// Fetch and store the payload for `id` unless it is already cached.
    pub async fn materialize<G: Gateway + ?Sized>(&self, gateway: &G, id: ItemId) -> Materialized {
        let generation = self.generation();
        self.materialize_in(gateway, id, generation).await
    }

    /// Like [`materialize`](Self::materialize), but only for the given generation.
    ///
    /// Used by background refills that must not outlive a reset.
    pub async fn materialize_in<G: Gateway + ?Sized>(
        &self,
        gateway: &G,
        id: ItemId,
        generation: u64,
    ) -> Materialized {
        {
            let state = self.state();
            if state.generation != generation {
                return Materialized::Stale;
            }
            if state.entries.contains_key(&id) {
                return Materialized::AlreadyCached;
            }
        }

        let bytes = match gateway.payload(id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Failed to materialize payload for item {}: {}", id, e);
                self.state().failed.insert(id);
                return Materialized::Failed;
            }
        };

        let mut state = self.state();
        if state.generation != generation {
            log::debug!("Dropping payload for item {} fetched before release", id);
            return Materialized::Stale;
        }
        if state.entries.contains_key(&id) {
            return Materialized::AlreadyCached;
        }
        log::debug!("Materialized payload for item {} ({} bytes)", id, bytes.len());
        state.failed.remove(&id);
        state.entries.insert(id, PayloadHandle::new(id, bytes));
        Materialized::Inserted
    }

    /// The handle for `id`, if cached.
    pub fn resolve(&self, id: ItemId) -> Option<PayloadHandle> {
        self.state().entries.get(&id).cloned()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.state().entries.contains_key(&id)
    }

    /// Whether the last materialize attempt for `id` failed.
    pub fn has_failed(&self, id: ItemId) -> bool {
        self.state().failed.contains(&id)
    }

    /// Revoke and drop the handle for `id`. Returns whether one existed.
    pub fn revoke(&self, id: ItemId) -> bool {
        let removed = {
            let mut state = self.state();
            state.failed.remove(&id);
            state.entries.remove(&id)
        };
        match removed {
            Some(handle) => {
                handle.revoke();
                log::debug!("Revoked payload for item {}", id);
                true
            }
            None => false,
        }
    }

    /// Revoke every handle, clear the index and start a new generation.
    ///
    /// Returns the number of handles released.
    pub fn release_all(&self) -> usize {
        let drained: Vec<PayloadHandle> = {
            let mut state = self.state();
            state.generation += 1;
            state.failed.clear();
            state.entries.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &drained {
            handle.revoke();
        }
        if !drained.is_empty() {
            log::info!("Released {} cached payload(s)", drained.len());
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Ids of all cached payloads, unordered.
    pub fn ids(&self) -> Vec<ItemId> {
        self.state().entries.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeGateway, png_bytes};

    #[tokio::test]
    async fn test_materialize_is_idempotent() {
        let gateway = FakeGateway::new();
        let cache = PayloadCache::new();

        assert_eq!(cache.materialize(&gateway, 1).await, Materialized::Inserted);
        assert_eq!(cache.materialize(&gateway, 1).await, Materialized::AlreadyCached);
        assert_eq!(gateway.payload_calls(), vec![1]);
        assert_eq!(cache.len(), 1);
        assert!(cache.resolve(1).is_some());
        assert!(cache.resolve(2).is_none());
    }

    #[tokio::test]
    async fn test_failed_materialize_is_swallowed() {
        let gateway = FakeGateway::new();
        gateway.fail_payload(5);
        let cache = PayloadCache::new();

        assert_eq!(cache.materialize(&gateway, 5).await, Materialized::Failed);
        assert!(!cache.contains(5));
        assert!(cache.has_failed(5));

        // A later retry succeeds once the server recovers
        gateway.heal_payload(5);
        assert_eq!(cache.materialize(&gateway, 5).await, Materialized::Inserted);
        assert!(!cache.has_failed(5));
    }

    #[tokio::test]
    async fn test_release_all_revokes_handles() {
        let gateway = FakeGateway::new();
        let cache = PayloadCache::new();
        cache.materialize(&gateway, 1).await;
        cache.materialize(&gateway, 2).await;

        let handle = cache.resolve(1).unwrap();
        assert!(handle.bytes().is_some());

        let generation = cache.generation();
        assert_eq!(cache.release_all(), 2);
        assert!(cache.is_empty());
        assert!(handle.is_revoked());
        assert!(handle.bytes().is_none());
        assert_ne!(cache.generation(), generation);

        // Revoking again is harmless
        handle.revoke();
        assert_eq!(cache.release_all(), 0);
    }

    #[tokio::test]
    async fn test_stale_generation_is_dropped() {
        let gateway = FakeGateway::new();
        let cache = PayloadCache::new();
        let old = cache.generation();
        cache.release_all();

        assert_eq!(cache.materialize_in(&gateway, 3, old).await, Materialized::Stale);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_single_entry() {
        let gateway = FakeGateway::new();
        let cache = PayloadCache::new();
        cache.materialize(&gateway, 1).await;
        let handle = cache.resolve(1).unwrap();

        assert!(cache.revoke(1));
        assert!(!cache.revoke(1));
        assert!(handle.is_revoked());
        assert!(matches!(handle.decode(), Err(PayloadError::Revoked(1))));
    }

    #[tokio::test]
    async fn test_decode_payload() {
        let gateway = FakeGateway::new();
        gateway.set_payload(9, png_bytes(4, 3));
        let cache = PayloadCache::new();
        cache.materialize(&gateway, 9).await;

        let handle = cache.resolve(9).unwrap();
        assert_eq!(handle.item_id(), 9);
        assert_eq!(handle.dimensions().unwrap(), (4, 3));
        let image = handle.decode().unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
    }

    #[tokio::test]
    async fn test_decode_garbage_fails() {
        let gateway = FakeGateway::new();
        gateway.set_payload(2, b"not an image".to_vec());
        let cache = PayloadCache::new();
        cache.materialize(&gateway, 2).await;

        let handle = cache.resolve(2).unwrap();
        assert!(matches!(handle.decode(), Err(PayloadError::Decode(_))));
    }
}
