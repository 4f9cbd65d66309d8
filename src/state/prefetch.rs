//! Look-ahead queue of items waiting to be presented.
//!
//! The queue is filled from the server in batches and every queued item gets
//! its payload materialized before it becomes visible in the queue, so taking
//! the next item never waits on the network. The first fill
//! ([`PrefetchQueue::initialize`]) is awaited by the caller; later refills
//! ([`PrefetchQueue::top_up`]) run in the background while the user works.
//!
//! Only one fill runs at a time. A second request while one is outstanding
//! is dropped, not queued.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::PrefetchConfig;
use crate::gateway::{Gateway, GatewayError};
use crate::model::{DatasetId, Item, ItemId};
use crate::payload_cache::{Materialized, PayloadCache};

/// An item waiting in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub item: Item,
    /// Whether the payload was materialized into the cache
    pub payload_ready: bool,
}

/// Result of the first, blocking fill.
#[derive(Debug, Clone, PartialEq)]
pub enum InitOutcome {
    /// The queue was filled; this is its first entry, already dequeued
    Ready(QueueEntry),
    /// The server had nothing to hand out
    EmptyDataset,
    /// Another fill was already running; nothing was done
    Busy,
    /// The cache was released while loading and the batch was dropped
    Discarded,
}

/// Snapshot of the queue for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchStatus {
    pub queue_len: usize,
    /// Payload materialization progress of the running fill, 0-100
    pub progress: u8,
    pub is_prefetching: bool,
    /// True until the first fill has finished
    pub is_initial_load: bool,
}

#[derive(Debug)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    /// Item on screen; never appended by a refill
    current: Option<ItemId>,
    refilling: bool,
    initial_load: bool,
    progress: u8,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            current: None,
            refilling: false,
            initial_load: true,
            progress: 0,
        }
    }
}

impl QueueState {
    /// Ids a refill must not append: everything queued plus the current item.
    fn taken_ids(&self) -> HashSet<ItemId> {
        self.entries
            .iter()
            .map(|e| e.item.id)
            .chain(self.current)
            .collect()
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 / total as f64) * 100.0).round() as u8
}

/// FIFO of prefetched items paired with the payload cache.
///
/// Cloning yields another handle to the same queue, which is how background
/// refills reach it.
#[derive(Debug, Clone)]
pub struct PrefetchQueue {
    state: Arc<Mutex<QueueState>>,
    cache: PayloadCache,
    config: PrefetchConfig,
}

impl PrefetchQueue {
    pub fn new(config: PrefetchConfig, cache: PayloadCache) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            cache,
            config,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Ids of the queued items, head first.
    pub fn ids(&self) -> Vec<ItemId> {
        self.state().entries.iter().map(|e| e.item.id).collect()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.state().entries.iter().any(|e| e.item.id == id)
    }

    pub fn status(&self) -> PrefetchStatus {
        let state = self.state();
        PrefetchStatus {
            queue_len: state.entries.len(),
            progress: state.progress,
            is_prefetching: state.refilling,
            is_initial_load: state.initial_load,
        }
    }

    /// Whether a [`top_up`](Self::top_up) would do anything right now.
    pub fn needs_refill(&self) -> bool {
        let state = self.state();
        !state.refilling && state.entries.len() < self.config.low_water_mark
    }

    /// Pop the head entry. Never touches the network.
    pub fn dequeue(&self) -> Option<QueueEntry> {
        self.state().entries.pop_front()
    }

    /// Mark `id` as the item on screen.
    ///
    /// A queued entry for it is dropped, and refills still in flight will not
    /// append it.
    pub fn set_current(&self, id: Option<ItemId>) {
        let mut state = self.state();
        state.current = id;
        if let Some(id) = id {
            state.entries.retain(|e| e.item.id != id);
        }
    }

    /// Drop every queued entry and forget any running fill.
    ///
    /// Release the payload cache before calling this so that a fill still in
    /// flight sees the new cache generation and discards its results.
    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.current = None;
        state.refilling = false;
        state.initial_load = true;
        state.progress = 0;
    }

    /// Claim the fill slot. Returns `false` if a fill is already running.
    fn begin_fill(&self, initial: bool) -> bool {
        let mut state = self.state();
        if state.refilling {
            return false;
        }
        state.refilling = true;
        state.progress = 0;
        if initial {
            state.initial_load = true;
        }
        true
    }

    /// Release the fill slot, unless a reset already handed it to a newer fill.
    fn end_fill(&self, generation: u64) {
        let mut state = self.state();
        if self.cache.generation() == generation {
            state.refilling = false;
        }
    }

    fn set_progress(&self, generation: u64, done: usize, total: usize) {
        let mut state = self.state();
        if self.cache.generation() == generation {
            state.progress = percent(done, total);
        }
    }

    /// Materialize payloads one after another, reporting progress after each.
    ///
    /// Returns `None` if the cache was released part way through.
    async fn materialize_all<G: Gateway + ?Sized>(
        &self,
        gateway: &G,
        items: Vec<Item>,
        generation: u64,
    ) -> Option<Vec<QueueEntry>> {
        let total = items.len();
        let mut entries = Vec::with_capacity(total);
        for (i, item) in items.into_iter().enumerate() {
            let outcome = self
                .cache
                .materialize_in(gateway, item.id, generation)
                .await;
            if outcome == Materialized::Stale {
                return None;
            }
            entries.push(QueueEntry {
                payload_ready: matches!(
                    outcome,
                    Materialized::Inserted | Materialized::AlreadyCached
                ),
                item,
            });
            self.set_progress(generation, i + 1, total);
        }
        Some(entries)
    }

    /// First fill: fetch one batch, materialize every payload, and hand back
    /// the first entry.
    ///
    /// An empty batch is reported as [`InitOutcome::EmptyDataset`] and leaves
    /// the queue empty. Gateway errors on the batch request are returned.
    pub async fn initialize<G: Gateway + ?Sized>(
        &self,
        gateway: &G,
        dataset: DatasetId,
    ) -> Result<InitOutcome, GatewayError> {
        let generation = self.cache.generation();
        if !self.begin_fill(true) {
            log::debug!("Prefetch: initialize dropped, a fill is already running");
            return Ok(InitOutcome::Busy);
        }

        log::info!(
            "Prefetch: loading first batch of {} for dataset {}",
            self.config.batch_size,
            dataset
        );
        let batch = match gateway.next_batch(dataset, self.config.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                self.end_fill(generation);
                return Err(e);
            }
        };

        let mut seen = HashSet::new();
        let batch: Vec<Item> = batch.into_iter().filter(|i| seen.insert(i.id)).collect();

        if batch.is_empty() {
            let mut state = self.state();
            if self.cache.generation() == generation {
                state.refilling = false;
                state.initial_load = false;
            }
            log::info!("Prefetch: dataset {} has no items left", dataset);
            return Ok(InitOutcome::EmptyDataset);
        }

        let Some(entries) = self.materialize_all(gateway, batch, generation).await else {
            log::debug!("Prefetch: first batch discarded after release");
            return Ok(InitOutcome::Discarded);
        };

        let mut state = self.state();
        if self.cache.generation() != generation {
            log::debug!("Prefetch: first batch discarded after release");
            return Ok(InitOutcome::Discarded);
        }
        state.entries = entries.into();
        state.refilling = false;
        state.initial_load = false;
        state.progress = 100;
        log::info!("Prefetch: {} item(s) ready", state.entries.len());

        Ok(state
            .entries
            .pop_front()
            .map_or(InitOutcome::EmptyDataset, InitOutcome::Ready))
    }

    /// Background refill: fetch a batch when the queue is below the
    /// low-water mark and append the items that are neither queued nor on
    /// screen.
    ///
    /// Both are checked when the batch arrives and again when appending, since
    /// the current item can change while payloads download. Errors are logged
    /// and swallowed. Returns the number of entries appended.
    pub async fn top_up<G: Gateway + ?Sized>(&self, gateway: &G, dataset: DatasetId) -> usize {
        let generation = self.cache.generation();
        {
            let len = self.len();
            if len >= self.config.low_water_mark {
                return 0;
            }
            if !self.begin_fill(false) {
                log::debug!("Prefetch: refill skipped, a fill is already running");
                return 0;
            }
            log::debug!("Prefetch: refilling, {} item(s) left in queue", len);
        }

        let batch = match gateway.next_batch(dataset, self.config.batch_size).await {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("Prefetch: background refill failed: {}", e);
                self.end_fill(generation);
                return 0;
            }
        };

        let fresh: Vec<Item> = {
            let mut seen = self.state().taken_ids();
            batch.into_iter().filter(|i| seen.insert(i.id)).collect()
        };

        let Some(entries) = self.materialize_all(gateway, fresh, generation).await else {
            log::debug!("Prefetch: refill discarded after release");
            return 0;
        };

        let mut state = self.state();
        if self.cache.generation() != generation {
            log::debug!("Prefetch: refill discarded after release");
            return 0;
        }
        let mut seen = state.taken_ids();
        let fetched = entries.len();
        let entries: Vec<QueueEntry> = entries
            .into_iter()
            .filter(|e| seen.insert(e.item.id))
            .collect();
        if entries.len() < fetched {
            log::debug!(
                "Prefetch: dropped {} item(s) opened or queued during refill",
                fetched - entries.len()
            );
        }
        let added = entries.len();
        state.entries.extend(entries);
        state.refilling = false;
        state.progress = 100;
        log::info!(
            "Prefetch: appended {} item(s), queue now {}",
            added,
            state.entries.len()
        );
        added
    }
}
