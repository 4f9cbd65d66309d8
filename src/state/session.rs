//! The annotation session: one facade over the prefetch queue, the payload
//! cache and the undo history.
//!
//! Edits are synchronous and go through the history exactly once each.
//! Network operations are async. After an item is presented the queue is
//! topped up by a spawned task that the session never waits on, except in
//! [`Session::wait_for_refill`].

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::prefetch::{InitOutcome, PrefetchQueue, PrefetchStatus};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::gateway::Gateway;
use crate::history::HistoryStack;
use crate::model::{
    Annotation, AnnotationId, AnnotationIdGenerator, AnnotationPatch, Category, CategoryId,
    CommitAck, CommitRequest, DatasetId, DatasetProgress, Item, ItemId, NewAnnotation,
};
use crate::payload_cache::{Materialized, PayloadCache, PayloadHandle};

/// Annotation session for one user against one dataset service.
pub struct Session<G: Gateway + ?Sized + 'static> {
    gateway: Arc<G>,
    cache: PayloadCache,
    queue: PrefetchQueue,
    history: HistoryStack<Vec<Annotation>>,
    ids: AnnotationIdGenerator,

    current: Option<Item>,
    annotations: Vec<Annotation>,
    categories: Vec<Category>,
    selected_category: Option<CategoryId>,

    /// Background refill spawned after the last advance
    refill: Option<JoinHandle<usize>>,
}

impl<G: Gateway + ?Sized + 'static> Session<G> {
    pub fn new(gateway: Arc<G>, config: SessionConfig) -> Self {
        let cache = PayloadCache::new();
        let queue = PrefetchQueue::new(config.prefetch, cache.clone());
        Self {
            gateway,
            cache,
            queue,
            history: HistoryStack::new(config.history_limit),
            ids: AnnotationIdGenerator::new(),
            current: None,
            annotations: Vec::new(),
            categories: Vec::new(),
            selected_category: None,
            refill: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn current_item(&self) -> Option<&Item> {
        self.current.as_ref()
    }

    /// Live annotations of the open item.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn selected_category(&self) -> Option<&Category> {
        let id = self.selected_category?;
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryStack<Vec<Annotation>> {
        &self.history
    }

    pub fn prefetch_status(&self) -> PrefetchStatus {
        self.queue.status()
    }

    /// Ids waiting in the prefetch queue, head first.
    pub fn queued_ids(&self) -> Vec<ItemId> {
        self.queue.ids()
    }

    pub fn cache(&self) -> &PayloadCache {
        &self.cache
    }

    /// Payload of the open item, if it was materialized.
    pub fn current_payload(&self) -> Option<PayloadHandle> {
        self.current
            .as_ref()
            .and_then(|item| self.cache.resolve(item.id))
    }

    // ========================================================================
    // Categories
    // ========================================================================

    /// Load the dataset's categories. A single category is selected right away.
    pub async fn load_categories(
        &mut self,
        dataset: DatasetId,
    ) -> Result<&[Category], SessionError> {
        self.categories = self.gateway.categories(dataset).await?;
        if self.categories.len() == 1 {
            self.selected_category = Some(self.categories[0].id);
        } else if self
            .selected_category
            .is_some_and(|id| !self.categories.iter().any(|c| c.id == id))
        {
            // Selected category is gone from the reloaded list
            self.selected_category = None;
        }
        log::info!(
            "Loaded {} categories for dataset {}",
            self.categories.len(),
            dataset
        );
        Ok(&self.categories)
    }

    /// Select the category bound to `key`. Nothing changes when no category matches.
    pub fn select_category_by_shortcut(&mut self, key: char) -> Option<&Category> {
        let category = self.categories.iter().find(|c| c.shortcut() == Some(key))?;
        self.selected_category = Some(category.id);
        Some(category)
    }

    /// Select a category by id. Nothing changes when the id is unknown.
    pub fn select_category(&mut self, id: CategoryId) -> Option<&Category> {
        let category = self.categories.iter().find(|c| c.id == id)?;
        self.selected_category = Some(category.id);
        Some(category)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Make `item` the open item and start a fresh history for it.
    ///
    /// The payload of the item being left is revoked unless it is still queued.
    /// The queue is told about the new item so refills do not bring it back.
    fn present(&mut self, item: Option<Item>) {
        if let Some(previous) = self.current.take() {
            let same = item.as_ref().is_some_and(|i| i.id == previous.id);
            if !same && !self.queue.contains(previous.id) {
                self.cache.revoke(previous.id);
            }
        }

        self.history.reset();
        self.queue.set_current(item.as_ref().map(|i| i.id));
        match item {
            Some(item) => {
                log::info!("Presenting item {} ({})", item.id, item.filename);
                self.annotations = item.annotations.clone();
                self.current = Some(item);
                self.history.record(&self.annotations);
            }
            None => {
                log::info!("No item to present");
                self.annotations.clear();
            }
        }
    }

    /// Start a background refill unless one is running or the queue is full enough.
    fn spawn_top_up(&mut self, dataset: DatasetId) {
        if self.refill.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        if !self.queue.needs_refill() {
            return;
        }

        let queue = self.queue.clone();
        let gateway = Arc::clone(&self.gateway);
        self.refill = Some(tokio::spawn(async move {
            queue.top_up(&*gateway, dataset).await
        }));
    }

    /// Wait for the last background refill, returning how many items it added.
    pub async fn wait_for_refill(&mut self) -> usize {
        let Some(handle) = self.refill.take() else {
            return 0;
        };
        match handle.await {
            Ok(added) => added,
            Err(e) => {
                log::error!("Background refill task failed: {}", e);
                0
            }
        }
    }

    /// Advance to the next item of the dataset.
    ///
    /// The very first call fills the queue and waits for it. Later calls take
    /// the head of the queue and refill it in the background. When the queue
    /// is dry the server is asked for a single item; if it has none the
    /// session ends up with no open item, which is not an error.
    pub async fn fetch_next(&mut self, dataset: DatasetId) -> Result<Option<Item>, SessionError> {
        if self.current.is_none() && self.queue.is_empty() {
            match self.queue.initialize(&*self.gateway, dataset).await? {
                InitOutcome::Ready(entry) => {
                    self.present(Some(entry.item));
                    return Ok(self.current.clone());
                }
                InitOutcome::EmptyDataset | InitOutcome::Discarded => {
                    self.present(None);
                    return Ok(None);
                }
                InitOutcome::Busy => {
                    // A refill from an earlier advance is still running
                    self.wait_for_refill().await;
                }
            }
        }

        let item = match self.queue.dequeue() {
            Some(entry) => Some(entry.item),
            None => {
                log::debug!("Prefetch queue empty, requesting next item directly");
                let item = self.gateway.next_item(dataset).await?;
                if let Some(item) = &item {
                    self.cache.materialize(&*self.gateway, item.id).await;
                }
                item
            }
        };

        self.present(item);
        self.spawn_top_up(dataset);
        Ok(self.current.clone())
    }

    /// Open a specific item, bypassing the queue.
    pub async fn fetch_by_id(&mut self, id: ItemId) -> Result<Item, SessionError> {
        let item = self.gateway.item(id).await?;
        self.cache.materialize(&*self.gateway, id).await;
        self.present(Some(item.clone()));
        Ok(item)
    }

    /// Try again to materialize the payload of the open item.
    pub async fn retry_payload(&mut self) -> Option<Materialized> {
        let id = self.current.as_ref()?.id;
        Some(self.cache.materialize(&*self.gateway, id).await)
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Add an annotation to the open item and return it with its new id.
    ///
    /// Without an explicit category the selected one is used.
    pub fn add_annotation(&mut self, new: NewAnnotation) -> Result<Annotation, SessionError> {
        if self.current.is_none() {
            return Err(SessionError::NoItemOpen);
        }
        let category_id = new
            .category_id
            .or(self.selected_category)
            .ok_or(SessionError::NoCategorySelected)?;

        let id = self.ids.next_for(&self.annotations);
        let annotation = Annotation::new(id, category_id, new.bbox.clamped());
        self.annotations.push(annotation.clone());
        self.history.record(&self.annotations);
        Ok(annotation)
    }

    /// Apply `patch` to the annotation with `id`. Returns `false` if there is none.
    pub fn update_annotation(&mut self, id: AnnotationId, patch: AnnotationPatch) -> bool {
        let Some(annotation) = self.annotations.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        patch.apply(annotation);
        self.history.record(&self.annotations);
        true
    }

    /// Remove the annotation with `id`. Returns `false` if there is none.
    pub fn remove_annotation(&mut self, id: AnnotationId) -> bool {
        let Some(index) = self.annotations.iter().position(|a| a.id == id) else {
            return false;
        };
        self.annotations.remove(index);
        self.history.record(&self.annotations);
        true
    }

    /// Mark one annotation as selected. Selection is not recorded in history.
    pub fn select_annotation(&mut self, id: Option<AnnotationId>) {
        for annotation in &mut self.annotations {
            annotation.selected = Some(annotation.id) == id;
        }
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.annotations = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.annotations = snapshot;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Server commands
    // ========================================================================

    /// Save the open item's annotations, or mark it skipped.
    ///
    /// Returns `Ok(None)` when no item is open. On failure nothing local changes.
    pub async fn commit(&mut self, skip: bool) -> Result<Option<CommitAck>, SessionError> {
        let Some(id) = self.current.as_ref().map(|i| i.id) else {
            log::debug!("Commit ignored, no item open");
            return Ok(None);
        };

        let request = CommitRequest::from_annotations(&self.annotations, skip);
        let ack = self.gateway.commit(id, &request).await?;
        log::info!(
            "{} item {} with {} annotation(s)",
            if skip { "Skipped" } else { "Saved" },
            id,
            request.annotations.len()
        );
        Ok(Some(ack))
    }

    pub async fn dataset_progress(
        &self,
        dataset: DatasetId,
    ) -> Result<DatasetProgress, SessionError> {
        Ok(self.gateway.progress(dataset).await?)
    }

    /// Drop the open item, its history, the queue and every cached payload.
    ///
    /// A refill still in flight is aborted. Should it get past its last await
    /// first, it sees the new cache generation and discards its results.
    pub fn reset(&mut self) {
        if let Some(handle) = self.refill.take() {
            handle.abort();
        }
        self.current = None;
        self.annotations.clear();
        self.history.reset();
        // Release first so an in-flight refill sees the new generation
        self.cache.release_all();
        self.queue.clear();
        log::info!("Session reset");
    }
}
