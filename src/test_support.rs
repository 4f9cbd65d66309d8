//! In-memory gateway and fixtures for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::gateway::{Gateway, GatewayError};
use crate::model::{
    Category, CommitAck, CommitRequest, DatasetId, DatasetProgress, Item, ItemId, ItemStatus,
};

/// Encode a solid-color PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 30, 30, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Plain items with the given ids.
pub fn items(ids: &[ItemId]) -> Vec<Item> {
    ids.iter().copied().map(Item::new).collect()
}

/// Scripted dataset service.
///
/// Batches and single-item answers are served from queues in the order they
/// were pushed; once a queue runs dry the dataset looks exhausted.
#[derive(Default)]
pub struct FakeGateway {
    categories: Mutex<Vec<Category>>,
    batches: Mutex<VecDeque<Result<Vec<Item>, GatewayError>>>,
    singles: Mutex<VecDeque<Option<Item>>>,
    items: Mutex<HashMap<ItemId, Item>>,
    payloads: Mutex<HashMap<ItemId, Vec<u8>>>,
    failing_payloads: Mutex<HashSet<ItemId>>,
    commit_results: Mutex<VecDeque<Result<CommitAck, GatewayError>>>,
    batch_gate: Mutex<Option<Arc<Semaphore>>>,
    payload_gates: Mutex<HashMap<ItemId, Arc<Semaphore>>>,

    commits: Mutex<Vec<(ItemId, CommitRequest)>>,
    batch_calls: Mutex<Vec<(DatasetId, usize)>>,
    payload_calls: Mutex<Vec<ItemId>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_categories(&self, categories: Vec<Category>) {
        *self.categories.lock().unwrap() = categories;
    }

    pub fn push_batch(&self, batch: Vec<Item>) {
        self.batches.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_batch_error(&self, error: GatewayError) {
        self.batches.lock().unwrap().push_back(Err(error));
    }

    pub fn push_single(&self, item: Option<Item>) {
        self.singles.lock().unwrap().push_back(item);
    }

    pub fn insert_item(&self, item: Item) {
        self.items.lock().unwrap().insert(item.id, item);
    }

    pub fn set_payload(&self, id: ItemId, bytes: Vec<u8>) {
        self.payloads.lock().unwrap().insert(id, bytes);
    }

    pub fn fail_payload(&self, id: ItemId) {
        self.failing_payloads.lock().unwrap().insert(id);
    }

    pub fn heal_payload(&self, id: ItemId) {
        self.failing_payloads.lock().unwrap().remove(&id);
    }

    pub fn push_commit_result(&self, result: Result<CommitAck, GatewayError>) {
        self.commit_results.lock().unwrap().push_back(result);
    }

    /// Make batch requests wait until [`release_batches`](Self::release_batches).
    pub fn hold_batches(&self) {
        *self.batch_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_batches(&self) {
        if let Some(gate) = self.batch_gate.lock().unwrap().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Make the payload request for `id` wait until
    /// [`release_payload`](Self::release_payload).
    pub fn hold_payload(&self, id: ItemId) {
        self.payload_gates
            .lock()
            .unwrap()
            .insert(id, Arc::new(Semaphore::new(0)));
    }

    pub fn release_payload(&self, id: ItemId) {
        if let Some(gate) = self.payload_gates.lock().unwrap().remove(&id) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn commits(&self) -> Vec<(ItemId, CommitRequest)> {
        self.commits.lock().unwrap().clone()
    }

    pub fn batch_calls(&self) -> Vec<(DatasetId, usize)> {
        self.batch_calls.lock().unwrap().clone()
    }

    pub fn payload_calls(&self) -> Vec<ItemId> {
        self.payload_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn categories(&self, _dataset: DatasetId) -> Result<Vec<Category>, GatewayError> {
        Ok(self.categories.lock().unwrap().clone())
    }

    async fn next_batch(
        &self,
        dataset: DatasetId,
        count: usize,
    ) -> Result<Vec<Item>, GatewayError> {
        self.batch_calls.lock().unwrap().push((dataset, count));
        let gate = self.batch_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }
        let next = self.batches.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
            .map(|batch| batch.into_iter().take(count).collect())
    }

    async fn next_item(&self, _dataset: DatasetId) -> Result<Option<Item>, GatewayError> {
        Ok(self.singles.lock().unwrap().pop_front().flatten())
    }

    async fn item(&self, id: ItemId) -> Result<Item, GatewayError> {
        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                detail: format!("item {id}"),
            })
    }

    async fn payload(&self, id: ItemId) -> Result<Vec<u8>, GatewayError> {
        self.payload_calls.lock().unwrap().push(id);
        let gate = self.payload_gates.lock().unwrap().get(&id).cloned();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }
        if self.failing_payloads.lock().unwrap().contains(&id) {
            return Err(GatewayError::Transport {
                message: "connection reset".to_string(),
            });
        }
        Ok(self
            .payloads
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("payload-{id}").into_bytes()))
    }

    async fn commit(
        &self,
        id: ItemId,
        request: &CommitRequest,
    ) -> Result<CommitAck, GatewayError> {
        let result = self
            .commit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(CommitAck {
                    message: "saved".to_string(),
                    status: Some(if request.skip {
                        ItemStatus::Skipped
                    } else {
                        ItemStatus::Labeled
                    }),
                })
            });
        if result.is_ok() {
            self.commits.lock().unwrap().push((id, request.clone()));
        }
        result
    }

    async fn progress(&self, _dataset: DatasetId) -> Result<DatasetProgress, GatewayError> {
        let committed = self.commits.lock().unwrap().len() as u64;
        Ok(DatasetProgress {
            total: 10,
            labeled: committed,
            skipped: 0,
            pending: 10u64.saturating_sub(committed),
            progress: committed as f64 * 10.0,
        })
    }
}
