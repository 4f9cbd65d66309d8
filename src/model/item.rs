//! Items (images) served by the dataset service, and the commit payload.

use serde::{Deserialize, Serialize};

use super::{Annotation, CategoryId};

/// Server-side item identifier.
pub type ItemId = i64;

/// Server-side dataset identifier.
pub type DatasetId = i64;

/// Workflow status of an item on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Assigned,
    Labeled,
    Skipped,
}

/// One unit of work: an image and its labels.
///
/// Read-only apart from its annotations while it is open in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub filename: String,
    /// Pixel width, when known to the server
    #[serde(default)]
    pub width: Option<u32>,
    /// Pixel height, when known to the server
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub status: ItemStatus,
    /// Annotations already stored for this item
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Item {
    /// Create an item with no metadata and no annotations.
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            dataset_id: 0,
            filename: String::new(),
            width: None,
            height: None,
            status: ItemStatus::Assigned,
            annotations: Vec::new(),
        }
    }
}

// ============================================================================
// Commit wire types
// ============================================================================

/// Geometry-only form of an annotation sent on commit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommittedBox {
    pub category_id: CategoryId,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

impl From<&Annotation> for CommittedBox {
    fn from(ann: &Annotation) -> Self {
        Self {
            category_id: ann.category_id,
            x_center: ann.bbox.x_center,
            y_center: ann.bbox.y_center,
            width: ann.bbox.width,
            height: ann.bbox.height,
        }
    }
}

/// Body of the save-or-skip command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub annotations: Vec<CommittedBox>,
    pub skip: bool,
}

impl CommitRequest {
    /// Strip local ids and transient flags from the live annotations.
    pub fn from_annotations(annotations: &[Annotation], skip: bool) -> Self {
        Self {
            annotations: annotations.iter().map(CommittedBox::from).collect(),
            skip,
        }
    }
}

/// Server acknowledgement of a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommitAck {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<ItemStatus>,
}

/// Labeling progress of a whole dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct DatasetProgress {
    pub total: u64,
    pub labeled: u64,
    pub skipped: u64,
    pub pending: u64,
    /// Percentage of labeled items
    pub progress: f64,
}
