//! Annotation types and data structures.
//!
//! Geometry is stored the way the server stores it: a normalized box given by
//! its center and size, all values relative to the image in `[0, 1]`.

use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

use super::CategoryId;

/// Local identifier for an annotation, unique within the open item.
pub type AnnotationId = u64;

// ============================================================================
// Geometry
// ============================================================================

/// Map a coordinate into `[0, 1]`, treating non-finite values as zero.
fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// An axis-aligned bounding box in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Center X coordinate
    pub x_center: f32,
    /// Center Y coordinate
    pub y_center: f32,
    /// Width of the box
    pub width: f32,
    /// Height of the box
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            x_center,
            y_center,
            width,
            height,
        }
    }

    /// Create a box from two corner points, as produced by a drag gesture.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (x1, y1, x2, y2) = (unit(x1), unit(y1), unit(x2), unit(y2));
        Self {
            x_center: (x1 + x2) / 2.0,
            y_center: (y1 + y2) / 2.0,
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    /// Return a copy that lies entirely inside the image.
    ///
    /// The size is clamped first, then the center is moved so that no edge
    /// leaves the `[0, 1]` range.
    pub fn clamped(self) -> Self {
        let width = unit(self.width);
        let height = unit(self.height);
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self {
            x_center: unit(self.x_center).clamp(half_w, 1.0 - half_w),
            y_center: unit(self.y_center).clamp(half_h, 1.0 - half_h),
            width,
            height,
        }
    }
}

// ============================================================================
// Annotation
// ============================================================================

/// A labeled region within an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Local identifier (the server id for annotations loaded with the item).
    pub id: AnnotationId,
    /// Category this annotation belongs to.
    pub category_id: CategoryId,
    /// The box geometry.
    #[serde(flatten)]
    pub bbox: BoundingBox,
    /// Whether this annotation is currently selected in the UI.
    #[serde(skip)]
    pub selected: bool,
}

impl Annotation {
    /// Create a new annotation with the given id, category and box.
    pub fn new(id: AnnotationId, category_id: CategoryId, bbox: BoundingBox) -> Self {
        Self {
            id,
            category_id,
            bbox,
            selected: false,
        }
    }
}

/// Input for adding an annotation. The id is always assigned by the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewAnnotation {
    /// Category, or `None` to use the currently selected one.
    pub category_id: Option<CategoryId>,
    pub bbox: BoundingBox,
}

impl NewAnnotation {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            category_id: None,
            bbox,
        }
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

/// Partial update of an annotation. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnnotationPatch {
    pub category_id: Option<CategoryId>,
    pub x_center: Option<f32>,
    pub y_center: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

impl AnnotationPatch {
    /// Check whether the patch changes anything at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch in place; the resulting box is clamped.
    pub fn apply(&self, annotation: &mut Annotation) {
        if let Some(category_id) = self.category_id {
            annotation.category_id = category_id;
        }
        let bbox = &mut annotation.bbox;
        if let Some(v) = self.x_center {
            bbox.x_center = v;
        }
        if let Some(v) = self.y_center {
            bbox.y_center = v;
        }
        if let Some(v) = self.width {
            bbox.width = v;
        }
        if let Some(v) = self.height {
            bbox.height = v;
        }
        annotation.bbox = annotation.bbox.clamped();
    }
}

// ============================================================================
// Id generation
// ============================================================================

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Issues annotation ids from a microsecond clock.
///
/// Ids are strictly increasing across calls and always larger than every id
/// already present in the sequence they are issued for.
#[derive(Debug, Default)]
pub struct AnnotationIdGenerator {
    last: AnnotationId,
}

impl AnnotationIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce an id that does not collide with anything in `existing`.
    pub fn next_for(&mut self, existing: &[Annotation]) -> AnnotationId {
        let floor = existing.iter().map(|a| a.id).max().unwrap_or(0);
        let id = now_micros()
            .max(self.last.saturating_add(1))
            .max(floor.saturating_add(1));
        self.last = id;
        id
    }
}
