//! Data models for the annotation client.

mod annotation;
mod category;
mod item;

pub use annotation::{
    Annotation, AnnotationId, AnnotationIdGenerator, AnnotationPatch, BoundingBox, NewAnnotation,
};
pub use category::{Category, CategoryId};
pub use item::{
    CommitAck, CommitRequest, CommittedBox, DatasetId, DatasetProgress, Item, ItemId, ItemStatus,
};
