//! Torch-Markup - annotation client core
//!
//! Pulls images from a remote labeling service ahead of time, keeps their
//! payloads cached locally, and tracks bounding-box edits with undo/redo
//! until they are saved back.

pub mod config;
pub mod constants;
mod error;
pub mod gateway;
mod history;
pub mod model;
pub mod payload_cache;
pub mod repl;
mod state;

#[cfg(test)]
mod test_support;

pub use config::{ClientConfig, ConfigError, LogLevel, PrefetchConfig, SessionConfig};
pub use error::SessionError;
pub use gateway::{
    CredentialProvider, EnvToken, Gateway, GatewayError, HttpGateway, NoCredentials, StaticToken,
};
pub use history::HistoryStack;
pub use payload_cache::{Materialized, PayloadCache, PayloadError, PayloadHandle};
pub use state::{InitOutcome, PrefetchQueue, PrefetchStatus, QueueEntry, Session};
