//! Remote dataset service.
//!
//! [`Gateway`] is the seam between the session core and the server. The HTTP
//! implementation lives in [`http`]; tests drive the core through an
//! in-memory fake.

mod credentials;
mod http;

pub use credentials::{CredentialProvider, EnvToken, NoCredentials, StaticToken};
pub use http::HttpGateway;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    Category, CommitAck, CommitRequest, DatasetId, DatasetProgress, Item, ItemId,
};

/// Errors returned by the remote dataset service.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Connection-level failure
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
    },

    /// The request did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// The credential was missing or rejected (HTTP 401)
    #[error("Unauthorized: {detail}")]
    Unauthorized {
        /// Server-provided detail
        detail: String,
    },

    /// The requested resource does not exist (HTTP 404)
    #[error("Not found: {detail}")]
    NotFound {
        /// Server-provided detail
        detail: String,
    },

    /// Any other non-success response
    #[error("Server returned {status}: {detail}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Server-provided detail
        detail: String,
    },

    /// The response body did not match the expected shape
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Whether this is a network-level failure rather than an answer from the server.
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport { .. } | GatewayError::Timeout)
    }

    /// Build an error from a non-success status code and its detail message.
    pub fn from_status(status: u16, detail: String) -> Self {
        match status {
            401 => GatewayError::Unauthorized { detail },
            404 => GatewayError::NotFound { detail },
            _ => GatewayError::Status { status, detail },
        }
    }
}

/// Operations the session core needs from the dataset service.
///
/// Every call may fail; the core never retries on its own.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Categories of a dataset, in display order.
    async fn categories(&self, dataset: DatasetId) -> Result<Vec<Category>, GatewayError>;

    /// Up to `count` items assigned to the caller.
    async fn next_batch(&self, dataset: DatasetId, count: usize)
    -> Result<Vec<Item>, GatewayError>;

    /// The next single item, or `None` when the dataset is exhausted.
    async fn next_item(&self, dataset: DatasetId) -> Result<Option<Item>, GatewayError>;

    /// A specific item with its stored annotations.
    async fn item(&self, id: ItemId) -> Result<Item, GatewayError>;

    /// Raw payload bytes of an item.
    async fn payload(&self, id: ItemId) -> Result<Vec<u8>, GatewayError>;

    /// Save (or skip) an item with the given annotations.
    async fn commit(&self, id: ItemId, request: &CommitRequest)
    -> Result<CommitAck, GatewayError>;

    /// Labeling progress of a dataset.
    async fn progress(&self, dataset: DatasetId) -> Result<DatasetProgress, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            GatewayError::from_status(401, "expired".into()),
            GatewayError::Unauthorized { .. }
        ));
        assert!(matches!(
            GatewayError::from_status(404, "gone".into()),
            GatewayError::NotFound { .. }
        ));
        let err = GatewayError::from_status(500, "boom".into());
        assert_eq!(err.to_string(), "Server returned 500: boom");
        assert!(!err.is_transport());
        assert!(GatewayError::Timeout.is_transport());
    }
}
