//! Error types for session operations.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors returned by [`Session`](crate::Session) operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The dataset service call failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The operation needs an open item
    #[error("No item is open")]
    NoItemOpen,

    /// An annotation was added without a category and none is selected
    #[error("No category given and none selected")]
    NoCategorySelected,
}
