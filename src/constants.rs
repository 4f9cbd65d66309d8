//! Global constants for the Torch-Markup client

/// Number of items requested from the server per prefetch batch
pub const PREFETCH_BATCH_SIZE: usize = 20;

/// Queue length below which a background refill is started
pub const PREFETCH_LOW_WATER_MARK: usize = 5;

/// Maximum number of annotation snapshots kept per item
pub const HISTORY_LIMIT: usize = 50;

/// Default request timeout for the remote gateway, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default server address when no configuration is present
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Environment variable holding the bearer token
pub const DEFAULT_TOKEN_ENV: &str = "TORCH_MARKUP_TOKEN";
