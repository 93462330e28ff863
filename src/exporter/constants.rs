/// Header carrying the project api key.
pub const API_KEY_HEADER: &str = "ApiKey";

/// Delay before the first retry; doubled on every following attempt.
pub const BACKOFF_BASE_MS: u64 = 100;

/// Upper bound for a single retry delay.
pub const BACKOFF_MAX_MS: u64 = 2_000;

/// Batches larger than this are logged as suspicious, they are still sent.
pub const MAX_CONTENT_SIZE_BYTES: usize = 5 * 1_024 * 1_024;
