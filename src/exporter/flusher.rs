use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error as ThisError;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::event::Record;
use crate::exporter::constants::{
    API_KEY_HEADER, BACKOFF_BASE_MS, BACKOFF_MAX_MS, MAX_CONTENT_SIZE_BYTES,
};
use crate::http::{get_client, is_local_endpoint};

#[derive(Debug, ThisError)]
pub enum ExportError {
    #[error("no api key configured for {0}")]
    MissingApiKey(String),
    #[error("failed to serialize batch: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to compress batch: {0}")]
    Compression(#[from] std::io::Error),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl ExportError {
    fn is_retryable(&self) -> bool {
        match self {
            ExportError::Transport(_) => true,
            ExportError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Delay before retry number `attempt` (1-based).
#[must_use]
pub fn backoff(attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
    let millis = BACKOFF_BASE_MS.saturating_mul(1_u64 << exponent);
    Duration::from_millis(millis.min(BACKOFF_MAX_MS))
}

/// Sends batches of records to the ingestion endpoint.
pub struct Flusher {
    client: reqwest::Client,
    endpoint: String,
    local_endpoint: bool,
    config: Arc<Config>,
    missing_key_warned: AtomicBool,
}

impl std::fmt::Debug for Flusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flusher")
            .field("endpoint", &self.endpoint)
            .field("local_endpoint", &self.local_endpoint)
            .finish_non_exhaustive()
    }
}

impl Flusher {
    #[must_use]
    pub fn new(config: Arc<Config>, endpoint: String) -> Self {
        let client = get_client(&config);
        let local_endpoint = is_local_endpoint(&endpoint);

        Flusher {
            client,
            endpoint,
            local_endpoint,
            config,
            missing_key_warned: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends `records` as one batch, logging instead of returning failures.
    pub async fn flush(&self, records: Vec<Record>) {
        if records.is_empty() {
            return;
        }

        let count = records.len();
        match self.send(&records).await {
            Ok(()) => debug!("EXPORTER | Sent {count} records to {}", self.endpoint),
            Err(ExportError::MissingApiKey(_)) => {}
            Err(e) => error!("EXPORTER | Dropping {count} records: {e}"),
        }
    }

    /// Sends `records` as one batch, retrying transient failures.
    pub async fn send(&self, records: &[Record]) -> Result<(), ExportError> {
        let api_key = self.resolve_api_key()?;
        let (body, compressed) = self.encode(records)?;

        let mut attempts = 0;
        let max_attempts = self.config.flush_retry_count.max(1);

        loop {
            attempts += 1;

            let time = Instant::now();
            let result = self.transmit(body.clone(), compressed, api_key).await;
            let elapsed = time.elapsed();

            match result {
                Ok(()) => {
                    debug!(
                        "EXPORTER | Batch accepted in {} ms after {attempts} attempt(s)",
                        elapsed.as_millis()
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    let delay = backoff(attempts);
                    debug!(
                        "EXPORTER | Attempt {attempts} failed: {e}, retrying in {} ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!("EXPORTER | Failed to send batch after {attempts} attempt(s): {e}");
                    return Err(e);
                }
            }
        }
    }

    fn resolve_api_key(&self) -> Result<Option<&str>, ExportError> {
        match self.config.api_key.as_deref() {
            Some(key) => Ok(Some(key)),
            None if self.local_endpoint => Ok(None),
            None => {
                if !self.config.suppress_warnings
                    && !self.missing_key_warned.swap(true, Ordering::Relaxed)
                {
                    warn!(
                        "EXPORTER | METRONOME_API_KEY is not set, nothing will be sent to {}",
                        self.endpoint
                    );
                }
                Err(ExportError::MissingApiKey(self.endpoint.clone()))
            }
        }
    }

    fn encode(&self, records: &[Record]) -> Result<(Bytes, bool), ExportError> {
        let json = serde_json::to_vec(records)?;

        if self.config.debug {
            info!(
                "EXPORTER | Sending {} records to {}: {}",
                records.len(),
                self.endpoint,
                String::from_utf8_lossy(&json)
            );
        }
        if json.len() > MAX_CONTENT_SIZE_BYTES {
            warn!(
                "EXPORTER | Batch of {} records is {} bytes",
                records.len(),
                json.len()
            );
        }

        if !self.config.use_compression {
            return Ok((Bytes::from(json), false));
        }

        let mut encoder = zstd::Encoder::new(Vec::new(), self.config.compression_level)?;
        encoder.write_all(&json)?;
        Ok((Bytes::from(encoder.finish()?), true))
    }

    async fn transmit(
        &self,
        body: Bytes,
        compressed: bool,
        api_key: Option<&str>,
    ) -> Result<(), ExportError> {
        let mut request = self.client.post(&self.endpoint).body(body);
        if let Some(api_key) = api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }
        if compressed {
            request = request.header("Content-Encoding", "zstd");
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ExportError::Status { status, body })
    }
}
