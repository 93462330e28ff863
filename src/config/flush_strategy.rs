use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

/// Batch window used by the `Default` strategy.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeriodicStrategy {
    pub interval: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum FlushStrategy {
    #[default]
    Default,
    /// Await the per-request export before the response completes.
    End,
    Periodically(PeriodicStrategy),
}

impl FlushStrategy {
    /// Window after which pending records are transmitted regardless of size.
    #[must_use]
    pub fn interval(&self) -> Duration {
        match self {
            FlushStrategy::Periodically(periodic) => Duration::from_millis(periodic.interval.max(1)),
            FlushStrategy::Default | FlushStrategy::End => {
                Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS)
            }
        }
    }

    #[must_use]
    pub fn awaits_request_export(&self) -> bool {
        matches!(self, FlushStrategy::End)
    }
}

// Flush Strategy can be either "end" or "periodically,<ms>"
impl<'de> Deserialize<'de> for FlushStrategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value.as_str() == "end" {
            return Ok(FlushStrategy::End);
        }

        let mut split_value = value.as_str().split(',');
        let strategy = split_value.next();
        let interval: Option<u64> = split_value.next().and_then(|v| v.trim().parse().ok());

        match (strategy, interval) {
            (Some("periodically"), Some(interval)) => {
                Ok(FlushStrategy::Periodically(PeriodicStrategy { interval }))
            }
            (Some(strategy), _) => {
                debug!("Invalid flush strategy: {}, using default", strategy);
                Ok(FlushStrategy::Default)
            }
            _ => {
                debug!("Invalid flush strategy: {}, using default", value);
                Ok(FlushStrategy::Default)
            }
        }
    }
}
