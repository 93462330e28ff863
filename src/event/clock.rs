use std::sync::LazyLock;
use std::time::Instant;

static PROCESS_EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Monotonic nanoseconds since the first clock read of this process.
///
/// Only differences between two reads are meaningful.
#[must_use]
pub fn monotonic_nanos() -> u128 {
    PROCESS_EPOCH.elapsed().as_nanos()
}

/// Wall-clock milliseconds since the unix epoch.
#[must_use]
pub fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_never_goes_back() {
        let first = monotonic_nanos();
        let second = monotonic_nanos();
        assert!(second >= first);
    }

    #[test]
    fn timestamp_is_after_2020() {
        assert!(timestamp_millis() > 1_577_836_800_000);
    }
}
