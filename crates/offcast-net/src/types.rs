use std::time::Duration;

/// Options applied to every request issued through an [`crate::HttpClient`].
#[derive(Clone, Debug)]
pub struct NetOptions {
    /// Sent as the `User-Agent` header on every outbound request.
    pub user_agent: String,
    /// Per-request timeout (connect + body).
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            user_agent: format!(
                "playkit-dtg/{}-{}",
                std::env::consts::OS,
                env!("CARGO_PKG_VERSION")
            ),
            request_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 8,
        }
    }
}

/// A byte range for resuming a partial transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    pub fn from_start(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn to_header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Delay before the given retry attempt. Attempt 0 is the initial try.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponential = self.base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1));
        exponential.min(self.max_delay)
    }
}
