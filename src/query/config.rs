use std::time::Duration;

/// Client-wide defaults for query behavior.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// How long data is considered fresh before becoming stale.
    ///
    /// Fresh data is served from the cache without refetching. Stale data is
    /// still shown while a background refetch runs.
    pub stale_time: Duration,

    /// How long cached data is retained before it expires.
    pub cache_time: Duration,

    /// Whether a failed fetch is attempted one more time.
    pub retry: bool,

    /// Pause before the retry attempt.
    pub retry_delay: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(0),      // immediately stale
            cache_time: Duration::from_secs(5 * 60), // 5 minutes
            retry: false,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl QueryConfig {
    /// Creates a configuration with the given stale and cache times.
    #[must_use]
    pub fn new(stale_time: Duration, cache_time: Duration) -> Self {
        Self {
            stale_time,
            cache_time,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: bool, delay: Duration) -> Self {
        self.retry = retry;
        self.retry_delay = delay;
        self
    }
}

/// Per-query options, the equivalent of the options object passed to a query hook.
///
/// Unset fields fall back to the client's [`QueryConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryOptions {
    /// When `false` the query never fetches and stays idle.
    pub enabled: bool,
    pub stale_time: Option<Duration>,
    /// Period of forced background refetches while the query is mounted.
    pub refetch_interval: Option<Duration>,
    /// Whether results are read from and written to the shared cache.
    pub cache_enabled: bool,
    pub retry: Option<bool>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: None,
            refetch_interval: None,
            cache_enabled: true,
            retry: None,
        }
    }
}

impl QueryOptions {
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub const fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    #[must_use]
    pub const fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    #[must_use]
    pub const fn cache_enabled(mut self, cache_enabled: bool) -> Self {
        self.cache_enabled = cache_enabled;
        self
    }

    #[must_use]
    pub const fn retry(mut self, retry: bool) -> Self {
        self.retry = Some(retry);
        self
    }

    pub(crate) fn effective_stale_time(&self, config: &QueryConfig) -> Duration {
        self.stale_time.unwrap_or(config.stale_time)
    }

    pub(crate) fn effective_retry(&self, config: &QueryConfig) -> bool {
        self.retry.unwrap_or(config.retry)
    }
}
