//! Engine configuration.
//!
//! Overrides can be set programmatically or through environment variables;
//! invalid values fall back to the defaults with a warning.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// `0.0..=1.0` fraction of root traces to record.
pub const ENV_SAMPLING_RATE: &str = "TRACE_LIFECYCLE_SAMPLING_RATE";
/// Milliseconds of write quiescence after which cache entries expire.
pub const ENV_CACHE_TTL_MS: &str = "TRACE_LIFECYCLE_CACHE_TTL_MS";
/// Maximum entry count for each bookkeeping cache.
pub const ENV_CACHE_MAX_ENTRIES: &str = "TRACE_LIFECYCLE_CACHE_MAX_ENTRIES";

const DEFAULT_SAMPLING_RATE: f64 = 1.0;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// Lifecycle engine configuration.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Config {
    /// Fraction of root traces to record, `0.0..=1.0`.
    pub sampling_rate: f64,

    /// Cache entries expire this long after their last write.
    pub cache_ttl: Duration,

    /// Maximum number of entries per bookkeeping cache.
    pub cache_max_entries: usize,
}

impl Default for Config {
    /// Defaults (sample everything, 60s quiescence, 10k entries) with
    /// environment overrides applied.
    fn default() -> Self {
        let mut config = Config {
            sampling_rate: DEFAULT_SAMPLING_RATE,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        };

        if let Some(raw) = env::var(ENV_SAMPLING_RATE).ok().filter(|s| !s.is_empty()) {
            match f64::from_str(&raw) {
                Ok(rate) if (0.0..=1.0).contains(&rate) => config.sampling_rate = rate,
                _ => warn!(
                    value = %raw,
                    "{ENV_SAMPLING_RATE} must be a float in [0.0, 1.0], using default {DEFAULT_SAMPLING_RATE}"
                ),
            }
        }

        if let Some(raw) = env::var(ENV_CACHE_TTL_MS).ok().filter(|s| !s.is_empty()) {
            match u64::from_str(&raw) {
                Ok(millis) if millis > 0 => config.cache_ttl = Duration::from_millis(millis),
                _ => warn!(
                    value = %raw,
                    "{ENV_CACHE_TTL_MS} must be a positive integer of milliseconds, using default"
                ),
            }
        }

        if let Some(raw) = env::var(ENV_CACHE_MAX_ENTRIES).ok().filter(|s| !s.is_empty()) {
            match usize::from_str(&raw) {
                Ok(max) if max > 0 => config.cache_max_entries = max,
                _ => warn!(
                    value = %raw,
                    "{ENV_CACHE_MAX_ENTRIES} must be a positive integer, using default {DEFAULT_CACHE_MAX_ENTRIES}"
                ),
            }
        }

        config
    }
}

impl Config {
    /// Set the fraction of root traces to record.
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate;
        self
    }

    /// Set the write-quiescence duration after which cache entries expire.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the maximum entry count for each bookkeeping cache.
    pub fn with_cache_max_entries(mut self, max_entries: usize) -> Self {
        self.cache_max_entries = max_entries;
        self
    }
}
