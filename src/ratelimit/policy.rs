//! Limiter configuration.
//!
//! Describes which admission algorithm to run and with what parameters, in a
//! form that can be loaded from YAML or environment variables.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::admission::Admission;
use super::sliding_window::SlidingWindowLog;
use super::token_bucket::{TokenBucket, DEFAULT_CAPACITY, DEFAULT_RATE};
use crate::error::Result;

/// Parameters for a single limiter, tagged by algorithm.
///
/// ```yaml
/// algorithm: token_bucket
/// capacity: 5
/// rate: 1.0
/// ```
///
/// ```yaml
/// algorithm: sliding_window_log
/// max_requests: 5
/// window_ms: 1000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterConfig {
    /// Refilling token bucket
    TokenBucket {
        /// Maximum tokens held
        #[serde(default = "default_capacity")]
        capacity: f64,
        /// Tokens added per second
        #[serde(default = "default_rate")]
        rate: f64,
    },
    /// Exact timestamp sliding window
    SlidingWindowLog {
        /// Maximum admissions per window
        max_requests: usize,
        /// Window length in milliseconds
        window_ms: u64,
    },
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig::TokenBucket {
            capacity: default_capacity(),
            rate: default_rate(),
        }
    }
}

fn default_capacity() -> f64 {
    DEFAULT_CAPACITY
}

fn default_rate() -> f64 {
    DEFAULT_RATE
}

impl LimiterConfig {
    /// Name of the configured algorithm.
    pub fn algorithm(&self) -> &'static str {
        match self {
            LimiterConfig::TokenBucket { .. } => "token_bucket",
            LimiterConfig::SlidingWindowLog { .. } => "sliding_window_log",
        }
    }

    /// Build a validated limiter from this configuration.
    pub fn build(&self) -> Result<Arc<dyn Admission>> {
        let limiter: Arc<dyn Admission> = match *self {
            LimiterConfig::TokenBucket { capacity, rate } => {
                info!(capacity, rate, "Building token bucket limiter");
                Arc::new(TokenBucket::new(capacity, rate)?)
            }
            LimiterConfig::SlidingWindowLog {
                max_requests,
                window_ms,
            } => {
                info!(max_requests, window_ms, "Building sliding window log limiter");
                Arc::new(SlidingWindowLog::new(
                    max_requests,
                    Duration::from_millis(window_ms),
                )?)
            }
        };
        Ok(limiter)
    }
}
