//! Admission control algorithms and their configuration.

mod admission;
mod policy;
mod sliding_window;
mod token_bucket;

pub use admission::Admission;
pub use policy::LimiterConfig;
pub use sliding_window::SlidingWindowLog;
pub use token_bucket::{TokenBucket, DEFAULT_CAPACITY, DEFAULT_RATE, TOKEN_EPSILON};
