//! Common admission seam shared by the limiter algorithms.

/// Trait for admission control implementations.
///
/// This trait abstracts over the token bucket and the sliding window log so
/// a caller can drive either through `Arc<dyn Admission>`.
pub trait Admission: Send + Sync {
    /// Decide whether one unit-cost request may proceed now.
    fn admit(&self) -> bool;

    /// Short name of the algorithm backing this limiter.
    fn algorithm(&self) -> &'static str;
}
