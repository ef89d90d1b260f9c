//! Turnstile - In-process Request Admission Control
//!
//! This crate decides, for each incoming request, whether it may proceed
//! immediately or must be rejected. It provides two independent limiters:
//! a continuously refilling [`ratelimit::TokenBucket`] and an exact
//! timestamp [`ratelimit::SlidingWindowLog`]. Both are synchronous,
//! thread-safe, and meant to be owned by (or shared through an `Arc` with)
//! whichever component performs admission control.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod simulation;
