//! Ferry Metrics - Instrumentation primitives for the call bridge
//!
//! Provides zero-cost abstractions for bridge diagnostics that completely
//! vanish in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable gauge and section timing collection (default: disabled)
//!
//! `RingBuffer` is always available: the bridge keeps its recent call-site
//! history in one regardless of the feature.
//!
//! # Usage
//!
//! ```ignore
//! use ferry_metrics::{CallProfiler, Counter};
//!
//! let mut gauges = Counter::new();
//! gauges.set("pending_to_host_queue", 3);
//!
//! let mut profiler = CallProfiler::new();
//! profiler.record("Logger.log()", elapsed);
//! ```
//!
//! In production builds (without `metrics` feature), all instrumentation
//! is compiled out to zero overhead.

mod ring_buffer;
#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod call_profiler;

pub use ring_buffer::RingBuffer;
#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use call_profiler::{CallProfiler, SectionStats};

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn set(&mut self, _name: &str, _value: usize) {}
    pub fn get(&self, _name: &str) -> usize { 0 }
    pub fn high_water(&self, _name: &str) -> usize { 0 }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionStats {
    pub calls: u64,
    pub total: std::time::Duration,
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct CallProfiler;

#[cfg(not(feature = "metrics"))]
impl CallProfiler {
    pub fn new() -> Self { Self }
    pub fn record(&mut self, _name: &str, _elapsed: std::time::Duration) {}
    pub fn stats(&self, _name: &str) -> SectionStats { SectionStats::default() }
}
