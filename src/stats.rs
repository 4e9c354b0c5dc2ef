// Pipeline counters — the metric hook for silent drops.
//
// Every stage drops malformed or expired units without surfacing an error;
// these counters are the only record. Shared as an Arc across all threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Frames handed to the decoder pool.
    pub frames: AtomicU64,
    /// Units dropped due to a parse failure at any network layer.
    pub parse_drops: AtomicU64,
    /// Successfully decoded DNS messages.
    pub dns_messages: AtomicU64,
    /// Payloads that looked like DNS but failed to decode.
    pub dns_failures: AtomicU64,
    /// Fragment table entries evicted by GC before completion.
    pub frag_evictions: AtomicU64,
    /// TCP flows destroyed by GC, RST, framing corruption, or buffer bounds.
    pub flow_evictions: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log_summary(&self) {
        log::info!(
            "pipeline: {} frames, {} parse drops, {} dns messages, {} dns failures, {} fragment evictions, {} flow evictions",
            self.frames.load(Ordering::Relaxed),
            self.parse_drops.load(Ordering::Relaxed),
            self.dns_messages.load(Ordering::Relaxed),
            self.dns_failures.load(Ordering::Relaxed),
            self.frag_evictions.load(Ordering::Relaxed),
            self.flow_evictions.load(Ordering::Relaxed),
        );
    }
}
