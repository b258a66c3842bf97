//! Deduplication gate over post identifiers.
//!
//! Webhook deliveries are at-least-once and may overlap, so several pipeline
//! runs can resolve the same post concurrently. The gate keeps a monotonic
//! watermark of the highest post identifier already processed and admits a
//! post exactly once: whichever run advances the watermark proceeds, every
//! other run sees a duplicate.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::PostId;

/// A monotonic watermark over processed post identifiers.
///
/// `admit` is a single atomic read-modify-write, so no run can observe a
/// stale watermark while another run is updating it, and no locking is
/// needed around the gate.
#[derive(Debug, Default)]
pub struct DedupGate {
    watermark: AtomicU64,
}

impl DedupGate {
    /// Creates a gate that admits any post identifier greater than zero.
    pub fn new() -> Self {
        DedupGate {
            watermark: AtomicU64::new(0),
        }
    }

    /// Creates a gate with a pre-set watermark.
    pub fn with_watermark(watermark: u64) -> Self {
        DedupGate {
            watermark: AtomicU64::new(watermark),
        }
    }

    /// Admits a post exactly once.
    ///
    /// Returns `false` when `post` is at or below the watermark (duplicate,
    /// no mutation); otherwise atomically advances the watermark to `post`
    /// and returns `true`. Under concurrent calls with the same identifier,
    /// exactly one caller is admitted.
    pub fn admit(&self, post: PostId) -> bool {
        let previous = self.watermark.fetch_max(post.0, Ordering::AcqRel);
        post.0 > previous
    }

    /// The highest post identifier admitted so far.
    pub fn watermark(&self) -> u64 {
        self.watermark.load(Ordering::Acquire)
    }
}
