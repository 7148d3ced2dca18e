//! Progress Aggregator (C5).
//!
//! Combines per-segment `(received, total)` updates into a single aggregate
//! pair and decides when to forward a progress event, per spec §4.5: deltas
//! only move forward, the aggregate total is either known up front or
//! derived lazily once every segment has reported one, and noisy or
//! post-abort updates are dropped rather than forwarded.

use std::collections::HashMap;

/// A single aggregated progress event ready to hand to the reply channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub received: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct SegmentProgress {
    received: u64,
    total: u64,
}

/// Per-task progress state. One instance per running download.
#[derive(Debug)]
pub struct ProgressAggregator {
    segment_count: usize,
    per_segment: HashMap<usize, SegmentProgress>,
    aggregate_received: u64,
    aggregate_total: u64,
    /// Set once `aggregate_total` has been fixed from a known content length.
    total_known_upfront: bool,
    aborted: bool,
}

impl ProgressAggregator {
    /// `total_upfront`: the resource's total size if known from the HEAD probe.
    pub fn new(segment_count: usize, total_upfront: Option<u64>) -> Self {
        let total_known_upfront = total_upfront.map(|t| t > 0).unwrap_or(false);
        Self {
            segment_count,
            per_segment: HashMap::new(),
            aggregate_received: 0,
            aggregate_total: total_upfront.filter(|t| *t > 0).unwrap_or(0),
            total_known_upfront,
            aborted: false,
        }
    }

    /// Marks the aggregator as aborted; further updates are dropped (spec §4.5).
    pub fn set_aborted(&mut self) {
        self.aborted = true;
    }

    /// Feeds one segment's `(received, total)` update. Returns `Some(event)`
    /// only when the update should be forwarded to the reply channel.
    pub fn apply(&mut self, index: usize, received: i64, total: i64) -> Option<ProgressEvent> {
        if self.aborted {
            return None;
        }
        if received <= 0 || total <= 0 {
            return None;
        }
        let received = received as u64;
        let total = total as u64;

        let entry = self.per_segment.entry(index).or_default();
        let delta = received.saturating_sub(entry.received);
        entry.received = received;
        entry.total = total;

        if delta == 0 {
            return None;
        }
        self.aggregate_received += delta;

        if !self.total_known_upfront && self.aggregate_total == 0 {
            self.maybe_derive_total_lazily();
        }

        if self.aggregate_total == 0 {
            return None;
        }

        Some(ProgressEvent {
            received: self.aggregate_received,
            total: self.aggregate_total,
        })
    }

    fn maybe_derive_total_lazily(&mut self) {
        if self.per_segment.len() < self.segment_count {
            return;
        }
        if self.per_segment.values().any(|s| s.total == 0) {
            return;
        }
        self.aggregate_total = self.per_segment.values().map(|s| s.total).sum();
    }

    pub fn aggregate_received(&self) -> u64 {
        self.aggregate_received
    }

    pub fn aggregate_total(&self) -> u64 {
        self.aggregate_total
    }
}

/// Snapshot of download progress suitable for CLI display (rate, ETA).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    pub bytes_done: u64,
    pub total_bytes: u64,
    pub elapsed_secs: f64,
    pub segments_done: usize,
    pub segment_count: usize,
}

impl ProgressStats {
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}
