//! Atomic loop counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::LoopSnapshot;

/// Counters shared between the control loop and observers.
///
/// All updates use relaxed ordering; a snapshot is a consistent view of each
/// counter, not of the set.
#[derive(Debug)]
pub struct LoopMetrics {
    started: Instant,
    ticks: AtomicU64,
    overruns: AtomicU64,
    skipped_ticks: AtomicU64,
    fingers_matched: AtomicU64,
    key_downs: AtomicU64,
    key_ups: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    signals_received: AtomicU64,
}

impl Default for LoopMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            ticks: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            fingers_matched: AtomicU64::new(0),
            key_downs: AtomicU64::new(0),
            key_ups: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            signals_received: AtomicU64::new(0),
        }
    }

    pub fn tick_completed(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// The tick took longer than the period.
    pub fn tick_overran(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    /// The tick's work was skipped (no frames, bad frame size, ...).
    pub fn tick_skipped(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fingers_matched(&self, count: usize) {
        self.fingers_matched.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn key_down(&self) {
        self.key_downs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn key_up(&self) {
        self.key_ups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn signal_received(&self) {
        self.signals_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoopSnapshot {
        LoopSnapshot {
            uptime: self.started.elapsed(),
            ticks: self.ticks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            fingers_matched: self.fingers_matched.load(Ordering::Relaxed),
            key_downs: self.key_downs.load(Ordering::Relaxed),
            key_ups: self.key_ups.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            signals_received: self.signals_received.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_metrics_are_zero() {
        let snapshot = LoopMetrics::new().snapshot();
        assert_eq!(snapshot.ticks, 0);
        assert_eq!(snapshot.key_downs, 0);
        assert_eq!(snapshot.frames_dropped, 0);
    }

    #[test]
    fn test_counters() {
        let metrics = LoopMetrics::new();
        metrics.tick_completed();
        metrics.tick_completed();
        metrics.tick_overran();
        metrics.tick_skipped();
        metrics.fingers_matched(3);
        metrics.key_down();
        metrics.key_up();
        metrics.frame_sent();
        metrics.frame_dropped();
        metrics.signal_received();

        let s = metrics.snapshot();
        assert_eq!(s.ticks, 2);
        assert_eq!(s.overruns, 1);
        assert_eq!(s.skipped_ticks, 1);
        assert_eq!(s.fingers_matched, 3);
        assert_eq!(s.key_downs, 1);
        assert_eq!(s.key_ups, 1);
        assert_eq!(s.frames_sent, 1);
        assert_eq!(s.frames_dropped, 1);
        assert_eq!(s.signals_received, 1);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(LoopMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.tick_completed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().ticks, 4000);
    }
}
