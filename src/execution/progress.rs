//! Progress tracking and cancellation for streaming writes.

use crate::core::error::NodeId;
use crate::core::region::Region;
use crossbeam::channel::{self, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A progress update event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// A write has started.
    Started { total_partitions: usize },
    /// A partition has started processing.
    PartitionStarted {
        index: usize,
        total: usize,
        region: Region,
    },
    /// A partition has been written.
    PartitionCompleted {
        index: usize,
        total: usize,
        duration_ms: u64,
    },
    /// Overall progress in `[0, 1]`.
    Progress {
        fraction: f64,
        elapsed_ms: u64,
        estimated_remaining_ms: Option<u64>,
    },
    /// The write has completed.
    Completed {
        total_duration_ms: u64,
        partitions: usize,
    },
    /// The write stopped at a partition boundary after a cancellation request.
    Aborted { completed: usize, total: usize },
    /// An error occurred.
    Error {
        node_id: Option<NodeId>,
        message: String,
    },
}

/// Callback type for progress updates.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Create a one-way progress channel.
///
/// The callback never blocks; updates sent after the receiver is dropped are
/// discarded.
pub fn progress_channel() -> (ProgressCallback, Receiver<ProgressUpdate>) {
    let (sender, receiver) = channel::unbounded();
    let callback: ProgressCallback = Arc::new(move |update| {
        let _ = sender.send(update);
    });
    (callback, receiver)
}

/// Cooperative cancellation flag, polled between partitions.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the token can be reused.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Tracks partition progress of one write.
///
/// Reported fractions never decrease, and 1.0 is only reported by
/// [`ProgressTracker::complete`].
pub struct ProgressTracker {
    /// Total number of partitions.
    total: usize,
    /// Number of partitions written.
    completed: AtomicU64,
    /// Last fraction sent, as f64 bits.
    last_fraction: AtomicU64,
    /// Start time.
    start_time: Option<Instant>,
    /// Progress callback.
    callback: Option<ProgressCallback>,
    /// Partition durations for estimation.
    partition_times: parking_lot::Mutex<Vec<u64>>,
}

impl ProgressTracker {
    /// Create a new progress tracker.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicU64::new(0),
            last_fraction: AtomicU64::new(0f64.to_bits()),
            start_time: None,
            callback: None,
            partition_times: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Set a callback for progress updates.
    pub fn with_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Start tracking.
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
        self.send_update(ProgressUpdate::Started {
            total_partitions: self.total,
        });
    }

    /// Report that partition `index` has started.
    pub fn partition_started(&self, index: usize, region: Region) {
        self.send_update(ProgressUpdate::PartitionStarted {
            index,
            total: self.total,
            region,
        });
    }

    /// Report fractional progress `partial` of partition `index`.
    pub fn partition_progress(&self, index: usize, partial: f64) {
        if self.total == 0 {
            return;
        }
        let fraction = (index as f64 + partial.clamp(0.0, 1.0)) / self.total as f64;
        self.advance(fraction);
    }

    /// Report that partition `index` has been written.
    pub fn partition_completed(&self, index: usize, duration_ms: u64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.partition_times.lock().push(duration_ms);
        self.send_update(ProgressUpdate::PartitionCompleted {
            index,
            total: self.total,
            duration_ms,
        });
        self.partition_progress(index, 1.0);
    }

    /// Number of partitions written so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed) as usize
    }

    /// Last fraction reported.
    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.last_fraction.load(Ordering::Relaxed))
    }

    /// Force progress to 1.0 and fire the completion event.
    pub fn complete(&self) {
        self.last_fraction.store(1f64.to_bits(), Ordering::Relaxed);
        self.send_update(ProgressUpdate::Progress {
            fraction: 1.0,
            elapsed_ms: self.elapsed_ms(),
            estimated_remaining_ms: Some(0),
        });
        self.send_update(ProgressUpdate::Completed {
            total_duration_ms: self.elapsed_ms(),
            partitions: self.completed(),
        });
    }

    /// Report that the write stopped early.
    pub fn abort(&self) {
        self.send_update(ProgressUpdate::Aborted {
            completed: self.completed(),
            total: self.total,
        });
    }

    /// Report an error.
    pub fn report_error(&self, node_id: Option<NodeId>, message: String) {
        self.send_update(ProgressUpdate::Error { node_id, message });
    }

    /// Estimate remaining time in milliseconds.
    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        let times = self.partition_times.lock();
        if times.is_empty() {
            return None;
        }

        let avg_time: u64 = times.iter().sum::<u64>() / times.len() as u64;
        let remaining = self.total.saturating_sub(self.completed());
        Some(avg_time * remaining as u64)
    }

    fn advance(&self, fraction: f64) {
        // 1.0 belongs to complete().
        if fraction >= 1.0 || fraction <= self.fraction() {
            return;
        }
        self.last_fraction.store(fraction.to_bits(), Ordering::Relaxed);
        self.send_update(ProgressUpdate::Progress {
            fraction,
            elapsed_ms: self.elapsed_ms(),
            estimated_remaining_ms: self.estimated_remaining_ms(),
        });
    }

    fn elapsed_ms(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn send_update(&self, update: ProgressUpdate) {
        if let Some(ref callback) = self.callback {
            callback(update);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fractions(updates: &[ProgressUpdate]) -> Vec<f64> {
        updates
            .iter()
            .filter_map(|u| match u {
                ProgressUpdate::Progress { fraction, .. } => Some(*fraction),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_fraction_is_monotonic_and_capped() {
        let (callback, receiver) = progress_channel();
        let mut tracker = ProgressTracker::new(4).with_callback(Some(callback));
        tracker.start();

        tracker.partition_progress(0, 0.5);
        tracker.partition_progress(0, 0.25);
        tracker.partition_completed(0, 1);
        tracker.partition_completed(3, 1);
        assert_eq!(tracker.fraction(), 0.25);

        tracker.complete();
        let values = fractions(&receiver.try_iter().collect::<Vec<_>>());
        assert_eq!(values, vec![0.125, 0.25, 1.0]);
    }

    #[test]
    fn test_abort_reports_counts() {
        let (callback, receiver) = progress_channel();
        let tracker = ProgressTracker::new(3).with_callback(Some(callback));
        tracker.partition_completed(0, 5);
        tracker.abort();

        let updates: Vec<_> = receiver.try_iter().collect();
        assert!(updates.contains(&ProgressUpdate::Aborted {
            completed: 1,
            total: 3
        }));
        assert!(!fractions(&updates).contains(&1.0));
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn test_channel_survives_dropped_receiver() {
        let (callback, receiver) = progress_channel();
        drop(receiver);
        callback(ProgressUpdate::Started { total_partitions: 1 });
    }

    #[test]
    fn test_estimated_remaining() {
        let tracker = ProgressTracker::new(4);
        assert_eq!(tracker.estimated_remaining_ms(), None);
        tracker.partition_completed(0, 10);
        tracker.partition_completed(1, 30);
        assert_eq!(tracker.estimated_remaining_ms(), Some(40));
    }
}
