//! Queue metrics for observability
//!
//! # Metrics
//!
//! - `queue_tasks_completed_total` - Tasks that reached a terminal outcome
//! - `queue_tasks_rejected_total` - Synchronous rejections returned to callers
//! - `queue_retries_total` - Re-queued attempts
//! - `queue_dead_letters_total` - Tasks moved to the dead-letter log
//! - `queue_depth` - Tasks waiting in the priority heap

use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for the task queue
#[derive(Clone)]
pub struct QueueMetrics {
    /// Tasks completed (success or terminal failure)
    pub tasks_completed: IntCounter,

    /// Synchronous rejections
    pub tasks_rejected: IntCounter,

    /// Re-queued attempts
    pub retries: IntCounter,

    /// Dead-lettered tasks
    pub dead_letters: IntCounter,

    /// Current heap depth
    pub depth: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for QueueMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueMetrics").finish_non_exhaustive()
    }
}

impl QueueMetrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let tasks_completed = IntCounter::with_opts(Opts::new(
            "queue_tasks_completed_total",
            "Tasks that reached a terminal outcome",
        ))?;
        registry.register(Box::new(tasks_completed.clone()))?;

        let tasks_rejected = IntCounter::with_opts(Opts::new(
            "queue_tasks_rejected_total",
            "Synchronous rejections returned to callers",
        ))?;
        registry.register(Box::new(tasks_rejected.clone()))?;

        let retries = IntCounter::with_opts(Opts::new(
            "queue_retries_total",
            "Re-queued attempts",
        ))?;
        registry.register(Box::new(retries.clone()))?;

        let dead_letters = IntCounter::with_opts(Opts::new(
            "queue_dead_letters_total",
            "Tasks moved to the dead-letter log",
        ))?;
        registry.register(Box::new(dead_letters.clone()))?;

        let depth = IntGauge::with_opts(Opts::new(
            "queue_depth",
            "Tasks waiting in the priority heap",
        ))?;
        registry.register(Box::new(depth.clone()))?;

        Ok(Self {
            tasks_completed,
            tasks_rejected,
            retries,
            dead_letters,
            depth,
            registry,
        })
    }

    /// Record a completed task
    pub fn record_completed(&self) {
        self.tasks_completed.inc();
    }

    /// Record a synchronous rejection
    pub fn record_rejected(&self) {
        self.tasks_rejected.inc();
    }

    /// Record a re-queued attempt
    pub fn record_retry(&self) {
        self.retries.inc();
    }

    /// Record a dead-lettered task
    pub fn record_dead_letter(&self) {
        self.dead_letters.inc();
    }

    /// Update the heap depth gauge
    pub fn set_depth(&self, depth: usize) {
        self.depth.set(depth as i64);
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create queue metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = QueueMetrics::new().unwrap();
        assert_eq!(metrics.tasks_completed.get(), 0);
        assert_eq!(metrics.dead_letters.get(), 0);
    }

    #[test]
    fn test_counters() {
        let metrics = QueueMetrics::new().unwrap();
        metrics.record_completed();
        metrics.record_retry();
        metrics.record_retry();
        metrics.set_depth(7);

        assert_eq!(metrics.tasks_completed.get(), 1);
        assert_eq!(metrics.retries.get(), 2);
        assert_eq!(metrics.depth.get(), 7);
    }
}
