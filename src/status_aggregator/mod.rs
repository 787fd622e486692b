//! StatusAggregator - Single Source of Truth for Monitoring State
//!
//! ## Responsibilities
//!
//! - Hold the one authoritative monitoring record
//! - Whole-record updates under a single write section
//! - Consistent snapshots for readers, countdown derived at read time
//!
//! Only the Monitoring Cycle writes (`update` is crate-private); camera
//! liveness is read from the Frame Store when a snapshot is taken.

mod types;

pub use types::*;

use crate::ai_client::AnalysisVerdict;
use crate::frame_store::FrameStore;
use crate::monitoring_cycle::Schedule;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Cycles failing in a row before the process is reported as degraded
pub const DEGRADED_AFTER_FAILURES: u32 = 3;

/// Writer-side monitoring record
#[derive(Debug, Clone)]
pub struct MonitoringRecord {
    /// Bumped by every `start()`; stale loops discard their results
    pub session: u64,
    pub is_running: bool,
    pub is_monitoring_active: bool,
    pub is_paused: bool,
    pub interval_seconds: u64,
    pub schedule: Schedule,
    pub process_status: ProcessStatus,
    pub print_status: PrintStatus,
    /// Print status to restore on resume
    pub print_status_before_pause: Option<PrintStatus>,
    pub print_progress: u8,
    pub failure_detected: bool,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub analysis_count: u64,
    pub success_count: u64,
    pub last_verdict: Option<AnalysisVerdict>,
    pub last_analysis_time: Option<DateTime<Utc>>,
    pub capture_failures: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl MonitoringRecord {
    /// Defaults at process start
    pub fn new(interval_seconds: u64) -> Self {
        Self {
            session: 0,
            is_running: false,
            is_monitoring_active: false,
            is_paused: false,
            interval_seconds,
            schedule: Schedule::default(),
            process_status: ProcessStatus::Idle,
            print_status: PrintStatus::Idle,
            print_status_before_pause: None,
            print_progress: 0,
            failure_detected: false,
            last_failure_time: None,
            analysis_count: 0,
            success_count: 0,
            last_verdict: None,
            last_analysis_time: None,
            capture_failures: 0,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    /// Record a failed cycle (capture or analysis)
    pub fn note_failure(&mut self, message: impl Into<String>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(message.into());
    }

    /// Idle or degraded, depending on recent failures
    pub fn resting_status(&self) -> ProcessStatus {
        if self.consecutive_failures >= DEGRADED_AFTER_FAILURES {
            ProcessStatus::Degraded
        } else {
            ProcessStatus::Idle
        }
    }

    /// Build the reader view at `now`
    pub fn to_state(&self, now: Instant, now_utc: DateTime<Utc>, camera_active: bool) -> MonitoringState {
        let next_capture_at = if self.is_running && !self.is_paused {
            self.schedule
                .remaining(now)
                .and_then(|d| chrono::Duration::from_std(d).ok())
                .map(|d| now_utc + d)
        } else {
            None
        };

        MonitoringState {
            is_running: self.is_running,
            is_monitoring_active: self.is_monitoring_active,
            is_paused: self.is_paused,
            interval_seconds: self.interval_seconds,
            countdown_seconds: if self.is_running {
                self.schedule.countdown_seconds(now)
            } else {
                0
            },
            process_status: self.process_status,
            print_status: self.print_status,
            print_progress: self.print_progress,
            failure_detected: self.failure_detected,
            last_failure_time: self.last_failure_time,
            analysis_count: self.analysis_count,
            success_count: self.success_count,
            last_verdict: self.last_verdict.clone(),
            last_analysis_time: self.last_analysis_time,
            next_capture_at,
            camera_active,
            capture_failures: self.capture_failures,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
        }
    }
}

/// StatusAggregator instance
pub struct StatusAggregator {
    record: RwLock<MonitoringRecord>,
    frames: Arc<FrameStore>,
}

impl StatusAggregator {
    /// Create new StatusAggregator
    pub fn new(interval_seconds: u64, frames: Arc<FrameStore>) -> Self {
        Self {
            record: RwLock::new(MonitoringRecord::new(interval_seconds)),
            frames,
        }
    }

    /// Consistent copy of the current state
    pub async fn snapshot(&self) -> MonitoringState {
        let record = self.record.read().await;
        record.to_state(Instant::now(), Utc::now(), self.frames.is_live())
    }

    /// Writer-side copy of the record
    pub(crate) async fn record(&self) -> MonitoringRecord {
        self.record.read().await.clone()
    }

    /// Apply `f` to a copy of the record and swap it in
    ///
    /// `f` must not perform I/O; it runs inside the write section.
    pub(crate) async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut MonitoringRecord) -> R,
    {
        let mut guard = self.record.write().await;
        let mut next = guard.clone();
        let out = f(&mut next);
        *guard = next;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn aggregator() -> StatusAggregator {
        StatusAggregator::new(30, Arc::new(FrameStore::default()))
    }

    #[tokio::test]
    async fn test_initial_snapshot() {
        let status = aggregator().snapshot().await;
        assert!(!status.is_running);
        assert_eq!(status.interval_seconds, 30);
        assert_eq!(status.countdown_seconds, 0);
        assert_eq!(status.process_status, ProcessStatus::Idle);
        assert_eq!(status.print_status, PrintStatus::Idle);
        assert!(status.last_verdict.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_is_derived_from_schedule() {
        let agg = aggregator();
        agg.update(|r| {
            r.is_running = true;
            r.schedule.start(Instant::now(), Duration::from_secs(10));
        })
        .await;

        assert_eq!(agg.snapshot().await.countdown_seconds, 10);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(agg.snapshot().await.countdown_seconds, 6);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(agg.snapshot().await.countdown_seconds, 0);
    }

    #[tokio::test]
    async fn test_update_is_whole_record() {
        let agg = aggregator();
        let count = agg
            .update(|r| {
                r.analysis_count += 1;
                r.success_count += 1;
                r.analysis_count
            })
            .await;
        assert_eq!(count, 1);

        let status = agg.snapshot().await;
        assert_eq!(status.analysis_count, 1);
        assert_eq!(status.success_count, 1);
    }

    #[test]
    fn test_degraded_after_repeated_failures() {
        let mut record = MonitoringRecord::new(30);
        for _ in 0..DEGRADED_AFTER_FAILURES {
            assert_eq!(record.resting_status(), ProcessStatus::Idle);
            record.note_failure("capture timed out");
        }
        assert_eq!(record.resting_status(), ProcessStatus::Degraded);
        assert_eq!(record.last_error.as_deref(), Some("capture timed out"));
    }

    #[tokio::test]
    async fn test_snapshot_reports_liveness() {
        let frames = Arc::new(FrameStore::default());
        let agg = StatusAggregator::new(30, frames.clone());
        assert!(!agg.snapshot().await.camera_active);
        frames.set_live(true);
        assert!(agg.snapshot().await.camera_active);
    }
}
