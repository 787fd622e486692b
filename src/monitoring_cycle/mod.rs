//! MonitoringCycle - Timer-Driven Capture/Analyze Loop
//!
//! ## Responsibilities
//!
//! - start/stop/pause/resume state machine
//! - Wait for the scheduled deadline, capture, analyze, record, reschedule
//! - Manual on-demand capture
//!
//! ## Design
//!
//! - One cycle at a time; the camera is a singleton
//! - The lease is held only while capturing
//! - `stop()` cancels the wait; an in-flight capture/analysis finishes on
//!   its own timeout
//! - Per-cycle failures never stop the loop

mod schedule;

pub use schedule::Schedule;

use crate::ai_client::{AnalysisVerdict, Analyzer};
use crate::alert_service::AlertService;
use crate::camera_gateway::{CameraError, CameraGateway, LeasePurpose, Resolution};
use crate::config_store::ConfigStore;
use crate::error::{Error, Result};
use crate::frame_store::{Frame, FrameStore};
use crate::history_log::HistoryLog;
use crate::status_aggregator::{
    MonitoringRecord, MonitoringState, PrintStatus, ProcessStatus, StatusAggregator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

/// Extra wait beyond one preview frame for scheduled and manual leases
const ACQUIRE_SLACK: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Running,
    Paused,
    Stopped,
}

/// Shared by the controller and its loop
struct CycleContext {
    gateway: Arc<CameraGateway>,
    analyzer: Arc<dyn Analyzer>,
    frames: Arc<FrameStore>,
    status: Arc<StatusAggregator>,
    history: Arc<HistoryLog>,
    config: Arc<ConfigStore>,
    alerts: Option<Arc<AlertService>>,
    acquire_wait: Duration,
}

/// MonitoringCycle instance
pub struct MonitoringCycle {
    ctx: Arc<CycleContext>,
    /// Control channel of the current session's loop; also serializes
    /// state transitions
    runner: Mutex<Option<watch::Sender<RunState>>>,
}

impl MonitoringCycle {
    /// Create new MonitoringCycle
    pub fn new(
        gateway: Arc<CameraGateway>,
        analyzer: Arc<dyn Analyzer>,
        frames: Arc<FrameStore>,
        status: Arc<StatusAggregator>,
        history: Arc<HistoryLog>,
        config: Arc<ConfigStore>,
        alerts: Option<Arc<AlertService>>,
    ) -> Self {
        Self {
            ctx: Arc::new(CycleContext {
                gateway,
                analyzer,
                frames,
                status,
                history,
                config,
                alerts,
                acquire_wait: Resolution::PREVIEW.timeout + ACQUIRE_SLACK,
            }),
            runner: Mutex::new(None),
        }
    }

    /// Current monitoring state
    pub async fn status(&self) -> MonitoringState {
        self.ctx.status.snapshot().await
    }

    /// Stopped -> Running
    ///
    /// Fails and stays stopped when the camera cannot be acquired. Counters
    /// are reset for the new session.
    pub async fn start(&self) -> Result<MonitoringState> {
        let mut runner = self.runner.lock().await;
        let ctx = &self.ctx;

        if ctx.status.record().await.is_running {
            tracing::debug!("Monitoring already running");
            return Ok(self.status().await);
        }

        let lease = ctx
            .gateway
            .acquire_within(LeasePurpose::Scheduled, ctx.acquire_wait)
            .await;
        let probe = match lease {
            Ok(lease) => {
                let result = ctx.gateway.probe(&lease).await;
                ctx.gateway.release(lease);
                result
            }
            Err(e) => Err(e),
        };
        if let Err(e) = probe {
            tracing::warn!(error = %e, "Cannot start monitoring");
            let message = e.to_string();
            ctx.status.update(|r| r.last_error = Some(message)).await;
            return Err(e.into());
        }

        let settings = ctx.config.get().await.monitoring_settings;
        let session = ctx
            .status
            .update(|r| {
                r.session += 1;
                r.is_running = true;
                r.is_monitoring_active = true;
                r.is_paused = false;
                r.interval_seconds = settings.clamp_interval(r.interval_seconds);
                r.analysis_count = 0;
                r.success_count = 0;
                r.consecutive_failures = 0;
                r.failure_detected = false;
                r.last_error = None;
                r.process_status = ProcessStatus::Idle;
                r.schedule
                    .start(Instant::now(), Duration::from_secs(r.interval_seconds));
                r.session
            })
            .await;

        let (control, rx) = watch::channel(RunState::Running);
        tokio::spawn(run_loop(ctx.clone(), session, rx));
        *runner = Some(control);

        let state = self.status().await;
        tracing::info!(
            session = session,
            interval_seconds = state.interval_seconds,
            "Monitoring started"
        );
        Ok(state)
    }

    /// Running/Paused -> Stopped
    ///
    /// History is kept. The pending wait is cancelled immediately.
    pub async fn stop(&self) -> Result<MonitoringState> {
        let mut runner = self.runner.lock().await;

        // The loop task is detached; an in-flight cycle completes on its own
        if let Some(control) = runner.take() {
            control.send_replace(RunState::Stopped);
        }

        let stopped = self
            .ctx
            .status
            .update(|r| {
                if !r.is_running {
                    return false;
                }
                r.is_running = false;
                r.is_monitoring_active = false;
                if r.is_paused {
                    r.is_paused = false;
                    if let Some(previous) = r.print_status_before_pause.take() {
                        r.print_status = previous;
                    }
                }
                r.schedule.clear();
                r.process_status = ProcessStatus::Idle;
                true
            })
            .await;

        if stopped {
            tracing::info!("Monitoring stopped");
        }
        Ok(self.status().await)
    }

    /// Running -> Paused; no-op when already paused
    pub async fn pause(&self) -> Result<MonitoringState> {
        let runner = self.runner.lock().await;

        let outcome = self
            .ctx
            .status
            .update(|r| {
                if !r.is_running {
                    return Err(Error::Conflict("Monitoring is not running".to_string()));
                }
                if r.is_paused {
                    return Ok(false);
                }
                r.is_paused = true;
                r.schedule.pause(Instant::now());
                r.print_status_before_pause = Some(r.print_status);
                r.print_status = PrintStatus::Paused;
                Ok(true)
            })
            .await?;

        if outcome {
            if let Some(control) = runner.as_ref() {
                control.send_replace(RunState::Paused);
            }
            tracing::info!("Monitoring paused");
        }
        Ok(self.status().await)
    }

    /// Paused -> Running with the remaining countdown; no-op when running
    pub async fn resume(&self) -> Result<MonitoringState> {
        let runner = self.runner.lock().await;

        let outcome = self
            .ctx
            .status
            .update(|r| {
                if !r.is_running {
                    return Err(Error::Conflict("Monitoring is not running".to_string()));
                }
                if !r.is_paused {
                    return Ok(false);
                }
                r.is_paused = false;
                r.schedule.resume(Instant::now());
                r.print_status = r.print_status_before_pause.take().unwrap_or(PrintStatus::Printing);
                Ok(true)
            })
            .await?;

        if outcome {
            if let Some(control) = runner.as_ref() {
                control.send_replace(RunState::Running);
            }
            tracing::info!("Monitoring resumed");
        }
        Ok(self.status().await)
    }

    /// Change the capture interval, clamped to the configured bounds
    ///
    /// Applies from the next schedule computation.
    pub async fn set_interval(&self, seconds: u64) -> Result<MonitoringState> {
        let settings = self.ctx.config.get().await.monitoring_settings;
        let clamped = settings.clamp_interval(seconds);
        if clamped != seconds {
            tracing::debug!(requested = seconds, clamped = clamped, "Interval clamped");
        }

        self.ctx.status.update(|r| r.interval_seconds = clamped).await;
        tracing::info!(interval_seconds = clamped, "Monitoring interval set");
        Ok(self.status().await)
    }

    /// High-resolution capture on demand, without analysis
    ///
    /// Waits out at most one in-flight preview frame, then reports `Busy`.
    pub async fn capture_manual(&self) -> Result<Frame> {
        let gateway = &self.ctx.gateway;
        let lease = gateway
            .acquire_within(LeasePurpose::Manual, self.ctx.acquire_wait)
            .await?;
        let result = gateway.capture_now(&lease, Resolution::CAPTURE).await;
        gateway.release(lease);

        let frame = result?;
        self.ctx.frames.put(frame.clone());
        tracing::info!(size = frame.len(), "Manual capture completed");
        Ok(frame)
    }

    /// Whether a monitoring session is active
    pub async fn is_running(&self) -> bool {
        self.ctx.status.record().await.is_running
    }
}

async fn run_loop(ctx: Arc<CycleContext>, session: u64, mut control: watch::Receiver<RunState>) {
    tracing::debug!(session = session, "Monitoring loop started");

    loop {
        let state = *control.borrow_and_update();
        match state {
            RunState::Stopped => break,
            RunState::Paused => {
                if control.changed().await.is_err() {
                    break;
                }
                continue;
            }
            RunState::Running => {}
        }

        let record = ctx.status.record().await;
        if record.session != session || !record.is_running {
            break;
        }
        let Some(deadline) = record.schedule.deadline() else {
            ctx.reschedule(session).await;
            continue;
        };

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            changed = control.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        // A transition raced the deadline; re-evaluate first
        if control.has_changed().unwrap_or(true) {
            continue;
        }

        ctx.run_cycle(session).await;
    }

    tracing::debug!(session = session, "Monitoring loop stopped");
}

impl CycleContext {
    async fn run_cycle(&self, session: u64) {
        let config = self.config.get().await;

        let Some(print_status) = self
            .status
            .update(|r| {
                (r.session == session && r.is_running).then(|| {
                    r.process_status = ProcessStatus::Capturing;
                    r.print_status
                })
            })
            .await
        else {
            return;
        };

        let frame = match self.capture_scheduled().await {
            Ok(frame) => frame,
            Err(e) => {
                self.skip_cycle(session, e).await;
                return;
            }
        };
        self.frames.put(frame.clone());

        self.status
            .update(|r| {
                if r.session == session {
                    r.process_status = ProcessStatus::Analyzing;
                }
            })
            .await;

        let verdict = self.analyzer.analyze(&frame.data, &config).await;

        if let Err(e) = self
            .history
            .append(verdict.clone(), print_status, Some(frame.data.as_slice()))
            .await
        {
            tracing::error!(error = %e, "Failed to record analysis history");
        }

        if let Some(alerts) = &self.alerts {
            alerts.spawn_failure_alert(verdict.clone(), Some(frame.data.to_vec()));
        }

        let capture_failures = self.gateway.capture_failures();
        self.status
            .update(|r| {
                if r.session != session {
                    return;
                }
                r.capture_failures = capture_failures;
                apply_verdict(r, &verdict);
                r.process_status = r.resting_status();
                reschedule(r);
            })
            .await;

        tracing::info!(
            session = session,
            succeeded = verdict.succeeded,
            binary_status = verdict.binary_status,
            duration_ms = verdict.duration_ms,
            "Monitoring cycle completed"
        );
    }

    async fn capture_scheduled(&self) -> std::result::Result<Frame, CameraError> {
        let lease = self
            .gateway
            .acquire_within(LeasePurpose::Scheduled, self.acquire_wait)
            .await?;
        let result = self.gateway.capture_now(&lease, Resolution::CAPTURE).await;
        self.gateway.release(lease);
        result
    }

    /// Busy or failed capture: no analysis, try again next interval
    async fn skip_cycle(&self, session: u64, error: CameraError) {
        let busy = matches!(error, CameraError::Busy { .. });
        if busy {
            tracing::debug!(error = %error, "Camera busy, skipping cycle");
        } else {
            tracing::warn!(error = %error, "Capture failed, skipping cycle");
        }

        let capture_failures = self.gateway.capture_failures();
        let message = error.to_string();
        self.status
            .update(|r| {
                if r.session != session {
                    return;
                }
                r.capture_failures = capture_failures;
                if !busy {
                    r.note_failure(message);
                }
                r.process_status = r.resting_status();
                reschedule(r);
            })
            .await;
    }

    async fn reschedule(&self, session: u64) {
        self.status
            .update(|r| {
                if r.session == session {
                    reschedule(r);
                }
            })
            .await;
    }
}

/// Next deadline one interval from now; paused sessions keep it frozen
fn reschedule(r: &mut MonitoringRecord) {
    if !r.is_running {
        return;
    }
    let now = Instant::now();
    r.schedule
        .reschedule(now, Duration::from_secs(r.interval_seconds));
    if r.is_paused {
        r.schedule.pause(now);
    }
}

fn apply_verdict(r: &mut MonitoringRecord, verdict: &AnalysisVerdict) {
    r.analysis_count += 1;
    r.last_analysis_time = Some(verdict.analyzed_at);

    if verdict.succeeded {
        r.success_count += 1;
        r.consecutive_failures = 0;
        r.last_error = None;
        r.print_progress = verdict.print_progress;

        if let Some(classified) = verdict.print_status {
            if r.is_paused {
                r.print_status_before_pause = Some(classified);
            } else {
                r.print_status = classified;
            }
        }

        r.failure_detected = verdict.binary_status == 0;
        if r.failure_detected {
            r.last_failure_time = Some(verdict.analyzed_at);
        }
    } else {
        let message = verdict
            .to_error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| verdict.free_text.clone());
        r.note_failure(message);
    }

    r.last_verdict = Some(verdict.clone());
}
