//! Monitoring state types

use crate::ai_client::AnalysisVerdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the monitoring loop is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    #[default]
    Idle,
    Capturing,
    Analyzing,
    /// Several cycles in a row failed
    Degraded,
}

/// Print condition as last judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrintStatus {
    #[default]
    Idle,
    Printing,
    Paused,
    Completed,
    Failed,
    Warning,
}

impl PrintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrintStatus::Idle => "idle",
            PrintStatus::Printing => "printing",
            PrintStatus::Paused => "paused",
            PrintStatus::Completed => "completed",
            PrintStatus::Failed => "failed",
            PrintStatus::Warning => "warning",
        }
    }
}

/// Consistent copy of the monitoring state handed to readers
///
/// `countdown_seconds` is derived from the schedule at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringState {
    pub is_running: bool,
    pub is_monitoring_active: bool,
    pub is_paused: bool,
    pub interval_seconds: u64,
    pub countdown_seconds: u64,
    pub process_status: ProcessStatus,
    pub print_status: PrintStatus,
    pub print_progress: u8,
    pub failure_detected: bool,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub analysis_count: u64,
    pub success_count: u64,
    pub last_verdict: Option<AnalysisVerdict>,
    pub last_analysis_time: Option<DateTime<Utc>>,
    pub next_capture_at: Option<DateTime<Utc>>,
    pub camera_active: bool,
    pub capture_failures: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}
