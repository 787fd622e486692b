//! Print Watchdog Library
//!
//! Watches a 3D print through a camera, periodically asks an image-analysis
//! service whether it looks healthy, and publishes a consistent status.
//!
//! ## Architecture (leaf-first)
//!
//! 1. FrameStore - latest live frame + liveness
//! 2. CameraGateway - exclusive camera lease, capture, preview worker
//! 3. AIClient - analysis request, retry policy, verdict classification
//! 4. MonitoringCycle - start/stop/pause/resume, timed capture/analyze loop
//! 5. StatusAggregator - single source of truth, atomic snapshots
//! 6. HistoryLog - append-only results with images
//! 7. AlertService - Discord failure alerts
//! 8. ConfigStore - AI settings file
//! 9. WebAPI - thin REST layer
//!
//! ## Design Principles
//!
//! - SSoT: StatusAggregator is the single source of truth for state
//! - One writer: only the MonitoringCycle mutates monitoring state
//! - No I/O under shared-state locks

pub mod ai_client;
pub mod alert_service;
pub mod camera_gateway;
pub mod config_store;
pub mod error;
pub mod frame_store;
pub mod history_log;
pub mod models;
pub mod monitoring_cycle;
pub mod state;
pub mod status_aggregator;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
