//! Application state
//!
//! Holds all shared components and state

use crate::ai_client::{Analyzer, DEFAULT_API_URL};
use crate::alert_service::AlertService;
use crate::camera_gateway::{CameraBackend, CameraGateway, PreviewWorker, DEFAULT_COMMAND};
use crate::config_store::ConfigStore;
use crate::error::Result;
use crate::frame_store::FrameStore;
use crate::history_log::HistoryLog;
use crate::monitoring_cycle::MonitoringCycle;
use crate::status_aggregator::StatusAggregator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Analysis service API key
    pub gemini_api_key: Option<String>,
    /// Analysis service endpoint
    pub gemini_api_url: String,
    /// AI settings file (prompt, sampling, timeouts, keywords)
    pub ai_config_path: PathBuf,
    /// History index and images
    pub history_dir: PathBuf,
    /// Discord webhook for failure alerts
    pub discord_webhook_url: Option<String>,
    /// Minimum minutes between failure alerts
    pub alert_cooldown_minutes: u64,
    /// Still-capture command
    pub camera_command: String,
    /// Age after which the live frame is reported as absent
    pub frame_stale_secs: u64,
    /// Dashboard static files (served at `/` when set)
    pub static_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_api_url: std::env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            ai_config_path: std::env::var("AI_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ai_config.json")),
            history_dir: std::env::var("HISTORY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ai_history")),
            discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL").ok(),
            alert_cooldown_minutes: std::env::var("ALERT_COOLDOWN_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            camera_command: std::env::var("CAMERA_COMMAND")
                .unwrap_or_else(|_| DEFAULT_COMMAND.to_string()),
            frame_stale_secs: std::env::var("FRAME_STALE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            static_dir: std::env::var("STATIC_DIR").ok().map(PathBuf::from),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// ConfigStore (AI settings)
    pub config_store: Arc<ConfigStore>,
    /// FrameStore (latest live frame)
    pub frames: Arc<FrameStore>,
    /// CameraGateway (camera lease)
    pub gateway: Arc<CameraGateway>,
    /// PreviewWorker (live feed)
    pub preview: Arc<PreviewWorker>,
    /// MonitoringCycle (scheduler + status)
    pub monitoring: Arc<MonitoringCycle>,
    /// HistoryLog
    pub history: Arc<HistoryLog>,
    /// AlertService (Discord)
    pub alerts: Arc<AlertService>,
    /// Process start
    pub started_at: Instant,
}

impl AppState {
    /// Wire all components around a camera backend and an analyzer
    pub async fn build(
        config: AppConfig,
        backend: Arc<dyn CameraBackend>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<Self> {
        let config_store = Arc::new(ConfigStore::load(config.ai_config_path.clone()).await);
        let ai_config = config_store.get().await;

        let frames = Arc::new(FrameStore::new(Duration::from_secs(config.frame_stale_secs)));
        let gateway = Arc::new(CameraGateway::new(backend));
        let preview = Arc::new(PreviewWorker::new(gateway.clone(), frames.clone()));
        let status = Arc::new(StatusAggregator::new(
            ai_config.monitoring_settings.default_interval_seconds,
            frames.clone(),
        ));
        let history = Arc::new(HistoryLog::open(config.history_dir.clone()).await?);
        let alerts = Arc::new(AlertService::new(
            config.discord_webhook_url.clone(),
            config.alert_cooldown_minutes,
        )?);

        let monitoring = Arc::new(MonitoringCycle::new(
            gateway.clone(),
            analyzer,
            frames.clone(),
            status,
            history.clone(),
            config_store.clone(),
            Some(alerts.clone()),
        ));

        Ok(Self {
            config,
            config_store,
            frames,
            gateway,
            preview,
            monitoring,
            history,
            alerts,
            started_at: Instant::now(),
        })
    }
}
