//! PreviewWorker - continuous low-resolution frames
//!
//! Keeps the Frame Store fed for the live-feed and streaming endpoints and
//! reports camera liveness. Never waits for the camera: a busy lease skips
//! the frame.

use super::{CameraError, CameraGateway, LeasePurpose, Resolution};
use crate::frame_store::FrameStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Pause between preview frames (roughly 2-3 fps with capture time)
const DEFAULT_FRAME_INTERVAL_MS: u64 = 400;

/// PreviewWorker instance
pub struct PreviewWorker {
    gateway: Arc<CameraGateway>,
    frames: Arc<FrameStore>,
    frame_interval: Duration,
    running: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PreviewWorker {
    /// Create new PreviewWorker
    pub fn new(gateway: Arc<CameraGateway>, frames: Arc<FrameStore>) -> Self {
        Self::with_interval(gateway, frames, Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS))
    }

    /// Create with a custom frame interval
    pub fn with_interval(
        gateway: Arc<CameraGateway>,
        frames: Arc<FrameStore>,
        frame_interval: Duration,
    ) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            gateway,
            frames,
            frame_interval,
            running,
            handle: Mutex::new(None),
        }
    }

    /// Start the preview loop
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if *self.running.borrow() {
            tracing::warn!("Preview already running");
            return;
        }
        self.running.send_replace(true);

        let gateway = self.gateway.clone();
        let frames = self.frames.clone();
        let frame_interval = self.frame_interval;
        let mut running = self.running.subscribe();

        *handle = Some(tokio::spawn(async move {
            tracing::info!("Preview worker started");
            let mut frame_count: u64 = 0;

            while *running.borrow_and_update() {
                if let Ok(lease) = gateway.try_acquire(LeasePurpose::Preview) {
                    match gateway.capture_now(&lease, Resolution::PREVIEW).await {
                        Ok(frame) => {
                            frames.put(frame);
                            frames.set_live(true);
                            frame_count += 1;
                            if frame_count % 50 == 0 {
                                tracing::debug!(frames = frame_count, "Preview frames captured");
                            }
                        }
                        Err(CameraError::DeviceUnavailable(_)) => frames.set_live(false),
                        Err(_) => {}
                    }
                    gateway.release(lease);
                }

                tokio::select! {
                    _ = tokio::time::sleep(frame_interval) => {}
                    _ = running.changed() => {}
                }
            }

            tracing::info!(frames = frame_count, "Preview worker stopped");
        }));
    }

    /// Stop the preview loop and wait for the in-flight frame
    pub async fn stop(&self) {
        self.running.send_replace(false);
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Preview worker task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::FakeCamera;
    use super::*;

    #[tokio::test]
    async fn test_preview_feeds_frame_store() {
        let camera = Arc::new(FakeCamera::new());
        let gateway = Arc::new(CameraGateway::new(camera.clone()));
        let frames = Arc::new(FrameStore::default());
        let worker =
            PreviewWorker::with_interval(gateway.clone(), frames.clone(), Duration::from_millis(5));

        worker.start().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        worker.stop().await;

        assert!(frames.get().is_some());
        assert!(frames.is_live());
        assert!(camera.capture_count() > 1);
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn test_preview_skips_when_busy() {
        let camera = Arc::new(FakeCamera::new());
        let gateway = Arc::new(CameraGateway::new(camera.clone()));
        let frames = Arc::new(FrameStore::default());
        let worker =
            PreviewWorker::with_interval(gateway.clone(), frames.clone(), Duration::from_millis(5));

        let held = gateway.acquire(LeasePurpose::Manual).await.unwrap();
        worker.start().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(camera.capture_count(), 0);
        assert!(frames.get().is_none());

        drop(held);
        tokio::time::sleep(Duration::from_millis(40)).await;
        worker.stop().await;
        assert!(camera.capture_count() > 0);
    }

    #[tokio::test]
    async fn test_missing_device_clears_liveness() {
        let camera = Arc::new(FakeCamera::new());
        camera.set_unavailable(true);
        let gateway = Arc::new(CameraGateway::new(camera.clone()));
        let frames = Arc::new(FrameStore::default());
        frames.set_live(true);
        let worker =
            PreviewWorker::with_interval(gateway.clone(), frames.clone(), Duration::from_millis(5));

        worker.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        worker.stop().await;

        assert!(!frames.is_live());
        assert!(gateway.capture_failures() > 0);
    }
}
