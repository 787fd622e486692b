//! FrameStore - Latest Camera Frame
//!
//! ## Responsibilities
//!
//! - Hold the single most recent frame (no history)
//! - Report absent frames when nothing was captured yet or the frame is stale
//! - Camera liveness flag
//! - Change notifications for streaming readers
//!
//! Writers replace the whole frame; the internal lock is held only for the swap.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Default age after which a frame is reported as absent
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10);

/// Encoded camera frame (JPEG bytes) and its capture time
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded image bytes, shared between readers
    pub data: Arc<Vec<u8>>,
    /// Wall-clock capture time
    pub captured_at: DateTime<Utc>,
    /// Monotonic capture time used for staleness
    captured_instant: Instant,
}

impl Frame {
    /// Wrap freshly captured bytes
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            captured_at: Utc::now(),
            captured_instant: Instant::now(),
        }
    }

    /// Time elapsed since capture
    pub fn age(&self) -> Duration {
        self.captured_instant.elapsed()
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// FrameStore instance
pub struct FrameStore {
    latest: watch::Sender<Option<Frame>>,
    live: AtomicBool,
    max_age: Duration,
}

impl FrameStore {
    /// Create new FrameStore with a staleness threshold
    pub fn new(max_age: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest,
            live: AtomicBool::new(false),
            max_age,
        }
    }

    /// Replace the current frame
    pub fn put(&self, frame: Frame) {
        tracing::trace!(size = frame.len(), "Frame stored");
        self.latest.send_replace(Some(frame));
    }

    /// Latest frame, or `None` if never captured or older than the threshold
    pub fn get(&self) -> Option<Frame> {
        let frame = self.latest.borrow().clone()?;
        if frame.age() > self.max_age {
            return None;
        }
        Some(frame)
    }

    /// Receiver notified on every `put`, for continuous streaming
    pub fn subscribe(&self) -> watch::Receiver<Option<Frame>> {
        self.latest.subscribe()
    }

    /// Update camera liveness
    pub fn set_live(&self, live: bool) {
        let prev = self.live.swap(live, Ordering::SeqCst);
        if prev != live {
            tracing::info!(camera_active = live, "Camera liveness changed");
        }
    }

    /// Whether the camera produced frames recently
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}
