//! CameraGateway - Exclusive Camera Access
//!
//! ## Responsibilities
//!
//! - Single lease over the physical camera (preview, manual, scheduled)
//! - Fail-fast acquisition: a busy camera returns `Busy` instead of queueing
//! - Preview yields to pending manual/scheduled acquisitions
//! - Capture through a `CameraBackend` with typed errors
//! - Capture failure counter for observability
//!
//! The lease is released when the `CameraLease` is dropped.

mod preview;
mod rpicam;

pub use preview::PreviewWorker;
pub use rpicam::{RpicamBackend, DEFAULT_COMMAND};

use crate::frame_store::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default acquisition wait before reporting `Busy`
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 200;

/// Anything smaller is not a usable frame
pub const MIN_FRAME_BYTES: usize = 1000;

/// JPEG start-of-image marker
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Who is driving the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeasePurpose {
    /// Continuous low-resolution preview stream
    Preview,
    /// On-demand capture requested through the API
    Manual,
    /// Capture for the monitoring cycle
    Scheduled,
}

impl LeasePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeasePurpose::Preview => "preview",
            LeasePurpose::Manual => "manual",
            LeasePurpose::Scheduled => "scheduled",
        }
    }

    fn to_tag(self) -> u8 {
        match self {
            LeasePurpose::Preview => 1,
            LeasePurpose::Manual => 2,
            LeasePurpose::Scheduled => 3,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(LeasePurpose::Preview),
            2 => Some(LeasePurpose::Manual),
            3 => Some(LeasePurpose::Scheduled),
            _ => None,
        }
    }
}

impl std::fmt::Display for LeasePurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture size, JPEG quality and subprocess timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub timeout: Duration,
}

impl Resolution {
    /// Live preview frames
    pub const PREVIEW: Resolution = Resolution {
        width: 960,
        height: 540,
        quality: 85,
        timeout: Duration::from_secs(3),
    };

    /// Frames sent for analysis
    pub const CAPTURE: Resolution = Resolution {
        width: 1920,
        height: 1080,
        quality: 95,
        timeout: Duration::from_secs(8),
    };

    /// Device availability check
    pub const PROBE: Resolution = Resolution {
        width: 640,
        height: 480,
        quality: 80,
        timeout: Duration::from_secs(5),
    };
}

/// Camera errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    /// Another purpose holds the lease
    #[error("camera busy ({requested} requested, held by {})", held_by.map(|p| p.as_str()).unwrap_or("unknown"))]
    Busy {
        requested: LeasePurpose,
        held_by: Option<LeasePurpose>,
    },

    /// Device missing or misconfigured
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Capture did not finish in time (seconds)
    #[error("capture timed out after {0}s")]
    Timeout(u64),

    /// Output was empty or not an image
    #[error("capture output unusable: {0}")]
    DecodeFailed(String),
}

/// Physical camera driver
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Capture one encoded frame at the given resolution
    async fn capture(&self, resolution: &Resolution) -> Result<Vec<u8>, CameraError>;

    /// Check the device answers at all
    async fn probe(&self) -> Result<(), CameraError> {
        self.capture(&Resolution::PROBE).await.map(|_| ())
    }
}

/// CameraGateway instance
pub struct CameraGateway {
    backend: Arc<dyn CameraBackend>,
    lock: Arc<Mutex<()>>,
    holder: Arc<AtomicU8>,
    acquire_timeout: Duration,
    capture_failures: AtomicU64,
    /// Non-preview acquisitions currently waiting
    priority_waiters: Arc<AtomicUsize>,
}

impl CameraGateway {
    /// Create new CameraGateway
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self::with_timeout(backend, DEFAULT_ACQUIRE_TIMEOUT_MS)
    }

    /// Create with a custom acquisition wait
    pub fn with_timeout(backend: Arc<dyn CameraBackend>, timeout_ms: u64) -> Self {
        Self {
            backend,
            lock: Arc::new(Mutex::new(())),
            holder: Arc::new(AtomicU8::new(0)),
            acquire_timeout: Duration::from_millis(timeout_ms),
            capture_failures: AtomicU64::new(0),
            priority_waiters: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take the camera lease
    ///
    /// Waits at most the acquisition timeout, then reports `Busy`.
    pub async fn acquire(&self, purpose: LeasePurpose) -> Result<CameraLease, CameraError> {
        self.acquire_within(purpose, self.acquire_timeout).await
    }

    /// Take the camera lease, waiting at most `wait`
    ///
    /// While a non-preview purpose waits, preview acquisitions are refused so
    /// the wait is bounded by one in-flight preview frame.
    pub async fn acquire_within(
        &self,
        purpose: LeasePurpose,
        wait: Duration,
    ) -> Result<CameraLease, CameraError> {
        let _waiting = (purpose != LeasePurpose::Preview)
            .then(|| WaiterGuard::register(self.priority_waiters.clone()));

        match timeout(wait, self.lock.clone().lock_owned()).await {
            Ok(guard) => Ok(self.grant(purpose, guard)),
            Err(_) => Err(self.busy(purpose)),
        }
    }

    /// Take the camera lease without waiting
    pub fn try_acquire(&self, purpose: LeasePurpose) -> Result<CameraLease, CameraError> {
        if purpose == LeasePurpose::Preview && self.priority_waiters.load(Ordering::SeqCst) > 0 {
            return Err(self.busy(purpose));
        }

        match self.lock.clone().try_lock_owned() {
            Ok(guard) => Ok(self.grant(purpose, guard)),
            Err(_) => Err(self.busy(purpose)),
        }
    }

    /// Give the lease back
    pub fn release(&self, lease: CameraLease) {
        drop(lease);
    }

    /// Capture a frame while holding the lease
    pub async fn capture_now(
        &self,
        lease: &CameraLease,
        resolution: Resolution,
    ) -> Result<Frame, CameraError> {
        let result = self
            .backend
            .capture(&resolution)
            .await
            .and_then(|data| validate_frame(&data).map(|_| data));

        match result {
            Ok(data) => {
                tracing::debug!(
                    purpose = %lease.purpose(),
                    width = resolution.width,
                    height = resolution.height,
                    size = data.len(),
                    "Frame captured"
                );
                Ok(Frame::new(data))
            }
            Err(e) => {
                let failures = self.capture_failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(
                    purpose = %lease.purpose(),
                    error = %e,
                    capture_failures = failures,
                    "Capture failed"
                );
                Err(e)
            }
        }
    }

    /// Check the device while holding the lease
    pub async fn probe(&self, lease: &CameraLease) -> Result<(), CameraError> {
        let result = self.backend.probe().await;
        if let Err(ref e) = result {
            tracing::warn!(purpose = %lease.purpose(), error = %e, "Camera probe failed");
        }
        result
    }

    /// Total failed captures since startup
    pub fn capture_failures(&self) -> u64 {
        self.capture_failures.load(Ordering::SeqCst)
    }

    /// Current lease holder, if any
    pub fn holder(&self) -> Option<LeasePurpose> {
        LeasePurpose::from_tag(self.holder.load(Ordering::SeqCst))
    }

    fn grant(&self, purpose: LeasePurpose, guard: tokio::sync::OwnedMutexGuard<()>) -> CameraLease {
        self.holder.store(purpose.to_tag(), Ordering::SeqCst);
        tracing::trace!(purpose = %purpose, "Camera lease acquired");
        CameraLease {
            purpose,
            holder: self.holder.clone(),
            _guard: guard,
        }
    }

    fn busy(&self, requested: LeasePurpose) -> CameraError {
        let held_by = self.holder();
        tracing::debug!(
            requested = %requested,
            held_by = ?held_by,
            "Camera busy"
        );
        CameraError::Busy { requested, held_by }
    }
}

/// Counts a waiting non-preview acquisition until dropped
struct WaiterGuard(Arc<AtomicUsize>);

impl WaiterGuard {
    fn register(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Camera lease - released on drop
pub struct CameraLease {
    purpose: LeasePurpose,
    holder: Arc<AtomicU8>,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

impl CameraLease {
    pub fn purpose(&self) -> LeasePurpose {
        self.purpose
    }
}

impl Drop for CameraLease {
    fn drop(&mut self) {
        self.holder.store(0, Ordering::SeqCst);
        tracing::trace!(purpose = %self.purpose, "Camera lease released");
    }
}

/// Reject output that cannot be a JPEG frame
pub fn validate_frame(data: &[u8]) -> Result<(), CameraError> {
    if data.is_empty() {
        return Err(CameraError::DecodeFailed("empty output".to_string()));
    }
    if data.len() < MIN_FRAME_BYTES {
        return Err(CameraError::DecodeFailed(format!(
            "output too small ({} bytes)",
            data.len()
        )));
    }
    if data[..2] != JPEG_SOI {
        return Err(CameraError::DecodeFailed("missing JPEG marker".to_string()));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn gateway() -> CameraGateway {
        CameraGateway::with_timeout(Arc::new(FakeCamera::new()), 50)
    }

    #[tokio::test]
    async fn test_acquire_release() {
        let gw = gateway();

        let lease = gw.acquire(LeasePurpose::Scheduled).await.unwrap();
        assert_eq!(lease.purpose(), LeasePurpose::Scheduled);
        assert_eq!(gw.holder(), Some(LeasePurpose::Scheduled));

        gw.release(lease);
        assert_eq!(gw.holder(), None);

        let _lease2 = gw.acquire(LeasePurpose::Preview).await.unwrap();
    }

    #[tokio::test]
    async fn test_second_purpose_gets_busy() {
        let gw = gateway();

        let _held = gw.acquire(LeasePurpose::Preview).await.unwrap();
        let result = gw.acquire(LeasePurpose::Manual).await;
        assert_eq!(
            result.err(),
            Some(CameraError::Busy {
                requested: LeasePurpose::Manual,
                held_by: Some(LeasePurpose::Preview),
            })
        );

        assert!(gw.try_acquire(LeasePurpose::Scheduled).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_exactly_one_wins() {
        let gw = Arc::new(gateway());

        let a = {
            let gw = gw.clone();
            tokio::spawn(async move {
                let lease = gw.acquire(LeasePurpose::Preview).await;
                let ok = lease.is_ok();
                // hold past the other side's acquisition window
                tokio::time::sleep(Duration::from_millis(200)).await;
                ok
            })
        };
        let b = {
            let gw = gw.clone();
            tokio::spawn(async move {
                let lease = gw.acquire(LeasePurpose::Manual).await;
                let ok = lease.is_ok();
                tokio::time::sleep(Duration::from_millis(200)).await;
                ok
            })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b, "exactly one acquisition must succeed");

        // both tasks dropped their leases
        assert!(gw.acquire(LeasePurpose::Scheduled).await.is_ok());
    }

    #[tokio::test]
    async fn test_preview_yields_to_waiting_capture() {
        let gw = Arc::new(gateway());
        let preview = gw.try_acquire(LeasePurpose::Preview).unwrap();

        let waiter = {
            let gw = gw.clone();
            tokio::spawn(async move {
                gw.acquire_within(LeasePurpose::Scheduled, Duration::from_secs(2))
                    .await
                    .map(|lease| lease.purpose())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(preview);

        assert_eq!(waiter.await.unwrap(), Ok(LeasePurpose::Scheduled));
        assert!(gw.try_acquire(LeasePurpose::Preview).is_ok());
    }

    #[tokio::test]
    async fn test_capture_failure_is_counted() {
        let camera = Arc::new(FakeCamera::new());
        camera.push(Ok(vec![0x00; 10]));
        camera.push(Err(CameraError::Timeout(8)));
        let gw = CameraGateway::new(camera.clone());

        let lease = gw.acquire(LeasePurpose::Manual).await.unwrap();
        let first = gw.capture_now(&lease, Resolution::CAPTURE).await;
        assert!(matches!(first, Err(CameraError::DecodeFailed(_))));

        let second = gw.capture_now(&lease, Resolution::CAPTURE).await;
        assert_eq!(second.err(), Some(CameraError::Timeout(8)));

        let third = gw.capture_now(&lease, Resolution::CAPTURE).await.unwrap();
        assert!(third.len() >= MIN_FRAME_BYTES);
        assert_eq!(gw.capture_failures(), 2);
    }

    #[test]
    fn test_validate_frame() {
        assert!(validate_frame(&[]).is_err());
        assert!(validate_frame(&[0xFF, 0xD8, 0x00]).is_err());
        assert!(validate_frame(&vec![0u8; 2000]).is_err());
        assert!(validate_frame(&jpeg_bytes(7)).is_ok());
    }
}
