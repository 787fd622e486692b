//! rpicam-jpeg capture backend
//!
//! Runs the Raspberry Pi camera CLI once per frame and reads the JPEG from
//! stdout. `kill_on_drop(true)` makes a timed-out capture kill the child
//! process instead of leaving it holding the device.

use super::{CameraBackend, CameraError, Resolution};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Default capture command
pub const DEFAULT_COMMAND: &str = "rpicam-jpeg";

/// RpicamBackend instance
pub struct RpicamBackend {
    command: String,
}

impl RpicamBackend {
    /// Create new backend running `command`
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn args(resolution: &Resolution) -> Vec<String> {
        vec![
            "--nopreview".to_string(),
            "--immediate".to_string(),
            "--timeout".to_string(),
            "1".to_string(),
            "--output".to_string(),
            "-".to_string(),
            "--width".to_string(),
            resolution.width.to_string(),
            "--height".to_string(),
            resolution.height.to_string(),
            "--quality".to_string(),
            resolution.quality.to_string(),
        ]
    }
}

impl Default for RpicamBackend {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND)
    }
}

#[async_trait]
impl CameraBackend for RpicamBackend {
    async fn capture(&self, resolution: &Resolution) -> Result<Vec<u8>, CameraError> {
        let child = Command::new(&self.command)
            .args(Self::args(resolution))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CameraError::DeviceUnavailable(format!("{} spawn failed: {}", self.command, e))
            })?;

        let timeout_secs = resolution.timeout.as_secs();

        match tokio::time::timeout(resolution.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(classify_failure(stderr.trim()));
                }
                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(CameraError::DeviceUnavailable(format!(
                "{} execution failed: {}",
                self.command, e
            ))),
            Err(_) => {
                tracing::warn!(
                    timeout_sec = timeout_secs,
                    command = %self.command,
                    "Capture timeout, process killed via kill_on_drop"
                );
                Err(CameraError::Timeout(timeout_secs))
            }
        }
    }
}

/// Map the CLI's stderr to a camera error
fn classify_failure(stderr: &str) -> CameraError {
    let lower = stderr.to_lowercase();
    if lower.contains("no cameras")
        || lower.contains("no such device")
        || lower.contains("failed to acquire camera")
        || lower.contains("device or resource busy")
    {
        CameraError::DeviceUnavailable(stderr.to_string())
    } else if stderr.is_empty() {
        CameraError::DecodeFailed("capture exited with an error and no output".to_string())
    } else {
        CameraError::DecodeFailed(stderr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_carry_resolution() {
        let args = RpicamBackend::args(&Resolution::CAPTURE);
        let joined = args.join(" ");
        assert!(joined.contains("--width 1920"));
        assert!(joined.contains("--height 1080"));
        assert!(joined.contains("--quality 95"));
        assert!(joined.contains("--output -"));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("ERROR: *** no cameras available ***"),
            CameraError::DeviceUnavailable(_)
        ));
        assert!(matches!(
            classify_failure("unexpected jpeg encoder state"),
            CameraError::DecodeFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let backend = RpicamBackend::new("definitely-not-a-camera-binary");
        let result = backend.capture(&Resolution::PROBE).await;
        assert!(matches!(result, Err(CameraError::DeviceUnavailable(_))));
    }
}
