use std::time::SystemTime;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::CaptureError;

/// One captured image of the observed window. Owned by the cycle that
/// captured it and dropped once analysis has consumed it.
pub struct Frame {
    pub png: Vec<u8>,
    pub captured_at: SystemTime,
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture_frame(&self) -> Result<Frame, CaptureError>;
}

/// Captures by running an external helper that writes a PNG of the active
/// window to stdout (e.g. `grim -` on Wayland, `screencapture -x -` on
/// macOS). A non-zero exit or empty output means there is nothing to
/// observe right now.
pub struct CommandFrameSource {
    argv: Vec<String>,
}

impl CommandFrameSource {
    pub fn new(argv: Vec<String>) -> Result<Self, CaptureError> {
        if argv.is_empty() {
            return Err(CaptureError::Command(
                "capture_command is empty".to_string(),
            ));
        }
        Ok(Self { argv })
    }
}

#[async_trait]
impl FrameSource for CommandFrameSource {
    async fn capture_frame(&self) -> Result<Frame, CaptureError> {
        let output = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(status = ?output.status, %stderr, "capture helper exited non-zero");
            return Err(CaptureError::NoActiveTarget);
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::NoActiveTarget);
        }
        Ok(Frame {
            png: output.stdout,
            captured_at: SystemTime::now(),
        })
    }
}
