use super::process::{ensure_parent, ensure_written, find_binary, run_capture_command};
use super::CameraBackend;
use crate::error::CaptureError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// V4L2 webcam captured through `fswebcam`.
#[derive(Debug, Clone)]
pub struct WebcamCamera {
    program: String,
    device: String,
    width: u32,
    height: u32,
}

impl WebcamCamera {
    pub fn new(device: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            program: "fswebcam".to_string(),
            device: device.into(),
            width,
            height,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Numeric devices (`"0"`) map to `/dev/video<N>`.
    pub fn device_path(&self) -> PathBuf {
        if !self.device.is_empty() && self.device.chars().all(|c| c.is_ascii_digit()) {
            PathBuf::from(format!("/dev/video{}", self.device))
        } else {
            PathBuf::from(&self.device)
        }
    }

    fn command(&self, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--no-banner")
            .arg("--resolution")
            .arg(format!("{}x{}", self.width, self.height))
            .arg("-d")
            .arg(self.device_path())
            .arg(output);
        cmd
    }
}

#[async_trait]
impl CameraBackend for WebcamCamera {
    fn name(&self) -> &str {
        "webcam"
    }

    async fn ensure_ready(&self) -> Result<(), CaptureError> {
        find_binary(&self.program)?;
        let device = self.device_path();
        if !device.exists() {
            return Err(CaptureError::NotReady(format!(
                "video device {} does not exist",
                device.display()
            )));
        }
        Ok(())
    }

    async fn capture(&self, output: &Path) -> Result<(), CaptureError> {
        ensure_parent(output)?;
        run_capture_command(self.command(output)).await?;
        ensure_written(output)?;
        tracing::info!(path = %output.display(), device = %self.device, "webcam photo saved");
        Ok(())
    }
}
