use super::process::ensure_parent;
use super::CameraBackend;
use crate::error::CaptureError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Writes a tiny placeholder JPEG instead of talking to hardware.
#[derive(Debug, Clone, Default)]
pub struct SimulatorCamera {
    delay: Duration,
}

impl SimulatorCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend each capture takes `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// SOI, a COM segment naming the source, EOI.
fn placeholder_jpeg(label: &str) -> Vec<u8> {
    let text = label.as_bytes();
    let len = (text.len() + 2) as u16;
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xFE];
    data.extend_from_slice(&len.to_be_bytes());
    data.extend_from_slice(text);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

#[async_trait]
impl CameraBackend for SimulatorCamera {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn ensure_ready(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn capture(&self, output: &Path) -> Result<(), CaptureError> {
        ensure_parent(output)?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let label = format!("turntable simulator: {}", output.display());
        tokio::fs::write(output, placeholder_jpeg(&label)).await?;
        tracing::debug!(path = %output.display(), "simulated photo written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_placeholder_jpeg() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sessions/s1/angle_000.jpg");
        SimulatorCamera::new().capture(&path).await.unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[..2], &[0xFF, 0xD8]);
        assert_eq!(&data[data.len() - 2..], &[0xFF, 0xD9]);
    }
}
