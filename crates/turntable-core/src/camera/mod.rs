//! Capture backends. The orchestrator only sees [`CameraBackend`]; which
//! variant backs it is decided once, from configuration.

mod gphoto2;
mod process;
mod simulator;
mod webcam;

pub use gphoto2::Gphoto2Camera;
pub use simulator::SimulatorCamera;
pub use webcam::WebcamCamera;

use crate::error::CaptureError;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Short label for logs and error messages.
    fn name(&self) -> &str;

    /// Cheap readiness probe run before a session touches the motor.
    async fn ensure_ready(&self) -> Result<(), CaptureError>;

    /// Take one photo and write it to `output`. Callers impose the timeout;
    /// dropping the future must abandon any outstanding work.
    async fn capture(&self, output: &Path) -> Result<(), CaptureError>;
}
