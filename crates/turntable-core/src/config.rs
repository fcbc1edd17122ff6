use crate::camera::{CameraBackend, Gphoto2Camera, SimulatorCamera, WebcamCamera};
use crate::error::{ConfigError, StoreError};
use crate::motor::{MotorLink, SerialOpener, SimulatedSerial, SystemSerial};
use crate::orchestrator::SessionTiming;
use crate::paths;
use crate::planner::{RotationCalibration, RotationPlanner};
use crate::session::{planned_steps, FULL_TURN};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

impl ConfigWarning {
    fn error(message: String) -> Self {
        Self {
            level: WarnLevel::Error,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SerialConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Board reset time after opening the port.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// How long to wait for an optional `OK` after each command.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_response_timeout_ms() -> u64 {
    100
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            settle_ms: default_settle_ms(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// CameraConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraConfig {
    Webcam {
        #[serde(default = "default_video_device")]
        device: String,
        #[serde(default = "default_width")]
        width: u32,
        #[serde(default = "default_height")]
        height: u32,
    },
    Gphoto2 {
        #[serde(default)]
        port: Option<String>,
    },
    Simulator,
}

fn default_video_device() -> String {
    "/dev/video0".to_string()
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig::Webcam {
            device: default_video_device(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl CameraConfig {
    pub fn build(&self) -> Arc<dyn CameraBackend> {
        match self {
            CameraConfig::Webcam {
                device,
                width,
                height,
            } => Arc::new(WebcamCamera::new(device.clone(), *width, *height)),
            CameraConfig::Gphoto2 { port } => Arc::new(Gphoto2Camera::new(port.clone())),
            CameraConfig::Simulator => Arc::new(SimulatorCamera::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// RotationConfig / CaptureConfig / SimulatorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_degrees_per_second")]
    pub degrees_per_second: f64,
    #[serde(default = "default_settle_after_rotation_ms")]
    pub settle_after_rotation_ms: u64,
    #[serde(default = "default_angle_step")]
    pub default_angle_step: u32,
}

fn default_degrees_per_second() -> f64 {
    0.8
}

fn default_settle_after_rotation_ms() -> u64 {
    500
}

fn default_angle_step() -> u32 {
    5
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            degrees_per_second: default_degrees_per_second(),
            settle_after_rotation_ms: default_settle_after_rotation_ms(),
            default_angle_step: default_angle_step(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Replace the serial microcontroller with an in-process simulator.
    #[serde(default)]
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// RigConfig
// ---------------------------------------------------------------------------

/// Contents of `<root>/config.yaml`. Every field has a default, so a partial
/// or missing file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl RigConfig {
    pub fn load(root: &Path) -> Result<Self, StoreError> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: RigConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<(), StoreError> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())?;
        Ok(())
    }

    pub fn calibration(&self) -> Result<RotationCalibration, ConfigError> {
        RotationCalibration::new(self.rotation.degrees_per_second)
    }

    pub fn planner(&self) -> Result<RotationPlanner, ConfigError> {
        Ok(RotationPlanner::new(self.calibration()?))
    }

    pub fn timing(&self) -> SessionTiming {
        SessionTiming {
            settle_after_rotation: Duration::from_millis(self.rotation.settle_after_rotation_ms),
            capture_timeout: Duration::from_secs(self.capture.timeout_secs),
        }
    }

    pub fn serial_opener(&self) -> Arc<dyn SerialOpener> {
        if self.simulator.enabled {
            Arc::new(SimulatedSerial)
        } else {
            Arc::new(SystemSerial::new(Duration::from_millis(
                self.serial.response_timeout_ms,
            )))
        }
    }

    /// A disconnected motor link using the configured transport.
    pub fn motor_link(&self) -> MotorLink {
        let settle = if self.simulator.enabled {
            Duration::ZERO
        } else {
            Duration::from_millis(self.serial.settle_ms)
        };
        MotorLink::new(self.serial_opener()).with_settle_delay(settle)
    }

    /// The simulator flag overrides the configured camera as well.
    pub fn camera_backend(&self) -> Arc<dyn CameraBackend> {
        if self.simulator.enabled {
            CameraConfig::Simulator.build()
        } else {
            self.camera.build()
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Err(e) = self.calibration() {
            warnings.push(ConfigWarning::error(format!("rotation.degrees_per_second: {e}")));
        }
        if self.serial.baud_rate == 0 {
            warnings.push(ConfigWarning::error("serial.baud_rate must be greater than zero".to_string()));
        }
        if !self.simulator.enabled && self.serial.port.trim().is_empty() {
            warnings.push(ConfigWarning::error("serial.port is empty".to_string()));
        }
        if self.capture.timeout_secs == 0 {
            warnings.push(ConfigWarning::error("capture.timeout_secs must be greater than zero".to_string()));
        }
        if let CameraConfig::Webcam { width, height, .. } = &self.camera {
            if *width == 0 || *height == 0 {
                warnings.push(ConfigWarning::error(format!("camera resolution {width}x{height} is invalid")));
            }
        }

        let step = self.rotation.default_angle_step;
        match planned_steps(step) {
            Err(e) => warnings.push(ConfigWarning::error(format!("rotation.default_angle_step: {e}"))),
            Ok(steps) if FULL_TURN % step != 0 => warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "rotation.default_angle_step {step} does not divide 360: \
                     sessions capture {steps} angles and leave {} degrees uncovered",
                    FULL_TURN - steps * step
                ),
            }),
            Ok(_) => {}
        }

        if !self.simulator.enabled
            && matches!(self.camera, CameraConfig::Gphoto2 { .. })
            && which::which("gphoto2").is_err()
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "camera type is gphoto2 but the gphoto2 binary is not on PATH"
                    .to_string(),
            });
        }

        warnings
    }

    pub fn has_errors(warnings: &[ConfigWarning]) -> bool {
        warnings.iter().any(|w| w.level == WarnLevel::Error)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
