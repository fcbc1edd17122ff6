use crate::camera::CameraBackend;
use crate::config::RigConfig;
use crate::error::{ConnectError, SessionError};
use crate::motor::MotorLink;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// The physical rig: one motor link and one camera, built once at startup.
///
/// The motor and the logical position sit behind a single lock. Whoever holds
/// it (a session or a jog) is the only writer on the serial channel.
pub struct Rig {
    motor: Mutex<RigState>,
    camera: Arc<dyn CameraBackend>,
}

#[derive(Debug)]
pub struct RigState {
    pub motor: MotorLink,
    /// Bookkeeping angle in `[0, 360)`. Never measured.
    pub position: f64,
}

impl Rig {
    pub fn new(motor: MotorLink, camera: Arc<dyn CameraBackend>) -> Self {
        Self {
            motor: Mutex::new(RigState {
                motor,
                position: 0.0,
            }),
            camera,
        }
    }

    pub fn from_config(config: &RigConfig) -> Self {
        Self::new(config.motor_link(), config.camera_backend())
    }

    pub fn camera(&self) -> &Arc<dyn CameraBackend> {
        &self.camera
    }

    /// Take exclusive use of the motor, failing fast when it is in use.
    pub fn try_acquire(&self) -> Result<MutexGuard<'_, RigState>, SessionError> {
        self.motor.try_lock().map_err(|_| SessionError::Busy)
    }

    /// Open the serial link. Waits for any running operation to finish.
    pub async fn connect(&self, port: &str, baud_rate: u32) -> Result<(), ConnectError> {
        let mut state = self.motor.lock().await;
        state.motor.connect(port, baud_rate).await
    }

    pub async fn disconnect(&self) {
        self.motor.lock().await.motor.disconnect();
    }

    /// `None` while a session or jog holds the rig.
    pub fn position(&self) -> Option<f64> {
        self.motor.try_lock().ok().map(|s| s.position)
    }
}

impl std::fmt::Debug for Rig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rig")
            .field("camera", &self.camera.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatorCamera;
    use crate::motor::testing::RecordingSerial;
    use std::time::Duration;

    fn rig() -> Rig {
        let motor = MotorLink::new(Arc::new(RecordingSerial::default()))
            .with_settle_delay(Duration::ZERO);
        Rig::new(motor, Arc::new(SimulatorCamera::new()))
    }

    #[tokio::test]
    async fn second_acquire_is_busy() {
        let rig = rig();
        let guard = rig.try_acquire().unwrap();
        assert!(matches!(rig.try_acquire(), Err(SessionError::Busy)));
        assert_eq!(rig.position(), None);
        drop(guard);
        assert!(rig.try_acquire().is_ok());
        assert_eq!(rig.position(), Some(0.0));
    }

    #[tokio::test]
    async fn connect_goes_through_the_lock() {
        let rig = rig();
        rig.connect("/dev/ttyACM0", 9600).await.unwrap();
        assert!(rig.try_acquire().unwrap().motor.is_connected());
        rig.disconnect().await;
        assert!(!rig.try_acquire().unwrap().motor.is_connected());
    }
}
