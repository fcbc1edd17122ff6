use crate::orchestrator::SessionState;
use crate::session::SessionRecord;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Motor link
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot open serial port {port} at {baud_rate} baud: {source}")]
    Open {
        port: String,
        baud_rate: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid baud rate: {0}")]
    InvalidBaudRate(u32),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("motor link is not connected")]
    NotConnected,

    #[error("motor link is faulted: reconnect before sending commands")]
    Faulted,

    #[error("failed to send '{command}' to the microcontroller: {source}")]
    Write {
        command: char,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RotationError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("rotation cancelled after {elapsed_ms} ms")]
    Cancelled { elapsed_ms: u64 },
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera not ready: {0}")]
    NotReady(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {}: {stderr}", exit_label(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("capture reported success but no file was written to {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("capture timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("angle step {0} is invalid: must be between 1 and 360 degrees")]
    InvalidAngleStep(u32),

    #[error("calibration {0} deg/s is invalid: must be a positive finite number")]
    InvalidCalibration(f64),

    #[error("jog of {0} degrees is invalid: must be in (0, 360]")]
    InvalidJog(f64),
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid id '{0}': must be alphanumeric with hyphens or underscores")]
    InvalidId(String),

    #[error("home directory not found: set HOME or pass --root")]
    HomeNotFound,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
#[error("failed to persist project {project}: {source}")]
pub struct PersistenceError {
    pub project: String,
    #[source]
    pub source: StoreError,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("angle {0} is outside [0, 360)")]
    AngleOutOfRange(u32),

    #[error("angle {angle} is not a multiple of the session step {step}")]
    OffStep { angle: u32, step: u32 },

    #[error("angle {0} already has a photo")]
    DuplicateAngle(u32),

    #[error("photo path for angle {0} is empty")]
    EmptyPath(u32),

    #[error("session has {recorded} of {planned} photos and cannot be completed")]
    Incomplete { recorded: usize, planned: u32 },
}

// ---------------------------------------------------------------------------
// Session orchestration
// ---------------------------------------------------------------------------

/// The reason a running session stopped before completion.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Rotation(#[from] RotationError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("stopped by operator")]
    Cancelled,

    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
}

/// A session that halted part-way. The record holds every step that was
/// persisted before the failure.
#[derive(Debug)]
pub struct SessionFailure {
    pub record: SessionRecord,
    pub planned_steps: u32,
    pub state: SessionState,
    pub cause: StepError,
}

impl SessionFailure {
    pub fn completed_steps(&self) -> usize {
        self.record.photos.len()
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session {} halted while {} after {}/{} steps: {}",
            self.record.id,
            self.state,
            self.completed_steps(),
            self.planned_steps,
            self.cause
        )
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("rig is busy: a session or jog is already running")]
    Busy,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("motor link is not connected")]
    MotorNotConnected,

    #[error("camera '{backend}' is not ready: {source}")]
    CameraNotReady {
        backend: String,
        #[source]
        source: CaptureError,
    },

    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Jog(#[from] RotationError),

    #[error("{0}")]
    Halted(Box<SessionFailure>),
}

impl SessionError {
    /// Steps persisted before the session stopped, when a session was running.
    pub fn completed_steps(&self) -> Option<usize> {
        match self {
            SessionError::Halted(failure) => Some(failure.completed_steps()),
            _ => None,
        }
    }

    pub fn partial_record(&self) -> Option<&SessionRecord> {
        match self {
            SessionError::Halted(failure) => Some(&failure.record),
            _ => None,
        }
    }
}
