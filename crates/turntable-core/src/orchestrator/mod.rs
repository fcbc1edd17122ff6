//! Capture-session orchestration.
//!
//! A session photographs one full turn: capture at the current angle, record
//! and persist, rotate one step, let the table settle, repeat. The photo at
//! angle 0 is taken before any rotation and there is no rotation after the
//! last capture. Any hardware or persistence failure halts the session; the
//! motor is open-loop, so nothing is retried.

mod state;

pub use state::{SessionProgress, SessionState};

use crate::camera::CameraBackend;
use crate::error::{
    CaptureError, ConfigError, PersistenceError, RotationError, SessionError, SessionFailure,
    StepError,
};
use crate::paths;
use crate::planner::RotationPlanner;
use crate::project::{ProjectHandle, ProjectStore};
use crate::rig::{Rig, RigState};
use crate::session::{planned_steps, SessionRecord, FULL_TURN};
use crate::stop::StopSignal;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// SessionTiming
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Pause after each rotation so vibration dies down before the shot.
    pub settle_after_rotation: Duration,
    /// Upper bound on a single capture.
    pub capture_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            settle_after_rotation: Duration::from_millis(500),
            capture_timeout: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    rig: Arc<Rig>,
    store: Arc<dyn ProjectStore>,
    planner: RotationPlanner,
    timing: SessionTiming,
    progress: watch::Sender<SessionProgress>,
}

/// Bookkeeping for the session in flight.
struct Run {
    project_id: String,
    /// Last state of the record that reached the store.
    committed: SessionRecord,
    state: SessionState,
    planned: u32,
    angle: u32,
}

impl Orchestrator {
    pub fn new(rig: Arc<Rig>, store: Arc<dyn ProjectStore>, planner: RotationPlanner) -> Self {
        let (progress, _rx) = watch::channel(SessionProgress::default());
        Self {
            rig,
            store,
            planner,
            timing: SessionTiming::default(),
            progress,
        }
    }

    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn rig(&self) -> &Arc<Rig> {
        &self.rig
    }

    pub fn planner(&self) -> &RotationPlanner {
        &self.planner
    }

    /// Progress of the current (or last) session.
    pub fn subscribe(&self) -> watch::Receiver<SessionProgress> {
        self.progress.subscribe()
    }

    /// Run one full capture session for `project`.
    ///
    /// Fails fast with [`SessionError::Busy`] when another session or a jog
    /// holds the rig, and rejects bad configuration before any serial
    /// traffic. Once steps are running, a failure returns
    /// [`SessionError::Halted`] with the record as it was last persisted.
    pub async fn start_session(
        &self,
        project: &mut ProjectHandle,
        name: &str,
        stop: &StopSignal,
    ) -> Result<SessionRecord, SessionError> {
        let mut rig = self.rig.try_acquire()?;
        let planned = planned_steps(project.angle_step)?;
        if !rig.motor.is_connected() {
            return Err(SessionError::MotorNotConnected);
        }
        let camera = Arc::clone(self.rig.camera());
        camera
            .ensure_ready()
            .await
            .map_err(|source| SessionError::CameraNotReady {
                backend: camera.name().to_string(),
                source,
            })?;

        let record = SessionRecord::new(name, project.angle_step)?;
        tracing::info!(
            project = %project.id,
            session = %record.id,
            angle_step = project.angle_step,
            planned,
            residual_arc = record.residual_arc(),
            camera = camera.name(),
            "starting capture session"
        );

        let mut run = Run {
            project_id: project.id.clone(),
            committed: record,
            state: SessionState::Idle,
            planned,
            angle: 0,
        };
        self.publish(&run);

        let outcome = self
            .run_steps(&mut rig, project, &mut run, camera.as_ref(), stop)
            .await;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    session = %run.committed.id,
                    steps = run.committed.steps_completed(),
                    "capture session completed"
                );
                Ok(run.committed)
            }
            Err(StepError::InvalidTransition { from, to }) => {
                self.halt(&mut run);
                Err(SessionError::InvalidTransition { from, to })
            }
            Err(cause) => {
                let failed_in = run.state;
                self.halt(&mut run);
                tracing::error!(
                    session = %run.committed.id,
                    state = %failed_in,
                    completed = run.committed.steps_completed(),
                    planned,
                    error = %cause,
                    "capture session halted"
                );
                Err(SessionError::Halted(Box::new(SessionFailure {
                    record: run.committed,
                    planned_steps: planned,
                    state: failed_in,
                    cause,
                })))
            }
        }
    }

    /// Manual rotation outside a session. Returns the new logical position;
    /// the position only moves when the rotation completes.
    pub async fn move_degrees(&self, degrees: f64, stop: &StopSignal) -> Result<f64, SessionError> {
        if !degrees.is_finite() || degrees <= 0.0 || degrees > f64::from(FULL_TURN) {
            return Err(ConfigError::InvalidJog(degrees).into());
        }
        let mut rig = self.rig.try_acquire()?;
        if !rig.motor.is_connected() {
            return Err(SessionError::MotorNotConnected);
        }

        let duration = self.planner.duration_for_degrees(degrees);
        tracing::info!(degrees, duration_ms = duration.as_millis() as u64, "jogging turntable");
        rig.motor.rotate_for_duration(duration, stop).await?;
        rig.position = (rig.position + degrees) % f64::from(FULL_TURN);
        Ok(rig.position)
    }

    // -----------------------------------------------------------------------
    // Step loop
    // -----------------------------------------------------------------------

    async fn run_steps(
        &self,
        rig: &mut RigState,
        project: &mut ProjectHandle,
        run: &mut Run,
        camera: &dyn CameraBackend,
        stop: &StopSignal,
    ) -> Result<(), StepError> {
        self.enter(run, SessionState::Initializing)?;
        rig.position = 0.0;
        let step_size = run.committed.angle_step;
        let session_dir = project.session_dir(&run.committed.id);
        let initial = run.committed.clone();
        self.commit(project, run, initial).await?;

        for step in 0..run.planned {
            let angle = step * step_size;
            run.angle = angle;

            self.enter(run, SessionState::Capturing)?;
            let path = paths::photo_path(&session_dir, angle);
            self.capture(camera, &path, stop).await?;

            self.enter(run, SessionState::Recording)?;
            let mut next = run.committed.clone();
            next.record_photo(angle, path)?;
            self.commit(project, run, next).await?;
            tracing::info!(step = step + 1, planned = run.planned, angle, "step recorded");

            if step + 1 == run.planned {
                break;
            }

            self.enter(run, SessionState::Rotating)?;
            self.rotate(rig, step_size, stop).await?;
            run.angle = (angle + step_size) % FULL_TURN;
            rig.position = f64::from(run.angle);
            self.settle(stop).await?;
        }

        let mut done = run.committed.clone();
        done.mark_completed()?;
        self.commit(project, run, done).await?;
        self.enter(run, SessionState::Completed)?;
        Ok(())
    }

    async fn capture(
        &self,
        camera: &dyn CameraBackend,
        path: &Path,
        stop: &StopSignal,
    ) -> Result<(), StepError> {
        let limit = self.timing.capture_timeout;
        tokio::select! {
            biased;
            _ = stop.stopped() => Err(StepError::Cancelled),
            result = tokio::time::timeout(limit, camera.capture(path)) => match result {
                Ok(Ok(())) if path.is_file() => Ok(()),
                Ok(Ok(())) => Err(CaptureError::MissingOutput(path.to_path_buf()).into()),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => {
                    tracing::warn!(path = %path.display(), timeout_ms = limit.as_millis() as u64, "capture timed out");
                    Err(CaptureError::TimedOut(limit).into())
                }
            },
        }
    }

    async fn rotate(&self, rig: &mut RigState, degrees: u32, stop: &StopSignal) -> Result<(), StepError> {
        let duration = self.planner.duration_for_degrees(f64::from(degrees));
        tracing::debug!(degrees, duration_ms = duration.as_millis() as u64, "rotating");
        match rig.motor.rotate_for_duration(duration, stop).await {
            Ok(()) => Ok(()),
            Err(RotationError::Cancelled { .. }) => Err(StepError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }

    async fn settle(&self, stop: &StopSignal) -> Result<(), StepError> {
        tokio::select! {
            biased;
            _ = stop.stopped() => Err(StepError::Cancelled),
            _ = tokio::time::sleep(self.timing.settle_after_rotation) => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    /// Write `candidate` into the project and persist it. On failure the
    /// project is put back to the last committed record.
    async fn commit(
        &self,
        project: &mut ProjectHandle,
        run: &mut Run,
        candidate: SessionRecord,
    ) -> Result<(), PersistenceError> {
        let previous = project.session(&candidate.id).cloned();
        project.upsert_session(candidate.clone());

        let store = Arc::clone(&self.store);
        let snapshot = project.clone();
        let saved = tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e).into()));

        if let Err(source) = saved {
            match previous {
                Some(record) => project.upsert_session(record),
                None => {
                    project.remove_session(&candidate.id);
                }
            }
            return Err(PersistenceError {
                project: project.id.clone(),
                source,
            });
        }
        run.committed = candidate;
        self.publish(run);
        Ok(())
    }

    fn enter(&self, run: &mut Run, next: SessionState) -> Result<(), StepError> {
        if !run.state.can_transition_to(next) {
            return Err(StepError::InvalidTransition {
                from: run.state,
                to: next,
            });
        }
        tracing::debug!(from = %run.state, to = %next, angle = run.angle, "session state");
        run.state = next;
        self.publish(run);
        Ok(())
    }

    fn halt(&self, run: &mut Run) {
        if !run.state.is_terminal() {
            run.state = SessionState::Failed;
            self.publish(run);
        }
    }

    fn publish(&self, run: &Run) {
        self.progress.send_replace(SessionProgress {
            state: run.state,
            session_id: Some(run.committed.id.clone()),
            project_id: Some(run.project_id.clone()),
            completed_steps: run.committed.steps_completed() as u32,
            planned_steps: run.planned,
            angle: run.angle,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
