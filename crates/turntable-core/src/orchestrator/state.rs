use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one session.
///
/// ```text
/// Idle -> Initializing -> Capturing -> Recording -> Rotating -> Capturing ...
///                                               \-> Completed
/// any non-terminal state -> Failed
/// ```
///
/// The first photo is taken at the starting orientation, so `Initializing`
/// leads straight to `Capturing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Initializing,
    Rotating,
    Capturing,
    Recording,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Idle, Initializing)
            | (Initializing, Capturing)
            | (Capturing, Recording)
            | (Recording, Rotating)
            | (Recording, Completed)
            | (Rotating, Capturing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Rotating => "rotating",
            SessionState::Capturing => "capturing",
            SessionState::Recording => "recording",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot published to observers after every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionProgress {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    /// Steps recorded and persisted so far.
    pub completed_steps: u32,
    pub planned_steps: u32,
    /// Logical angle of the turntable.
    pub angle: u32,
}

impl Default for SessionProgress {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            session_id: None,
            project_id: None,
            completed_steps: 0,
            planned_steps: 0,
            angle: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            Idle,
            Initializing,
            Capturing,
            Recording,
            Rotating,
            Capturing,
            Recording,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for next in [Idle, Initializing, Rotating, Capturing, Recording, Completed, Failed] {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(Completed.is_terminal());
        assert!(!Recording.is_terminal());
    }

    #[test]
    fn any_running_state_can_fail() {
        for from in [Idle, Initializing, Rotating, Capturing, Recording] {
            assert!(from.can_transition_to(Failed));
        }
    }

    #[test]
    fn shortcuts_are_rejected() {
        assert!(!Idle.can_transition_to(Capturing));
        assert!(!Capturing.can_transition_to(Rotating));
        assert!(!Rotating.can_transition_to(Recording));
        assert!(!Capturing.can_transition_to(Completed));
    }
}
