pub mod camera;
pub mod config;
pub mod error;
pub mod io;
pub mod motor;
pub mod orchestrator;
pub mod paths;
pub mod planner;
pub mod project;
pub mod rig;
pub mod session;
pub mod stop;

pub use error::{SessionError, StoreError};
pub use orchestrator::{Orchestrator, SessionProgress, SessionState, SessionTiming};
pub use project::{FsProjectStore, ProjectHandle, ProjectStore};
pub use rig::Rig;
pub use session::SessionRecord;
pub use stop::StopSignal;
