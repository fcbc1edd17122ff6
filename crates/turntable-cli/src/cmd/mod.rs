pub mod camera;
pub mod config;
pub mod init;
pub mod jog;
pub mod ports;
pub mod project;
pub mod rig;
pub mod session;
