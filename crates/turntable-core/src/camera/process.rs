use crate::error::CaptureError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub(crate) struct CommandOutput {
    pub stdout: String,
}

/// Run a capture tool to completion.
///
/// The child is spawned with `kill_on_drop`, so a caller that times out and
/// drops this future also kills the process.
pub(crate) async fn run_capture_command(mut cmd: Command) -> Result<CommandOutput, CaptureError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(command = ?cmd.as_std(), "running capture command");
    let output = cmd.output().await.map_err(|source| CaptureError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(CaptureError::Failed {
            program,
            code: output.status.code(),
            stderr,
        });
    }
    Ok(CommandOutput { stdout })
}

pub(crate) fn find_binary(name: &str) -> Result<PathBuf, CaptureError> {
    which::which(name)
        .map_err(|_| CaptureError::NotReady(format!("'{name}' is not installed or not on PATH")))
}

pub(crate) fn ensure_parent(path: &Path) -> Result<(), CaptureError> {
    if let Some(parent) = path.parent() {
        crate::io::ensure_dir(parent)?;
    }
    Ok(())
}

pub(crate) fn ensure_written(path: &Path) -> Result<(), CaptureError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(CaptureError::MissingOutput(path.to_path_buf())),
    }
}
