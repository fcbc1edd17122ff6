use super::process::{ensure_parent, ensure_written, find_binary, run_capture_command};
use super::CameraBackend;
use crate::error::CaptureError;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::process::Command;

/// Tethered camera driven through the `gphoto2` CLI.
#[derive(Debug, Clone)]
pub struct Gphoto2Camera {
    program: String,
    port: Option<String>,
}

impl Gphoto2Camera {
    /// `port` selects a specific camera (`usb:001,004`); `None` or `"auto"`
    /// lets gphoto2 pick the first one it detects.
    pub fn new(port: Option<String>) -> Self {
        Self {
            program: "gphoto2".to_string(),
            port: port.filter(|p| !p.is_empty() && p != "auto"),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--force-overwrite")
            .arg("--capture-image-and-download")
            .arg("--filename")
            .arg(output);
        if let Some(port) = &self.port {
            cmd.arg("--port").arg(port);
        }
        cmd
    }
}

#[async_trait]
impl CameraBackend for Gphoto2Camera {
    fn name(&self) -> &str {
        "gphoto2"
    }

    async fn ensure_ready(&self) -> Result<(), CaptureError> {
        find_binary(&self.program).map(|_| ())
    }

    async fn capture(&self, output: &Path) -> Result<(), CaptureError> {
        ensure_parent(output)?;
        let out = run_capture_command(self.command(output)).await?;
        settle_download(output, &out.stdout)?;
        tracing::info!(path = %output.display(), "gphoto2 photo saved");
        Ok(())
    }
}

static SAVING_RE: OnceLock<Regex> = OnceLock::new();

fn saving_re() -> &'static Regex {
    SAVING_RE.get_or_init(|| Regex::new(r"(?m)^Saving file as (.+?)\s*$").unwrap())
}

/// Name gphoto2 reported for the downloaded file, if any.
fn saved_file_name(stdout: &str) -> Option<PathBuf> {
    saving_re()
        .captures(stdout)
        .map(|c| PathBuf::from(c[1].to_string()))
}

/// Some camera drivers ignore `--filename` and keep the camera's own name;
/// move that file into place when the requested path is missing.
fn settle_download(output: &Path, stdout: &str) -> Result<(), CaptureError> {
    if ensure_written(output).is_ok() {
        return Ok(());
    }
    let Some(saved) = saved_file_name(stdout) else {
        return Err(CaptureError::MissingOutput(output.to_path_buf()));
    };
    if saved.as_path() == output || !saved.is_file() {
        return Err(CaptureError::MissingOutput(output.to_path_buf()));
    }
    if std::fs::rename(&saved, output).is_err() {
        std::fs::copy(&saved, output)?;
        std::fs::remove_file(&saved)?;
    }
    tracing::info!(from = %saved.display(), to = %output.display(), "moved downloaded file into place");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn auto_port_means_no_port_argument() {
        let cam = Gphoto2Camera::new(Some("auto".into()));
        let cmd = cam.command(Path::new("/tmp/a.jpg"));
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert!(!args.iter().any(|a| *a == "--port"));
        assert!(args.iter().any(|a| *a == "--capture-image-and-download"));
    }

    #[test]
    fn explicit_port_is_passed_through() {
        let cam = Gphoto2Camera::new(Some("usb:001,004".into()));
        let cmd = cam.command(Path::new("/tmp/a.jpg"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(&args[args.len() - 2..], ["--port", "usb:001,004"]);
    }

    #[test]
    fn parses_saving_line() {
        let stdout = "New file is in location /capt0000.jpg on the camera\n\
                      Saving file as capt0000.jpg\n\
                      Deleting file /capt0000.jpg on the camera\n";
        assert_eq!(saved_file_name(stdout), Some(PathBuf::from("capt0000.jpg")));
        assert_eq!(saved_file_name("nothing useful"), None);
    }

    #[test]
    fn settle_moves_reported_file_into_place() {
        let dir = TempDir::new().unwrap();
        let saved = dir.path().join("capt0000.jpg");
        std::fs::write(&saved, b"jpeg").unwrap();
        let output = dir.path().join("angle_015.jpg");

        let stdout = format!("Saving file as {}\n", saved.display());
        settle_download(&output, &stdout).unwrap();
        assert!(output.exists());
        assert!(!saved.exists());
    }

    #[test]
    fn settle_without_file_is_missing_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("angle_000.jpg");
        assert!(matches!(
            settle_download(&output, ""),
            Err(CaptureError::MissingOutput(_))
        ));
    }

    #[tokio::test]
    async fn tool_exiting_zero_without_file_fails() {
        let dir = TempDir::new().unwrap();
        let cam = Gphoto2Camera::new(None).with_program("true");
        let err = cam
            .capture(&dir.path().join("angle_000.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::MissingOutput(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_not_ready() {
        let cam = Gphoto2Camera::new(None).with_program("__no_gphoto2_here__");
        assert!(matches!(
            cam.ensure_ready().await,
            Err(CaptureError::NotReady(_))
        ));
    }
}
