use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::time::Duration;
use turntable_core::config::RigConfig;
use turntable_core::error::CaptureError;

#[derive(Subcommand)]
pub enum CameraSubcommand {
    /// Take a single photo with the configured backend
    Test {
        /// Where to write the photo (default: <root>/camera-test.jpg)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn run(root: &Path, subcmd: CameraSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CameraSubcommand::Test { output } => test(root, output, json),
    }
}

fn test(root: &Path, output: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = RigConfig::load(root).context("failed to load config")?;
    let camera = config.camera_backend();
    let output = output.unwrap_or_else(|| root.join("camera-test.jpg"));
    let limit = Duration::from_secs(config.capture.timeout_secs);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        camera.ensure_ready().await?;
        tokio::time::timeout(limit, camera.capture(&output))
            .await
            .map_err(|_| CaptureError::TimedOut(limit))??;
        Ok::<(), CaptureError>(())
    })
    .with_context(|| format!("{} capture failed", camera.name()))?;

    if json {
        return print_json(&serde_json::json!({
            "backend": camera.name(),
            "path": output,
        }));
    }
    println!("Captured {} with {}.", output.display(), camera.name());
    Ok(())
}
