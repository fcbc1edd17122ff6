use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use turntable_core::config::RigConfig;
use turntable_core::{FsProjectStore, Orchestrator, Rig, StopSignal};

/// Load the config, refuse to drive hardware with error-level problems, and
/// connect the motor link.
pub async fn connect(root: &Path) -> anyhow::Result<Orchestrator> {
    let config = RigConfig::load(root).context("failed to load config")?;
    if RigConfig::has_errors(&config.validate()) {
        anyhow::bail!("config has errors; run `turntable config validate` for details");
    }
    let planner = config.planner()?;

    let rig = Arc::new(Rig::from_config(&config));
    rig.connect(&config.serial.port, config.serial.baud_rate)
        .await
        .context("failed to connect to the motor controller")?;

    let store = Arc::new(FsProjectStore::new(root));
    Ok(Orchestrator::new(rig, store, planner).with_timing(config.timing()))
}

/// A stop signal fired by Ctrl-C. Must be called inside the runtime.
pub fn stop_on_ctrl_c() -> StopSignal {
    let stop = StopSignal::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("stop requested, turning the motor off");
            signal.stop();
        }
    });
    stop
}
