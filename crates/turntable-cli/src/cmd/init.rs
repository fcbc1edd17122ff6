use anyhow::Context;
use std::path::Path;
use turntable_core::{config::RigConfig, io, paths};

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing turntable storage in: {}", root.display());

    let projects = paths::projects_dir(root);
    io::ensure_dir(&projects)
        .with_context(|| format!("failed to create {}", projects.display()))?;

    let config_path = paths::config_path(root);
    let defaults = serde_yaml::to_string(&RigConfig::default())?;
    if io::write_if_missing(&config_path, defaults.as_bytes())
        .context("failed to write config.yaml")?
    {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    println!();
    println!("Edit {} to set the serial port and camera.", config_path.display());
    Ok(())
}
