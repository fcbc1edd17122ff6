use super::rig;
use crate::output::print_json;
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, degrees: f64, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let position = rt.block_on(async {
        let orchestrator = rig::connect(root).await?;
        let stop = rig::stop_on_ctrl_c();
        let moved = orchestrator.move_degrees(degrees, &stop).await;
        orchestrator.rig().disconnect().await;
        anyhow::Ok(moved.with_context(|| format!("failed to rotate {degrees}°"))?)
    })?;

    if json {
        return print_json(&serde_json::json!({
            "degrees": degrees,
            "position": position,
        }));
    }
    println!("Rotated {degrees}°. Logical position: {position}°.");
    Ok(())
}
