use crate::output::{print_json, print_table};
use anyhow::Context;
use turntable_core::motor::list_ports;

pub fn run(json: bool) -> anyhow::Result<()> {
    let ports = list_ports().context("failed to enumerate serial ports")?;
    if json {
        return print_json(&ports);
    }
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    let rows = ports
        .iter()
        .map(|p| {
            vec![
                p.port.clone(),
                p.description.clone().unwrap_or_default(),
                p.manufacturer.clone().unwrap_or_default(),
                if p.likely_microcontroller { "*" } else { "" }.to_string(),
            ]
        })
        .collect();
    print_table(&["PORT", "DESCRIPTION", "MANUFACTURER", "MCU"], rows);
    Ok(())
}
