//! Simulation command implementation.

use anyhow::{Context, Result};

use dustline_core::{ControlClient, SimulationControl};

use crate::config::Config;
use crate::style;

pub async fn cmd_simulation(config: &Config, enabled: bool, quiet: bool, no_color: bool) -> Result<()> {
    let device = config.require_device()?;
    let control = SimulationControl::new(&config.server_url)?;

    let response = control
        .set_simulation_mode(device, enabled)
        .await
        .with_context(|| format!("Failed to update simulation mode on {}", device))?;

    if !quiet {
        let state = if enabled { "on" } else { "off" };
        println!(
            "{}",
            style::format_success(
                &format!("Simulation mode {} for {}", state, device),
                no_color
            )
        );
    }
    tracing::debug!("Control response: {}", response);
    Ok(())
}
