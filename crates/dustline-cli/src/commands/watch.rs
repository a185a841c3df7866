//! Watch command implementation.
//!
//! Mounts a dashboard session on the configured store, follows the live
//! channel until Ctrl+C, and prints every change to the terminal. The channel
//! reconnects on its own after a fixed delay, so the loop never gives up.

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dustline_core::{
    ControlClient, Dashboard, DashboardCommand, EventStreamTransport, LiveChannel,
    SimulationControl, Transport, WebSocketTransport,
};
use dustline_store::PersistenceStore;

use crate::config::{Config, TransportKind};
use crate::render::TerminalRenderer;
use crate::style;

/// Arguments for the watch command.
pub struct WatchArgs {
    pub no_persist: bool,
    pub interactive: bool,
    pub quiet: bool,
    pub no_color: bool,
}

/// One line typed on stdin in interactive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StdinCommand {
    Dashboard(DashboardCommand),
    Quit,
}

fn parse_stdin_command(line: &str) -> Option<StdinCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "on" => Some(StdinCommand::Dashboard(DashboardCommand::SetSimulationMode(true))),
        "off" => Some(StdinCommand::Dashboard(DashboardCommand::SetSimulationMode(false))),
        "t" | "toggle" => Some(StdinCommand::Dashboard(DashboardCommand::ToggleSimulationMode)),
        "q" | "quit" | "exit" => Some(StdinCommand::Quit),
        _ => None,
    }
}

fn build_transport(config: &Config) -> Result<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::EventStream => Arc::new(EventStreamTransport::new(&config.server_url)?),
        TransportKind::Websocket => {
            let device = config
                .require_device()
                .context("The websocket transport is per device")?;
            Arc::new(WebSocketTransport::for_device(&config.server_url, device)?)
        }
    };
    Ok(transport)
}

pub async fn cmd_watch(config: &Config, args: WatchArgs) -> Result<()> {
    let WatchArgs {
        no_persist,
        interactive,
        quiet,
        no_color,
    } = args;

    config.validate()?;
    let transport = build_transport(config)?;
    let control: Arc<dyn ControlClient> = Arc::new(SimulationControl::new(&config.server_url)?);

    let store = if no_persist {
        PersistenceStore::disabled(config.layout)
    } else {
        let path = config.database_path();
        debug!("Using database {}", path.display());
        PersistenceStore::open(&path, config.store_options(), config.layout)
    };

    let mut dashboard = Dashboard::mount(
        config.dashboard_config(),
        store,
        TerminalRenderer::stdout(no_color),
    );
    let channel = LiveChannel::new(transport.clone(), config.channel_options())?
        .with_metrics(dashboard.metrics());

    if !quiet {
        eprintln!(
            "{}",
            style::format_info(
                &format!("Watching {} (Ctrl+C to stop)", transport.endpoint()),
                no_color
            )
        );
    }

    let cancel = CancellationToken::new();
    let (events, channel_task) = channel.spawn(cancel.clone());
    let (commands_tx, commands) = mpsc::channel(8);

    let signal_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        })
    };

    // Dropping the sender closes the command stream when not interactive.
    // stdin is read on a plain thread: a blocked read must not hold up
    // runtime shutdown.
    if interactive {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_stdin_command(&line) {
                    Some(StdinCommand::Dashboard(command)) => {
                        if commands_tx.blocking_send(command).is_err() {
                            break;
                        }
                    }
                    Some(StdinCommand::Quit) => {
                        cancel.cancel();
                        break;
                    }
                    None => eprintln!("Commands: on, off, t (toggle), q (quit)"),
                }
            }
        });
    } else {
        drop(commands_tx);
    }

    dashboard.run(events, commands, control, cancel.clone()).await;

    cancel.cancel();
    channel_task.await.ok();
    signal_task.await.ok();

    if !quiet {
        let summary = dashboard.metrics().summary();
        eprintln!(
            "{}",
            style::format_info(
                &format!(
                    "{} frames ({} malformed), {} reconnects",
                    summary.frames_received, summary.malformed_frames, summary.reconnects
                ),
                no_color
            )
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stdin_command() {
        assert_eq!(
            parse_stdin_command(" ON \n"),
            Some(StdinCommand::Dashboard(DashboardCommand::SetSimulationMode(true)))
        );
        assert_eq!(
            parse_stdin_command("off"),
            Some(StdinCommand::Dashboard(DashboardCommand::SetSimulationMode(false)))
        );
        assert_eq!(
            parse_stdin_command("t"),
            Some(StdinCommand::Dashboard(DashboardCommand::ToggleSimulationMode))
        );
        assert_eq!(parse_stdin_command("q"), Some(StdinCommand::Quit));
        assert_eq!(parse_stdin_command("launch"), None);
    }

    #[test]
    fn test_websocket_transport_needs_device() {
        let config = Config {
            transport: TransportKind::Websocket,
            ..Default::default()
        };
        assert!(build_transport(&config).is_err());

        let config = Config {
            transport: TransportKind::Websocket,
            device_uuid: Some("DC-01".to_string()),
            ..Default::default()
        };
        let transport = build_transport(&config).unwrap();
        assert_eq!(transport.endpoint(), "ws://localhost:8000/devices/DC-01/ws");
    }

    #[test]
    fn test_event_stream_transport_endpoint() {
        let transport = build_transport(&Config::default()).unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:8000/updates/all");
    }
}
