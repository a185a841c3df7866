//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use dustline_store::Layout;

use crate::config::{Config, TransportKind};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Storage layout as a CLI value
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    Flat,
    PerDevice,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Flat => Layout::Flat,
            LayoutArg::PerDevice => Layout::PerDevice,
        }
    }
}

/// Connection arguments shared by the commands that talk to the service.
/// Every flag overrides the matching config value.
#[derive(Debug, Clone, Default, Args)]
pub struct ServerArgs {
    /// Base URL of the monitoring service
    #[arg(short, long, env = "DUSTLINE_SERVER")]
    pub server: Option<String>,

    /// Device uuid
    #[arg(short, long, env = "DUSTLINE_DEVICE")]
    pub device: Option<String>,
}

impl ServerArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server_url = server.trim_end_matches('/').to_string();
        }
        if let Some(device) = &self.device {
            config.device_uuid = Some(device.clone());
        }
    }
}

/// Storage arguments shared by the commands that read or write the database.
#[derive(Debug, Clone, Default, Args)]
pub struct StoreArgs {
    /// Database file
    #[arg(long, env = "DUSTLINE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Storage layout
    #[arg(long, value_enum)]
    pub layout: Option<LayoutArg>,
}

impl StoreArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(database) = &self.database {
            config.database = Some(database.clone());
        }
        if let Some(layout) = self.layout {
            config.layout = layout.into();
        }
    }
}

#[derive(Parser)]
#[command(name = "dustline")]
#[command(author, version, about = "Live dashboard for dust-collection telemetry", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "DUSTLINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow the live update stream and show it in the terminal
    Watch {
        #[command(flatten)]
        server: ServerArgs,

        #[command(flatten)]
        store: StoreArgs,

        /// Push transport
        #[arg(short, long, value_enum)]
        transport: Option<TransportKind>,

        /// Seconds between reconnect attempts
        #[arg(long)]
        reconnect_delay: Option<u64>,

        /// Keep everything in memory
        #[arg(long)]
        no_persist: bool,

        /// Read toggle commands from stdin (`on`, `off`, `t`, `q`)
        #[arg(short, long)]
        interactive: bool,
    },

    /// Turn the device's simulation mode on or off
    Simulation {
        /// Requested state
        #[arg(value_enum)]
        state: Toggle,

        #[command(flatten)]
        server: ServerArgs,
    },

    /// Show the last persisted dashboard state without connecting
    Status {
        #[command(flatten)]
        store: StoreArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Requested simulation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_overrides() {
        let cli = Cli::try_parse_from([
            "dustline",
            "watch",
            "--server",
            "http://shop:8000/",
            "--device",
            "DC-01",
            "--transport",
            "websocket",
            "--layout",
            "per-device",
            "--no-persist",
        ])
        .unwrap();

        let Commands::Watch {
            server,
            store,
            transport,
            no_persist,
            ..
        } = cli.command
        else {
            panic!("expected watch");
        };
        assert_eq!(transport, Some(TransportKind::Websocket));
        assert!(no_persist);

        let mut config = Config::default();
        server.apply(&mut config);
        store.apply(&mut config);
        assert_eq!(config.server_url, "http://shop:8000");
        assert_eq!(config.device_uuid.as_deref(), Some("DC-01"));
        assert_eq!(config.layout, Layout::PerDevice);
    }

    #[test]
    fn test_overrides_keep_config_when_absent() {
        let mut config = Config {
            device_uuid: Some("DC-09".to_string()),
            ..Default::default()
        };
        ServerArgs::default().apply(&mut config);
        StoreArgs::default().apply(&mut config);
        assert_eq!(config, Config {
            device_uuid: Some("DC-09".to_string()),
            ..Default::default()
        });
    }

    #[test]
    fn test_parse_simulation() {
        let cli = Cli::try_parse_from(["dustline", "-q", "simulation", "off"]).unwrap();
        assert!(cli.quiet);
        let Commands::Simulation { state, .. } = cli.command else {
            panic!("expected simulation");
        };
        assert!(!state.enabled());
    }
}
