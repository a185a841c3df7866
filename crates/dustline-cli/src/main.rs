use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use dustline_cli::cli::{Cli, Commands};
use dustline_cli::commands::{WatchArgs, cmd_config, cmd_simulation, cmd_status, cmd_watch};
use dustline_cli::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let mut config = Config::load(&config_path);

    match cli.command {
        Commands::Watch {
            server,
            store,
            transport,
            reconnect_delay,
            no_persist,
            interactive,
        } => {
            server.apply(&mut config);
            store.apply(&mut config);
            if let Some(transport) = transport {
                config.transport = transport;
            }
            if let Some(secs) = reconnect_delay {
                config.reconnect_delay_secs = secs;
            }
            cmd_watch(
                &config,
                WatchArgs {
                    no_persist,
                    interactive,
                    quiet: cli.quiet,
                    no_color: cli.no_color,
                },
            )
            .await?;
        }
        Commands::Simulation { state, server } => {
            server.apply(&mut config);
            cmd_simulation(&config, state.enabled(), cli.quiet, cli.no_color).await?;
        }
        Commands::Status { store, format } => {
            store.apply(&mut config);
            cmd_status(&config, format, cli.no_color)?;
        }
        Commands::Config { action } => {
            cmd_config(action, &config_path, cli.no_color)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "dustline", &mut io::stdout());
        }
    }

    Ok(())
}
