//! Command-line dashboard for dust-collection telemetry.
//!
//! The `dustline` binary follows a monitoring service's live update stream
//! and prints tool, blast-gate, duration and particulate changes as they
//! are reconciled by [`dustline_core::Dashboard`].
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `watch` | Follow the live stream (add `-i` to toggle simulation mode from stdin) |
//! | `simulation` | Turn the device's simulation mode on or off |
//! | `status` | Show the last persisted state without connecting |
//! | `config` | Show, locate or initialize the config file |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! Settings live in `~/.config/dustline/config.toml` (or platform
//! equivalent); command-line flags override them.
//!
//! ```toml
//! server_url = "http://localhost:8000"
//! transport = "event-stream"   # or "websocket"
//! device_uuid = "DC-01"
//! layout = "flat"              # or "per-device"
//! reconnect_delay_secs = 3
//!
//! [[series]]
//! metric = "pm2_5_concentration"
//! label = "PM2.5"
//! ```
//!
//! # Environment Variables
//!
//! - `DUSTLINE_SERVER`, `DUSTLINE_DEVICE`, `DUSTLINE_DATABASE`, `DUSTLINE_CONFIG`
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given

pub mod cli;
pub mod commands;
pub mod config;
pub mod render;
pub mod style;

pub use dustline_core;
pub use dustline_store;
pub use dustline_types;
