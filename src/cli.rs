//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

use crate::config::BindMode;

/// Access-control gateway for control connections
#[derive(Parser, Debug)]
#[command(name = "relaygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "RELAYGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "RELAYGATE_PORT")]
    pub port: Option<u16>,

    /// Bind mode (loopback, lan, custom)
    #[arg(long, value_enum, env = "RELAYGATE_BIND")]
    pub bind: Option<BindMode>,

    /// Host to bind to (overrides the bind mode)
    #[arg(long, env = "RELAYGATE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "RELAYGATE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "RELAYGATE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Disable the control UI
    #[arg(long)]
    pub no_control_ui: bool,
}
