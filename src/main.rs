//! Relaygate - access-control gateway for control connections.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use relaygate::{
    cli::Cli,
    config::{Config, EnvOverrides},
    gateway::runtime::{CliOverrides, resolve_runtime_config},
    gateway::server::GatewayServer,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // The only ambient environment read: snapshot credential fallbacks once.
    let env = EnvOverrides::from_process_env();
    let overrides = CliOverrides {
        port: cli.port,
        bind: cli.bind,
        host: cli.host.clone(),
        no_control_ui: cli.no_control_ui,
    };

    // Resolve runtime config and enforce the startup policy before listening.
    let runtime = match resolve_runtime_config(&config, &overrides, &env) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %runtime.bind_host,
        port = runtime.port,
        auth_mode = %runtime.resolved_auth.mode,
        identity_proxy = %runtime.identity_proxy_mode,
        "Starting relaygate"
    );

    if let Err(e) = GatewayServer::new(runtime).run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
