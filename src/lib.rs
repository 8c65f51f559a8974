//! Relaygate - access-control decision layer for gateway control connections
//!
//! Decides, per inbound control connection, whether the caller is authorized,
//! and decides at startup whether the auth configuration is safe to run with.
//!
//! # Features
//!
//! - **Trust classification**: loopback/direct vs reverse-proxy-forwarded
//!   callers, with an operator-declared trusted-proxy allow-list
//! - **Identity-proxy verification**: claimed identity headers are only
//!   honored after an authoritative out-of-band lookup corroborates them
//! - **Constant-time credential checks** for token and password modes
//! - **Startup policy gate**: refuses weak credentials and unsafe bindings
//!   before the gateway accepts a single connection

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod net;
pub mod security;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
