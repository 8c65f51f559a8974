//! Security modules for the gateway.
//!
//! Startup policy enforcement: credential strength and binding safety.

pub mod startup;

pub use startup::{Advisory, enforce_startup_policy};
