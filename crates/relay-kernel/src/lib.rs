//! Relay Kernel - command line front end
//!
//! Wires configuration, connectors and the engine together behind the
//! `relay` binary:
//! - `levels` prints the execution levels of a plan
//! - `route` prints the service chain for a role
//! - `run` executes a plan against the HTTP reasoning service
//! - `notify` sends one notification through the channel adapters

pub mod cli;
pub mod logging;
pub mod plan;

pub use cli::{command, execute, load_config};
pub use plan::{load_plan, parse_plan};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
