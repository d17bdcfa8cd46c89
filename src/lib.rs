//! # dynip
//!
//! Keeps a dynamic DNS hostname pointed at this host by periodically calling
//! a provider's query-string update API (easyDNS style) and classifying the
//! response.
//!
//! ## Features
//!
//! - Layered configuration: command line overrides, TOML file, defaults
//! - Single-shot update with exit codes, or a long-running daemon
//! - Linear tick backoff after repeated failures, capped at one day
//! - Graceful shutdown on SIGINT/SIGTERM
//! - systemd service install/uninstall
//!
//! ## Usage
//!
//! ```bash
//! # Update once
//! dynip -f /etc/dynip.toml
//!
//! # Run as daemon
//! dynip daemon
//!
//! # Register as a service
//! sudo dynip install --user dynip
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use error::{DynipError, Result};
pub use protocol::{UpdateClient, UpdateResult};
pub use scheduler::Scheduler;
