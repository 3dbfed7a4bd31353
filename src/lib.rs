// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! # Avigilon Exporter
//!
//! Prometheus exporter for Avigilon Control Center (ACC) video management
//! systems. The exporter logs in to the ACC Web Endpoint API with an
//! integration nonce/key pair, and on every Prometheus pull it fetches
//! system health, servers, cameras and alarms and renders them as gauges.
//!
//! ## Modules
//!
//! - [`auth`] - time-based login token signing
//! - [`client`] - session-holding Web Endpoint client
//! - [`collector`] - one scrape per pull with a single re-login retry
//! - [`prometheus`] - metric descriptors and text exposition
//! - [`http_server`] - `/metrics` endpoint with graceful shutdown
//! - [`daemon`] - foreground run, `check`, service actions
//! - [`service`] - systemd and Windows SCM integration
//!
//! ## Example
//!
//! ```no_run
//! use avexlib::config::{ExporterSettings, SettingFlags};
//! use avexlib::daemon::ExporterDaemon;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ExporterSettings::resolve(&SettingFlags::default())?;
//!     let report = ExporterDaemon::new(settings).check()?;
//!     println!("{}", report.exposition);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod collector;
pub mod config;
pub mod daemon;
pub mod error;
pub mod http_server;
pub mod models;
pub mod prometheus;
pub mod service;

#[cfg(test)]
mod testing;

pub use client::{VmsBackend, VmsClient};
pub use collector::{ScrapeCollector, ScrapeSnapshot};
pub use config::{Credentials, ExporterSettings};
pub use error::{ExporterError, Result};

/// Crate version, reported in the exposition header and landing page
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
