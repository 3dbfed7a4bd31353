// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Host service manager integration
//!
//! The exporter registers itself with the platform's service manager so it
//! starts at boot and restarts on failure. Each platform is one
//! [`ServiceManager`] implementation; [`platform_manager`] picks the right
//! one at runtime.

pub mod systemd;
pub mod windows;

pub use systemd::SystemdManager;
pub use windows::WindowsManager;

use crate::error::{ExporterError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Name the exporter is registered under
pub const SERVICE_NAME: &str = "avigilon-exporter";
pub const SERVICE_DISPLAY_NAME: &str = "Avigilon Prometheus Exporter";
pub const SERVICE_DESCRIPTION: &str = "Exposes Avigilon VMS metrics to Prometheus";

/// Lifecycle operation requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Install,
    Uninstall,
    Start,
    Stop,
}

impl ServiceAction {
    pub const ALL: [ServiceAction; 4] = [Self::Install, Self::Uninstall, Self::Start, Self::Stop];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown service action '{}' (expected install, uninstall, start or stop)",
                    s
                )
            })
    }
}

/// Everything a service manager needs to register the exporter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Absolute path of the exporter binary
    pub executable: PathBuf,
    /// Arguments passed to the binary when the service starts
    pub arguments: Vec<String>,
}

impl ServiceDefinition {
    /// Definition for this exporter running `executable` with `arguments`
    pub fn exporter(executable: PathBuf, arguments: Vec<String>) -> Self {
        Self {
            name: SERVICE_NAME.into(),
            display_name: SERVICE_DISPLAY_NAME.into(),
            description: SERVICE_DESCRIPTION.into(),
            executable,
            arguments,
        }
    }

    /// Definition pointing at the currently running binary
    pub fn for_current_exe(arguments: Vec<String>) -> Result<Self> {
        let exe = std::env::current_exe().map_err(|e| {
            ExporterError::Service(format!("failed to resolve current executable: {}", e))
        })?;
        let exe = exe.canonicalize().unwrap_or(exe);
        Ok(Self::exporter(exe, arguments))
    }
}

/// Platform service manager
pub trait ServiceManager {
    /// Human-readable name of the backing manager
    fn name(&self) -> &'static str;

    /// Register the service; fails if it is already registered
    fn install(&self, definition: &ServiceDefinition) -> Result<()>;

    /// Remove the service registration
    fn uninstall(&self, name: &str) -> Result<()>;

    fn start(&self, name: &str) -> Result<()>;

    fn stop(&self, name: &str) -> Result<()>;

    /// Where an operator should put `AVIGILON_*` variables for the installed service
    fn environment_hint(&self) -> String;
}

/// Manager for hosts without systemd or the Windows SCM
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedManager;

impl UnsupportedManager {
    fn unsupported(&self) -> ExporterError {
        ExporterError::Service(format!(
            "service management is not supported on {}",
            std::env::consts::OS
        ))
    }
}

impl ServiceManager for UnsupportedManager {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn install(&self, _definition: &ServiceDefinition) -> Result<()> {
        Err(self.unsupported())
    }

    fn uninstall(&self, _name: &str) -> Result<()> {
        Err(self.unsupported())
    }

    fn start(&self, _name: &str) -> Result<()> {
        Err(self.unsupported())
    }

    fn stop(&self, _name: &str) -> Result<()> {
        Err(self.unsupported())
    }

    fn environment_hint(&self) -> String {
        "the environment of the process running the exporter".into()
    }
}

/// Service manager for the host this binary runs on
pub fn platform_manager() -> Box<dyn ServiceManager> {
    #[cfg(target_os = "linux")]
    {
        Box::new(SystemdManager::system())
    }
    #[cfg(windows)]
    {
        Box::new(WindowsManager::local())
    }
    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Box::new(UnsupportedManager)
    }
}
