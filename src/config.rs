// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Exporter configuration
//!
//! Settings come from command-line flags first and `AVIGILON_*` environment
//! variables second. The service manager injects the environment (systemd
//! `EnvironmentFile=`, the `Environment` registry value of a Windows
//! service), so an installed service can be configured without putting
//! secrets on its command line. Settings are resolved once at startup and
//! never re-read.

use crate::error::{ExporterError, Result};

/// Username used when neither flag nor environment provides one
pub const DEFAULT_USERNAME: &str = "administrator";
/// Port the export server listens on by default
pub const DEFAULT_PORT: u16 = 9100;
/// Bind address of the export server by default
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";

/// Environment variable names
pub mod env_vars {
    pub const HOST: &str = "AVIGILON_HOST";
    pub const USERNAME: &str = "AVIGILON_USERNAME";
    pub const PASSWORD: &str = "AVIGILON_PASSWORD";
    pub const NONCE: &str = "AVIGILON_NONCE";
    pub const KEY: &str = "AVIGILON_KEY";
    pub const INTEGRATION_ID: &str = "AVIGILON_INTEGRATION_ID";
    pub const PORT: &str = "AVIGILON_PORT";
    pub const LISTEN_ADDRESS: &str = "AVIGILON_LISTEN_ADDRESS";

    /// Variables an operator must provide for an unattended service
    pub const REQUIRED: [&str; 4] = [HOST, PASSWORD, NONCE, KEY];
}

/// Connection and signing material for one ACC server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Web Endpoint base URL, without trailing slash
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// User nonce from the integrator configuration
    pub nonce: String,
    /// User key from the integrator configuration
    pub key: String,
    /// Optional integration identifier appended to the login token
    pub integration_id: String,
}

impl Credentials {
    /// Names of required settings that are empty
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.base_url.is_empty() {
            missing.push("host");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.nonce.is_empty() {
            missing.push("nonce");
        }
        if self.key.is_empty() {
            missing.push("key");
        }
        missing
    }

    /// Fail with a configuration error if any required setting is empty
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_required();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ExporterError::Configuration(format!(
            "missing required credentials: {}. Provide flags or set AVIGILON_* environment variables",
            missing.join(", ")
        )))
    }

    /// Whether the login secrets (password, nonce, key) are all present
    pub fn has_secrets(&self) -> bool {
        !self.password.is_empty() && !self.nonce.is_empty() && !self.key.is_empty()
    }
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default)]
pub struct SettingFlags {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub nonce: Option<String>,
    pub key: Option<String>,
    pub integration_id: Option<String>,
    pub port: Option<u16>,
    pub listen_address: Option<String>,
}

/// Fully resolved exporter settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterSettings {
    pub credentials: Credentials,
    pub port: u16,
    pub listen_address: String,
}

impl ExporterSettings {
    /// Resolve flags against the process environment
    pub fn resolve(flags: &SettingFlags) -> Result<Self> {
        Self::resolve_with(flags, |name| std::env::var(name).ok())
    }

    /// Resolve flags against an arbitrary variable lookup
    ///
    /// Precedence is flag, then variable, then default. Empty strings are
    /// treated as unset at every level.
    pub fn resolve_with<F>(flags: &SettingFlags, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |flag: &Option<String>, var: &str| -> Option<String> {
            flag.clone()
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(var).filter(|v| !v.is_empty()))
        };

        let host = pick(&flags.host, env_vars::HOST).unwrap_or_default();
        let credentials = Credentials {
            base_url: host.trim_end_matches('/').to_string(),
            username: pick(&flags.username, env_vars::USERNAME)
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: pick(&flags.password, env_vars::PASSWORD).unwrap_or_default(),
            nonce: pick(&flags.nonce, env_vars::NONCE).unwrap_or_default(),
            key: pick(&flags.key, env_vars::KEY).unwrap_or_default(),
            integration_id: pick(&flags.integration_id, env_vars::INTEGRATION_ID)
                .unwrap_or_default(),
        };

        let port = match flags.port {
            Some(port) => port,
            None => match lookup(env_vars::PORT).filter(|v| !v.is_empty()) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    ExporterError::Configuration(format!(
                        "{} is not a valid port: {:?}",
                        env_vars::PORT,
                        raw
                    ))
                })?,
                None => DEFAULT_PORT,
            },
        };

        let listen_address = pick(&flags.listen_address, env_vars::LISTEN_ADDRESS)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());

        Ok(Self {
            credentials,
            port,
            listen_address,
        })
    }

    /// Arguments baked into the installed service definition
    ///
    /// Only settings that are present and differ from the defaults are
    /// included. An empty value baked in here would shadow whatever the
    /// service environment provides later.
    pub fn service_arguments(&self) -> Vec<String> {
        let creds = &self.credentials;
        let mut args = vec!["exporter".to_string()];

        let mut push = |flag: &str, value: &str| {
            if !value.is_empty() {
                args.push(flag.to_string());
                args.push(value.to_string());
            }
        };

        push("--host", &creds.base_url);
        if creds.username != DEFAULT_USERNAME {
            push("--username", &creds.username);
        }
        push("--password", &creds.password);
        push("--nonce", &creds.nonce);
        push("--key", &creds.key);
        push("--integration-id", &creds.integration_id);
        if self.port != DEFAULT_PORT {
            push("--port", &self.port.to_string());
        }
        if self.listen_address != DEFAULT_LISTEN_ADDRESS {
            push("--listen-address", &self.listen_address);
        }

        args
    }
}
