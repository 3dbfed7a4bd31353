// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Error types for the Avigilon exporter

use std::io;
use thiserror::Error;

/// Result type alias for exporter operations
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Main error type for the Avigilon exporter
#[derive(Error, Debug)]
pub enum ExporterError {
    /// Login rejected by the backend, or the response carried no session
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The backend refused the current session (HTTP 401/403)
    #[error("Session expired while fetching {resource} (HTTP {status})")]
    AuthExpired {
        /// Resource collection that was being fetched
        resource: &'static str,
        /// HTTP status returned by the backend
        status: u16,
    },

    /// Any other failure while fetching a resource collection
    #[error("Failed to fetch {resource}: {message}")]
    Fetch {
        /// Resource collection that was being fetched
        resource: &'static str,
        /// Backend or transport detail
        message: String,
    },

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Service manager action failed
    #[error("Service error: {0}")]
    Service(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExporterError {
    /// Build a fetch error for `resource`
    pub fn fetch(resource: &'static str, message: impl Into<String>) -> Self {
        Self::Fetch {
            resource,
            message: message.into(),
        }
    }

    /// Whether this error means the session must be renewed before retrying
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired { .. })
    }
}
