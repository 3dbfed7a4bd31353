// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Session client for the Avigilon Control Center Web Endpoint API
//!
//! [`VmsClient`] owns the session token. After a successful
//! [`authenticate`](VmsBackend::authenticate) every request carries the token
//! in the `x-avg-session` header. Fetches never retry on their own: a 401/403
//! is reported as [`ExporterError::AuthExpired`] and the caller decides
//! whether to log in again.
//!
//! ACC servers are deployed on-premises with self-signed certificates, so the
//! client accepts any certificate presented by the backend. Anyone able to
//! intercept traffic between the exporter and the VMS can read the login
//! payload; run the exporter on a trusted network segment.

use crate::auth::generate_auth_token;
use crate::config::Credentials;
use crate::error::{ExporterError, Result};
use crate::models::{
    Alarm, AlarmList, Camera, CameraList, Envelope, LoginPayload, LoginResult, Server, ServerList,
    Site, SiteList,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Header carrying the session token on authenticated requests
pub const SESSION_HEADER: &str = "x-avg-session";

/// Client name reported to the VMS at login
pub const CLIENT_NAME: &str = "avigilon-exporter";

/// Operations the scrape collector needs from the backend
///
/// Implemented by [`VmsClient`]; tests substitute scripted backends.
pub trait VmsBackend: Send {
    /// Log in and store the new session token, returning it
    fn authenticate(&mut self) -> Result<String>;
    /// Raw body of the health endpoint
    fn fetch_health(&self) -> Result<String>;
    /// Servers in the current cluster
    fn fetch_servers(&self) -> Result<Vec<Server>>;
    /// All cameras, high verbosity
    fn fetch_cameras(&self) -> Result<Vec<Camera>>;
    /// Alarm list
    fn fetch_alarms(&self) -> Result<Vec<Alarm>>;
}

/// Blocking HTTP client bound to one ACC server
pub struct VmsClient {
    http: Client,
    credentials: Credentials,
    session: Option<String>,
}

impl VmsClient {
    /// Create a client; no request is made until the first call
    pub fn new(credentials: Credentials) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| {
                ExporterError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            credentials,
            session: None,
        })
    }

    /// Current session token, if logged in
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// ACC sites (clusters) visible to this user
    pub fn fetch_sites(&self) -> Result<Vec<Site>> {
        let list: SiteList = self.get_json("sites", "/sites", &[])?;
        Ok(list.sites)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.base_url, path)
    }

    fn get(&self, resource: &'static str, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        let mut request = self.http.get(self.url(path)).query(query);
        if let Some(ref session) = self.session {
            request = request.header(SESSION_HEADER, session.as_str());
        }

        let response = request
            .send()
            .map_err(|e| ExporterError::fetch(resource, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ExporterError::AuthExpired {
                resource,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExporterError::fetch(
                resource,
                format!("HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }
        Ok(response)
    }

    fn get_json<T>(&self, resource: &'static str, path: &str, query: &[(&str, &str)]) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let body = self
            .get(resource, path, query)?
            .text()
            .map_err(|e| ExporterError::fetch(resource, e.to_string()))?;
        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| ExporterError::fetch(resource, format!("invalid response body: {}", e)))?;
        Ok(envelope.result)
    }
}

impl VmsBackend for VmsClient {
    fn authenticate(&mut self) -> Result<String> {
        let creds = &self.credentials;
        let payload = LoginPayload {
            username: creds.username.clone(),
            password: creds.password.clone(),
            client_name: CLIENT_NAME.to_string(),
            authorization_token: generate_auth_token(&creds.nonce, &creds.key, &creds.integration_id),
        };

        let response = self
            .http
            .post(self.url("/login"))
            .json(&payload)
            .send()
            .map_err(|e| ExporterError::Authentication(format!("login request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ExporterError::Authentication(format!("login response unreadable: {}", e)))?;
        if !status.is_success() {
            return Err(ExporterError::Authentication(format!(
                "login failed (HTTP {}): {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let envelope: Envelope<LoginResult> = serde_json::from_str(&body).map_err(|e| {
            ExporterError::Authentication(format!("failed to parse login response: {}", e))
        })?;
        let session = envelope.result.session;
        if session.is_empty() {
            return Err(ExporterError::Authentication(
                "login succeeded but no session was returned".into(),
            ));
        }

        log::debug!("Logged in to {} as '{}'", creds.base_url, creds.username);
        self.session = Some(session.clone());
        Ok(session)
    }

    fn fetch_health(&self) -> Result<String> {
        self.get("health", "/health", &[])?
            .text()
            .map_err(|e| ExporterError::fetch("health", e.to_string()))
    }

    fn fetch_servers(&self) -> Result<Vec<Server>> {
        let list: ServerList = self.get_json("servers", "/server/ids", &[])?;
        Ok(list.servers)
    }

    fn fetch_cameras(&self) -> Result<Vec<Camera>> {
        let list: CameraList = self.get_json("cameras", "/cameras", &[("verbosity", "HIGH")])?;
        Ok(list.cameras)
    }

    fn fetch_alarms(&self) -> Result<Vec<Alarm>> {
        let list: AlarmList = self.get_json("alarms", "/alarms", &[])?;
        Ok(list.alarms)
    }
}
