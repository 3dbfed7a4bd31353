// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Web Endpoint API payloads
//!
//! Every resource endpoint wraps its data as `{"result": {"<collection>": [...]}}`.
//! Fields the exporter does not rely on are kept optional so that firmware
//! differences between ACC releases do not break decoding.

use serde::{Deserialize, Deserializer, Serialize};

/// Decode an explicit `null` the same way as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response envelope shared by all endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(bound(deserialize = "T: Default + Deserialize<'de>"))]
pub struct Envelope<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: T,
}

/// Body of `POST /login`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
    pub client_name: String,
    pub authorization_token: String,
}

/// `result` of `POST /login`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub session: String,
}

/// A camera as returned by `GET /cameras?verbosity=HIGH`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Camera {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(deserialize_with = "null_as_default")]
    pub serial: String,
    #[serde(deserialize_with = "null_as_default")]
    pub firmware_version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub connection_state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ip_address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub connected: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub recorded_data: bool,
}

/// `result` of `GET /cameras`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CameraList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cameras: Vec<Camera>,
}

/// An alarm entry from `GET /alarms`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alarm {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(rename = "timeOfMostRecentActivation")]
    #[serde(deserialize_with = "null_as_default")]
    pub trigger_time: String,
}

/// `result` of `GET /alarms`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlarmList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub alarms: Vec<Alarm>,
}

/// A server in the current cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

/// `result` of `GET /server/ids`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub servers: Vec<Server>,
}

/// An ACC site (cluster)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Site {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
}

/// `result` of `GET /sites`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sites: Vec<Site>,
}
