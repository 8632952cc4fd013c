/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Remote config client: one POST per resolution attempt carrying the
//! attribution payload plus device metadata, answered by a serve/fallback
//! decision. Transport errors, non-200 statuses and malformed bodies are
//! distinct variants but the controller treats them identically.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::attribution::AttributionPayload;
use crate::prefs::AppPreferences;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum ConfigError {
    Transport(String),
    Status(u16),
    Malformed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Transport(e) => write!(f, "config transport failure: {e}"),
            ConfigError::Status(code) => write!(f, "config request returned status {code}"),
            ConfigError::Malformed(e) => write!(f, "config response malformed: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Decision payload from the remote endpoint.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RemoteDecision {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub url: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires: Option<i64>,
}

/// A fully assembled request: endpoint plus JSON body. Built once per
/// resolution attempt so tests can inspect exactly what goes on the wire.
#[derive(Clone, Debug)]
pub struct ConfigRequest {
    pub endpoint: Url,
    pub body: Map<String, Value>,
}

impl ConfigRequest {
    pub fn build(
        prefs: &AppPreferences,
        payload: &AttributionPayload,
        install_id: &str,
        push_token: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&prefs.config_endpoint)
            .map_err(|e| ConfigError::Transport(format!("bad endpoint: {e}")))?;

        let mut body = Map::new();
        for (key, value) in payload.iter() {
            body.insert(key.clone(), value.clone());
        }
        body.insert("af_id".into(), Value::String(install_id.to_string()));
        body.insert("bundle_id".into(), Value::String(prefs.bundle_id.clone()));
        body.insert("os".into(), Value::String(prefs.os_tag.clone()));
        body.insert("store_id".into(), Value::String(prefs.store_id.clone()));
        body.insert("locale".into(), Value::String(prefs.resolved_locale()));
        body.insert(
            "push_token".into(),
            match push_token {
                Some(token) => Value::String(token.to_string()),
                None => Value::Null,
            },
        );
        body.insert(
            "firebase_project_id".into(),
            match &prefs.firebase_project_id {
                Some(id) => Value::String(id.clone()),
                None => Value::Null,
            },
        );
        Ok(Self { endpoint, body })
    }
}

/// Blocking HTTP client for the one-shot config round-trip. The launch
/// runtime calls [`ConfigClient::fetch`] from a worker thread and posts
/// the outcome back onto the event channel; there is no automatic retry.
#[derive(Clone)]
pub struct ConfigClient {
    http: reqwest::blocking::Client,
}

impl ConfigClient {
    pub fn new() -> Result<Self, ConfigError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Transport(format!("{e}")))?;
        Ok(Self { http })
    }

    pub fn fetch(&self, request: &ConfigRequest) -> Result<RemoteDecision, ConfigError> {
        let body = serde_json::to_vec(&request.body)
            .map_err(|e| ConfigError::Malformed(format!("{e}")))?;
        let response = self
            .http
            .post(request.endpoint.clone())
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .map_err(|e| ConfigError::Transport(format!("{e}")))?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(ConfigError::Status(status.as_u16()));
        }
        let bytes = response
            .bytes()
            .map_err(|e| ConfigError::Transport(format!("{e}")))?;
        serde_json::from_slice(&bytes).map_err(|e| ConfigError::Malformed(format!("{e}")))
    }
}
