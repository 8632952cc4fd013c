/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Serializable types for launch-state persistence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Persisted application mode, mirroring the `app_mode` store key.
///
/// `Funtik` is the historical on-disk spelling for fallback mode; it is
/// kept for compatibility with stores written by earlier builds.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistedMode {
    Display,
    Funtik,
}

impl PersistedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistedMode::Display => "Display",
            PersistedMode::Funtik => "Funtik",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Display" => Some(PersistedMode::Display),
            "Funtik" => Some(PersistedMode::Funtik),
            _ => None,
        }
    }
}

/// The full launch state surviving restarts.
///
/// Loaded once at startup and written back transactionally on each
/// transition. Field ownership is single-writer: the launch controller
/// owns `app_mode`, `has_launched`, `saved_url`, `saved_expires` and
/// `temp_url`; the notification gate owns `accepted_notifications`,
/// `system_close_notifications` and `last_notification_ask`; the push
/// bridge owns `fcm_token`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PersistedLaunchState {
    pub app_mode: Option<PersistedMode>,
    pub has_launched: bool,
    pub saved_url: Option<String>,
    /// Unix seconds; expiry handed back by the remote decision.
    pub saved_expires: Option<i64>,
    /// One-shot deep-link override delivered through a push payload.
    /// Cleared the moment it is consumed.
    pub temp_url: Option<String>,
    pub accepted_notifications: bool,
    pub system_close_notifications: bool,
    /// Unix seconds of the last declined notification prompt.
    pub last_notification_ask: Option<i64>,
    pub fcm_token: Option<String>,
}

/// A single persisted cookie. Only the attributes needed to rebuild the
/// cookie in a fresh surface are kept; page content is never persisted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CookieRecord {
    pub value: String,
    pub path: String,
    /// Unix seconds, absent for session cookies.
    pub expires: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

/// Cookie session snapshot grouped by domain, then cookie name.
///
/// This is the only browsing state that survives a process restart.
pub type SessionSnapshot = BTreeMap<String, BTreeMap<String, CookieRecord>>;
