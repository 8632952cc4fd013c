/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Attribution gateway: a narrow wrapper over the install-attribution
//! SDK. The SDK delivers one conversion payload per process lifetime
//! (or an error); both are forwarded into the launch controller's event
//! channel as typed messages.

use std::collections::BTreeMap;

use crossbeam_channel::Sender;
use log::warn;
use serde_json::Value;

use crate::launcher::LauncherEvent;

pub const AF_STATUS_KEY: &str = "af_status";
const ORGANIC_STATUS: &str = "Organic";

/// Opaque key-value conversion payload. Immutable after receipt; may be
/// empty when attribution failed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributionPayload {
    values: BTreeMap<String, Value>,
}

impl AttributionPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Whether the SDK marked this install as organic. Only the exact
    /// `af_status == "Organic"` value counts; any other status (paid,
    /// unknown, absent) falls through to the normal flow.
    pub fn is_organic(&self) -> bool {
        self.get_str(AF_STATUS_KEY) == Some(ORGANIC_STATUS)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Forwards SDK callbacks onto the launch event channel. One bridge is
/// registered for the process lifetime; delivery is fire-and-forget.
pub struct AttributionBridge {
    events: Sender<LauncherEvent>,
}

impl AttributionBridge {
    pub fn new(events: Sender<LauncherEvent>) -> Self {
        Self { events }
    }

    pub fn conversion_data_received(&self, values: BTreeMap<String, Value>) {
        let payload = AttributionPayload::from_map(values);
        if self
            .events
            .send(LauncherEvent::AttributionSuccess(payload))
            .is_err()
        {
            warn!("Attribution payload dropped: launch controller is gone");
        }
    }

    pub fn conversion_data_failed(&self, error: String) {
        if self
            .events
            .send(LauncherEvent::AttributionFailure(error))
            .is_err()
        {
            warn!("Attribution failure dropped: launch controller is gone");
        }
    }
}
