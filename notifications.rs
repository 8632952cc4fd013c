/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Notification permission gate. Decides whether the custom prompt should
//! be shown before the config round-trip, as a pure function of the
//! persisted flags and the reprompt cooldown.

use crate::persistence::types::PersistedLaunchState;

/// Ask-again interval after a declined prompt: 3 days.
pub const REPROMPT_COOLDOWN_SECS: i64 = 259_200;

/// Terminal outcome of one prompt presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptOutcome {
    /// User tapped allow; the system dialog granted.
    Accepted,
    /// User skipped the custom prompt.
    Declined,
    /// The system dialog itself denied permission.
    SystemDenied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Show the prompt now.
    Prompt,
    /// Permission was already granted or permanently denied.
    AlreadyDecided,
    /// A decline is still inside the cooldown window.
    CoolingDown,
}

impl GateDecision {
    /// The cooldown is a function of `last_notification_ask` only; mode
    /// changes between launches do not reset it.
    pub fn decide(state: &PersistedLaunchState, now_unix: i64) -> Self {
        if state.accepted_notifications || state.system_close_notifications {
            return GateDecision::AlreadyDecided;
        }
        if let Some(last_ask) = state.last_notification_ask {
            if now_unix.saturating_sub(last_ask) < REPROMPT_COOLDOWN_SECS {
                return GateDecision::CoolingDown;
            }
        }
        GateDecision::Prompt
    }
}
