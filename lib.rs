/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! eggshell: launch-mode resolution and embedded browser session
//! control for a gated native/remote hybrid shell.
//!
//! A session starts in `Loading` and resolves to exactly one of
//! `Display` (remote-served browser session), `Fallback` (native
//! utility surface) or `Offline`, driven by attribution, connectivity
//! and a remote serve/fallback decision. Once `Display` lands, the
//! browser session controller owns navigation policy, popup lifecycle
//! and cookie persistence for one primary surface plus a LIFO stack of
//! secondaries.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod attribution;
pub mod cli;
pub mod connectivity;
pub mod launcher;
pub mod notifications;
pub mod persistence;
pub mod prefs;
pub mod remote_config;
pub mod session;
pub mod surface;

pub use attribution::{AttributionBridge, AttributionPayload};
pub use launcher::{LaunchController, LaunchMode, LaunchRuntime, LauncherEffect, LauncherEvent};
pub use persistence::LaunchStore;
pub use prefs::AppPreferences;
pub use remote_config::{ConfigClient, RemoteDecision};
pub use session::{BrowserPolicy, BrowserSessionController};
pub use surface::{SurfaceHost, SurfaceId, SurfaceStack};
