/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end launch scenarios: a full resolution sequence against a
//! real on-disk store, then the browser session picking up where the
//! launcher left off — including a process "restart" over the same
//! state directory.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use url::Url;

use eggshell::launcher::{LaunchController, LaunchMode, LauncherEffect, LauncherEvent};
use eggshell::notifications::PromptOutcome;
use eggshell::persistence::types::{CookieRecord, PersistedMode};
use eggshell::remote_config::RemoteDecision;
use eggshell::session::BrowserPolicy;
use eggshell::surface::{SurfaceHost, SurfaceId};
use eggshell::{AppPreferences, AttributionPayload, BrowserSessionController, LaunchStore};

const NOW: i64 = 1_756_400_000;
const SERVE_URL: &str = "https://eggs.example/session/start";

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!eggshell::VERSION.is_empty());
}

#[derive(Default)]
struct NullHost {
    external: RefCell<Vec<Url>>,
}

impl SurfaceHost for NullHost {
    fn open_external(&self, url: &Url) {
        self.external.borrow_mut().push(url.clone());
    }
}

fn paid_payload() -> AttributionPayload {
    let mut values = BTreeMap::new();
    values.insert("af_status".to_string(), json!("Non-organic"));
    values.insert("media_source".to_string(), json!("ads_network"));
    AttributionPayload::from_map(values)
}

fn open_store(dir: &TempDir) -> Arc<LaunchStore> {
    Arc::new(LaunchStore::open(dir.path().to_path_buf()).unwrap())
}

fn serve_decision() -> RemoteDecision {
    RemoteDecision {
        ok: true,
        url: Some(SERVE_URL.to_string()),
        expires: Some(NOW + 86_400),
    }
}

fn resolve_display(controller: &mut LaunchController, now: i64) {
    let effects = controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), now);
    // First launch: the gate fires before config.
    if effects
        .iter()
        .any(|e| matches!(e, LauncherEffect::ShowNotificationPrompt))
    {
        controller.handle_event(
            LauncherEvent::PromptResolved(PromptOutcome::Declined),
            now + 1,
        );
    }
    controller.handle_event(LauncherEvent::ConfigOutcome(Ok(serve_decision())), now + 2);
}

#[test]
fn first_launch_resolves_display_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let mut controller = LaunchController::new(open_store(&dir), AppPreferences::default());
    resolve_display(&mut controller, NOW);
    assert_eq!(controller.mode(), LaunchMode::Display);
    assert_eq!(controller.resolved_url().unwrap().as_str(), SERVE_URL);
    drop(controller);

    // Second process over the same directory: persisted Display mode
    // and saved URL give continuity even when config now fails.
    let mut relaunch = LaunchController::new(open_store(&dir), AppPreferences::default());
    relaunch.handle_event(
        LauncherEvent::AttributionSuccess(paid_payload()),
        NOW + 100,
    );
    relaunch.handle_event(
        LauncherEvent::ConfigOutcome(Err(eggshell::remote_config::ConfigError::Status(502))),
        NOW + 101,
    );
    assert_eq!(relaunch.mode(), LaunchMode::Display);
    assert_eq!(relaunch.resolved_url().unwrap().as_str(), SERVE_URL);
}

#[test]
fn organic_first_launch_sticks_to_fallback_forever() {
    let dir = tempfile::tempdir().unwrap();
    let mut values = BTreeMap::new();
    values.insert("af_status".to_string(), json!("Organic"));
    let organic = AttributionPayload::from_map(values);

    let mut controller = LaunchController::new(open_store(&dir), AppPreferences::default());
    controller.handle_event(LauncherEvent::AttributionSuccess(organic), NOW);
    assert_eq!(controller.mode(), LaunchMode::Fallback);
    assert_eq!(controller.state().app_mode, Some(PersistedMode::Funtik));
    drop(controller);

    // Later launches short-circuit on the persisted mode, even with a
    // paid payload.
    let mut relaunch = LaunchController::new(open_store(&dir), AppPreferences::default());
    let effects = relaunch.handle_event(
        LauncherEvent::AttributionSuccess(paid_payload()),
        NOW + 1000,
    );
    assert_eq!(relaunch.mode(), LaunchMode::Fallback);
    assert!(!effects
        .iter()
        .any(|e| matches!(e, LauncherEffect::FetchConfig(_))));
}

#[test]
fn display_session_hands_url_to_browser_and_persists_cookies() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut controller = LaunchController::new(store.clone(), AppPreferences::default());
    resolve_display(&mut controller, NOW);
    let url = controller.resolved_url().unwrap().clone();

    let host = Rc::new(NullHost::default());
    let mut session = BrowserSessionController::new(store.clone(), host.clone());
    let primary = session.primary_id();
    session.navigate(primary, url.clone());
    assert_eq!(session.stack().primary().current_url(), Some(&url));

    // Page sets a session cookie, then a server redirect checkpoints it.
    session
        .stack_mut()
        .primary_mut()
        .cookie_store_mut()
        .set_cookie(
            "eggs.example",
            "session",
            CookieRecord {
                value: "incubating".into(),
                path: "/".into(),
                expires: None,
                secure: true,
                http_only: true,
            },
        );
    session.on_redirect(primary, Url::parse("https://eggs.example/home").unwrap());
    drop(session);

    // Restart: cookies come back before the first navigation.
    let revived = BrowserSessionController::new(store, host);
    assert_eq!(
        revived
            .stack()
            .primary()
            .cookie_store()
            .get("eggs.example", "session")
            .map(|c| c.value.as_str()),
        Some("incubating")
    );
}

#[test]
fn external_scheme_links_leave_the_surface_stack() {
    let dir = tempfile::tempdir().unwrap();
    let host = Rc::new(NullHost::default());
    let mut session = BrowserSessionController::new(open_store(&dir), host.clone());
    let primary = session.primary_id();

    session.navigate(primary, Url::parse("https://eggs.example/").unwrap());
    session.navigate(primary, Url::parse("tel:+15550100").unwrap());

    assert_eq!(host.external.borrow().len(), 1);
    assert_eq!(
        session.stack().primary().current_url(),
        Some(&Url::parse("https://eggs.example/").unwrap())
    );
}

#[test]
fn popup_stack_tears_down_lifo_on_clear() {
    let dir = tempfile::tempdir().unwrap();
    let host = Rc::new(NullHost::default());
    let mut session = BrowserSessionController::new(open_store(&dir), host);
    let primary = session.primary_id();
    session.navigate(primary, Url::parse("https://eggs.example/").unwrap());

    let first = session.on_popup_requested(primary, Some("https://pay.example/checkout"));
    let second = session.on_popup_requested(first, Some("https://pay.example/3ds"));
    assert_eq!(session.stack().secondary_count(), 2);
    assert_eq!(session.stack().top_secondary_id(), Some(second));

    session.clear_secondary_surfaces(Some(Url::parse("https://eggs.example/done").unwrap()));
    assert_eq!(session.stack().secondary_count(), 0);
    assert_eq!(
        session.stack().primary().current_url(),
        Some(&Url::parse("https://eggs.example/done").unwrap())
    );
}

#[test]
fn push_deep_link_overrides_next_resolution_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    // A push notification stored a one-shot override between launches.
    let mut state = store.load_state().unwrap();
    state.has_launched = true;
    state.accepted_notifications = true;
    state.temp_url = Some("https://eggs.example/promo".to_string());
    store.save_state(&state).unwrap();

    let mut controller = LaunchController::new(store.clone(), AppPreferences::default());
    let effects = controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
    assert_eq!(controller.mode(), LaunchMode::Display);
    assert_eq!(
        controller.resolved_url().unwrap().as_str(),
        "https://eggs.example/promo"
    );
    assert!(!effects
        .iter()
        .any(|e| matches!(e, LauncherEffect::FetchConfig(_))));

    // Consumed: the stored copy is gone for the next launch.
    assert_eq!(store.load_state().unwrap().temp_url, None);
}
