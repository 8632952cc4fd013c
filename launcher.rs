/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Launch-mode resolution: a single reducer consumes typed events from
//! the connectivity monitor, the attribution bridge, push-token refresh
//! and user retry, and decides which of the four launch modes the
//! session lands in. The reducer mutates controller plus store state and
//! returns effects; the runtime executes those effects (network fetch on
//! a worker thread, host callbacks) and feeds outcomes back over the
//! same channel.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use time::OffsetDateTime;
use url::Url;

use crate::attribution::AttributionPayload;
use crate::connectivity::{self, ConnectivityStatus};
use crate::notifications::{GateDecision, PromptOutcome};
use crate::persistence::types::{PersistedLaunchState, PersistedMode};
use crate::persistence::LaunchStore;
use crate::prefs::AppPreferences;
use crate::remote_config::{ConfigClient, ConfigError, ConfigRequest, RemoteDecision};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchMode {
    /// Initial state while attribution and config are outstanding.
    Loading,
    /// Remote-served session: the resolved URL drives the browser stack.
    Display,
    /// Native utility surface; no remote content this session.
    Fallback,
    /// No network, but a remote session was established previously.
    Offline,
}

/// Typed channel messages into the reducer. Each collaborator callback
/// becomes exactly one of these, delivered at most once per occurrence.
#[derive(Clone, Debug)]
pub enum LauncherEvent {
    ConnectivityChanged { satisfied: bool },
    AttributionSuccess(AttributionPayload),
    AttributionFailure(String),
    PushTokenRefreshed(String),
    DeepLinkReceived(String),
    ConfigOutcome(Result<RemoteDecision, ConfigError>),
    PromptResolved(PromptOutcome),
    RetryRequested,
}

/// Side effects requested by the reducer; the runtime performs them.
#[derive(Clone, Debug)]
pub enum LauncherEffect {
    /// Announce the (possibly repeated) mode; the resolved URL rides on
    /// the controller. Re-emitted when a deep link retargets `Display`.
    ModeChanged(LaunchMode),
    FetchConfig(ConfigRequest),
    ShowNotificationPrompt,
    RegisterForPush,
    CheckConnectivity,
}

pub struct LaunchController {
    store: Arc<LaunchStore>,
    prefs: AppPreferences,
    state: PersistedLaunchState,
    mode: LaunchMode,
    resolved_url: Option<Url>,
    attribution: Option<AttributionPayload>,
    config_in_flight: bool,
    /// True while this session may still resolve a mode; cleared when
    /// `Display` or `Fallback` lands, reopened by retry or reconnect.
    resolution_open: bool,
    prompt_pending: bool,
    prompted_this_session: bool,
    /// Captured before anything persists `has_launched`, so first-run
    /// branches cannot be masked by our own earlier writes.
    was_first_launch: bool,
}

impl LaunchController {
    pub fn new(store: Arc<LaunchStore>, prefs: AppPreferences) -> Self {
        let state = store.load_state().unwrap_or_else(|e| {
            warn!("Could not load launch state, starting fresh: {e}");
            PersistedLaunchState::default()
        });
        let was_first_launch = !state.has_launched;
        Self {
            store,
            prefs,
            state,
            mode: LaunchMode::Loading,
            resolved_url: None,
            attribution: None,
            config_in_flight: false,
            resolution_open: true,
            prompt_pending: false,
            prompted_this_session: false,
            was_first_launch,
        }
    }

    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    pub fn resolved_url(&self) -> Option<&Url> {
        self.resolved_url.as_ref()
    }

    pub fn prefs(&self) -> &AppPreferences {
        &self.prefs
    }

    pub fn state(&self) -> &PersistedLaunchState {
        &self.state
    }

    /// The reducer. `now_unix` is injected so the cooldown gate stays a
    /// pure function of its inputs.
    pub fn handle_event(&mut self, event: LauncherEvent, now_unix: i64) -> Vec<LauncherEffect> {
        match event {
            LauncherEvent::ConnectivityChanged { satisfied } => {
                self.on_connectivity(satisfied, now_unix)
            },
            LauncherEvent::AttributionSuccess(payload) => self.on_attribution(payload, now_unix),
            LauncherEvent::AttributionFailure(reason) => {
                // Failure degrades to success with an empty payload; the
                // organic short-circuit cannot trigger without the flag.
                warn!("Attribution failed, continuing with empty payload: {reason}");
                self.on_attribution(AttributionPayload::empty(), now_unix)
            },
            LauncherEvent::PushTokenRefreshed(token) => self.on_push_token(token),
            LauncherEvent::DeepLinkReceived(raw) => self.on_deep_link(&raw),
            LauncherEvent::ConfigOutcome(result) => self.on_config_outcome(result, now_unix),
            LauncherEvent::PromptResolved(outcome) => self.on_prompt_resolved(outcome, now_unix),
            LauncherEvent::RetryRequested => self.on_retry(),
        }
    }

    fn on_connectivity(&mut self, satisfied: bool, now_unix: i64) -> Vec<LauncherEffect> {
        if !satisfied {
            // Offline is only reachable once a remote session was
            // already established.
            if self.state.app_mode == Some(PersistedMode::Display) {
                return self.set_mode(LaunchMode::Offline);
            }
            return self.enable_fallback();
        }
        if self.resolution_open && !self.config_in_flight && !self.prompt_pending {
            return self.resolve(now_unix);
        }
        vec![]
    }

    fn on_attribution(&mut self, payload: AttributionPayload, now_unix: i64) -> Vec<LauncherEffect> {
        self.attribution = Some(payload);
        // Once a terminal mode is persisted, repeat deliveries must not
        // re-trigger config; only an explicit retry reopens resolution.
        if !self.resolution_open || self.config_in_flight || self.prompt_pending {
            return vec![];
        }
        self.resolve(now_unix)
    }

    fn on_push_token(&mut self, token: String) -> Vec<LauncherEffect> {
        self.state.fcm_token = Some(token);
        self.persist_state();
        // Re-issue the config request only while still resolving; a
        // token refresh after Display/Fallback is persist-only.
        if self.mode == LaunchMode::Loading
            && self.resolution_open
            && !self.config_in_flight
            && !self.prompt_pending
            && self.attribution.is_some()
        {
            return self.request_config();
        }
        vec![]
    }

    fn on_deep_link(&mut self, raw: &str) -> Vec<LauncherEffect> {
        match Url::parse(raw) {
            Ok(url) => {
                self.resolved_url = Some(url);
                self.finish(LaunchMode::Display)
            },
            Err(e) => {
                warn!("Ignoring malformed deep link: {e}");
                vec![]
            },
        }
    }

    fn on_config_outcome(
        &mut self,
        result: Result<RemoteDecision, ConfigError>,
        now_unix: i64,
    ) -> Vec<LauncherEffect> {
        if !self.config_in_flight {
            debug!("dropping stale config outcome");
            return vec![];
        }
        self.config_in_flight = false;
        if !self.resolution_open {
            return vec![];
        }
        match result {
            Ok(decision) if decision.ok => self.on_serve_decision(decision, now_unix),
            Ok(_) => self.enable_fallback(),
            Err(e) => {
                warn!("Config request failed: {e}");
                self.failure_continuity()
            },
        }
    }

    fn on_serve_decision(
        &mut self,
        decision: RemoteDecision,
        now_unix: i64,
    ) -> Vec<LauncherEffect> {
        let parsed = match (decision.url.as_deref(), decision.expires) {
            (Some(raw), Some(expires)) => match Url::parse(raw) {
                Ok(url) => Some((raw.to_string(), url, expires)),
                Err(e) => {
                    warn!("Remote decision carried an unparseable URL: {e}");
                    None
                },
            },
            // ok=true without url+expiry cannot enter Display.
            _ => None,
        };
        let Some((raw, url, expires)) = parsed else {
            return self.failure_continuity();
        };

        self.state.saved_url = Some(raw);
        self.state.saved_expires = Some(expires);
        self.state.app_mode = Some(PersistedMode::Display);
        self.state.has_launched = true;
        self.persist_state();
        self.resolved_url = Some(url);
        let mut effects = self.finish(LaunchMode::Display);

        // First launch still shows the permission prompt, after the
        // session is already on screen.
        if self.was_first_launch
            && !self.prompted_this_session
            && GateDecision::decide(&self.state, now_unix) == GateDecision::Prompt
        {
            self.prompted_this_session = true;
            self.prompt_pending = true;
            effects.push(LauncherEffect::ShowNotificationPrompt);
        }
        effects
    }

    fn on_prompt_resolved(&mut self, outcome: PromptOutcome, now_unix: i64) -> Vec<LauncherEffect> {
        self.prompt_pending = false;
        self.state.last_notification_ask = Some(now_unix);
        let mut effects = Vec::new();
        match outcome {
            PromptOutcome::Accepted => {
                self.state.accepted_notifications = true;
                effects.push(LauncherEffect::RegisterForPush);
            },
            PromptOutcome::Declined => {},
            PromptOutcome::SystemDenied => {
                self.state.accepted_notifications = false;
                self.state.system_close_notifications = true;
            },
        }
        self.persist_state();
        if self.resolution_open && !self.config_in_flight {
            effects.extend(self.request_config());
        }
        effects
    }

    fn on_retry(&mut self) -> Vec<LauncherEffect> {
        if self.config_in_flight {
            return vec![];
        }
        // Retry re-runs the connectivity check; the current mode stays
        // on screen until a new one resolves (never back to Loading).
        self.resolution_open = true;
        vec![LauncherEffect::CheckConnectivity]
    }

    /// One pass over the resolution order: deep-link override, persisted
    /// fallback, first-launch organic short-circuit, permission gate,
    /// config request.
    fn resolve(&mut self, now_unix: i64) -> Vec<LauncherEffect> {
        let Some(payload) = self.attribution.clone() else {
            // Connectivity arrived first; attribution will re-enter.
            return vec![];
        };

        if let Some(raw) = self.state.temp_url.take() {
            // One-shot: cleared the moment it is consumed.
            self.persist_state();
            match Url::parse(&raw) {
                Ok(url) => {
                    self.resolved_url = Some(url);
                    return self.finish(LaunchMode::Display);
                },
                Err(e) => warn!("Ignoring malformed deep-link override: {e}"),
            }
        }

        if self.state.app_mode == Some(PersistedMode::Funtik) {
            return self.finish(LaunchMode::Fallback);
        }

        if self.was_first_launch && payload.is_organic() {
            return self.enable_fallback();
        }

        match GateDecision::decide(&self.state, now_unix) {
            GateDecision::Prompt if !self.prompted_this_session => {
                self.prompted_this_session = true;
                self.prompt_pending = true;
                vec![LauncherEffect::ShowNotificationPrompt]
            },
            _ => self.request_config(),
        }
    }

    fn request_config(&mut self) -> Vec<LauncherEffect> {
        let payload = self
            .attribution
            .clone()
            .unwrap_or_else(AttributionPayload::empty);
        let install_id = self.store.install_id().unwrap_or_else(|e| {
            warn!("Could not read install id: {e}");
            String::new()
        });
        match ConfigRequest::build(
            &self.prefs,
            &payload,
            &install_id,
            self.state.fcm_token.as_deref(),
        ) {
            Ok(request) => {
                self.config_in_flight = true;
                vec![LauncherEffect::FetchConfig(request)]
            },
            Err(e) => {
                warn!("Could not build config request: {e}");
                self.failure_continuity()
            },
        }
    }

    /// Config failed (or was failure-equivalent): best-effort continuity
    /// on a previously saved URL, else fall back for good.
    fn failure_continuity(&mut self) -> Vec<LauncherEffect> {
        if let Some(raw) = self.state.saved_url.clone() {
            match Url::parse(&raw) {
                Ok(url) => {
                    self.resolved_url = Some(url);
                    return self.finish(LaunchMode::Display);
                },
                Err(e) => warn!("Saved URL is unparseable, falling back: {e}"),
            }
        }
        self.enable_fallback()
    }

    fn enable_fallback(&mut self) -> Vec<LauncherEffect> {
        self.state.app_mode = Some(PersistedMode::Funtik);
        self.state.has_launched = true;
        self.persist_state();
        self.finish(LaunchMode::Fallback)
    }

    fn finish(&mut self, mode: LaunchMode) -> Vec<LauncherEffect> {
        self.resolution_open = false;
        self.set_mode(mode)
    }

    fn set_mode(&mut self, mode: LaunchMode) -> Vec<LauncherEffect> {
        self.mode = mode;
        vec![LauncherEffect::ModeChanged(mode)]
    }

    fn persist_state(&self) {
        if let Err(e) = self.store.save_state(&self.state) {
            // Persist failures degrade gracefully; the session continues
            // on in-memory state.
            warn!("Could not persist launch state: {e}");
        }
    }
}

/// Host callbacks the runtime needs from the embedding shell.
pub trait LauncherHost {
    /// A mode resolved (or a deep link retargeted `Display`).
    fn mode_changed(&mut self, mode: LaunchMode, url: Option<&Url>);
    /// Present the permission prompt and block for its outcome.
    fn show_notification_prompt(&mut self) -> PromptOutcome;
    fn register_for_push(&mut self) {}
}

/// Event-loop wrapper: receives [`LauncherEvent`]s, runs the reducer,
/// executes effects. Config fetches run on named worker threads and
/// re-enter through the loopback sender, so the reducer itself never
/// blocks on the network.
pub struct LaunchRuntime<H: LauncherHost> {
    controller: LaunchController,
    events: Receiver<LauncherEvent>,
    loopback: Sender<LauncherEvent>,
    client: ConfigClient,
    host: H,
}

impl<H: LauncherHost> LaunchRuntime<H> {
    pub fn new(
        controller: LaunchController,
        events: Receiver<LauncherEvent>,
        loopback: Sender<LauncherEvent>,
        client: ConfigClient,
        host: H,
    ) -> Self {
        Self {
            controller,
            events,
            loopback,
            client,
            host,
        }
    }

    pub fn controller(&self) -> &LaunchController {
        &self.controller
    }

    /// Pump events until a non-`Loading` mode lands. If nothing arrives
    /// before the deadline, synthesize one attribution failure so the
    /// flow still terminates (empty-payload path), then give the
    /// follow-on config round-trip the same grace period again.
    pub fn run_until_resolved(&mut self, wait: Duration) -> LaunchMode {
        let mut deadline = Instant::now() + wait;
        let mut nudged = false;
        while self.controller.mode() == LaunchMode::Loading {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.dispatch(event),
                Err(RecvTimeoutError::Timeout) => {
                    if nudged {
                        break;
                    }
                    nudged = true;
                    deadline = Instant::now() + wait;
                    self.dispatch(LauncherEvent::AttributionFailure(
                        "attribution deadline elapsed".into(),
                    ));
                },
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.controller.mode()
    }

    /// Keep serving events (deep links, connectivity flips, retries) for
    /// the life of the channel.
    pub fn run(&mut self) {
        while let Ok(event) = self.events.recv() {
            self.dispatch(event);
        }
    }

    pub fn dispatch(&mut self, event: LauncherEvent) {
        let now_unix = OffsetDateTime::now_utc().unix_timestamp();
        for effect in self.controller.handle_event(event, now_unix) {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: LauncherEffect) {
        match effect {
            LauncherEffect::ModeChanged(mode) => {
                let url = self.controller.resolved_url().cloned();
                self.host.mode_changed(mode, url.as_ref());
            },
            LauncherEffect::FetchConfig(request) => {
                let client = self.client.clone();
                let loopback = self.loopback.clone();
                let spawned = thread::Builder::new()
                    .name("config-fetch".into())
                    .spawn(move || {
                        let outcome = client.fetch(&request);
                        let _ = loopback.send(LauncherEvent::ConfigOutcome(outcome));
                    });
                if let Err(e) = spawned {
                    warn!("Could not spawn config fetch: {e}");
                    let _ = self.loopback.send(LauncherEvent::ConfigOutcome(Err(
                        ConfigError::Transport(format!("worker spawn failed: {e}")),
                    )));
                }
            },
            LauncherEffect::ShowNotificationPrompt => {
                let outcome = self.host.show_notification_prompt();
                // Re-enter through the channel to keep reducer ordering.
                let _ = self.loopback.send(LauncherEvent::PromptResolved(outcome));
            },
            LauncherEffect::RegisterForPush => self.host.register_for_push(),
            LauncherEffect::CheckConnectivity => {
                let satisfied = connectivity::probe_target(&self.controller.prefs().config_endpoint)
                    .map(|(host, port)| {
                        connectivity::probe(&host, port) == ConnectivityStatus::Satisfied
                    })
                    .unwrap_or(false);
                let _ = self
                    .loopback
                    .send(LauncherEvent::ConnectivityChanged { satisfied });
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    const NOW: i64 = 1_756_000_000;
    const SERVE_URL: &str = "https://eggs.example/session";

    fn organic_payload() -> AttributionPayload {
        let mut values = BTreeMap::new();
        values.insert("af_status".to_string(), json!("Organic"));
        AttributionPayload::from_map(values)
    }

    fn paid_payload() -> AttributionPayload {
        let mut values = BTreeMap::new();
        values.insert("af_status".to_string(), json!("Non-organic"));
        values.insert("campaign".to_string(), json!("spring_hatch"));
        AttributionPayload::from_map(values)
    }

    fn serve_decision() -> RemoteDecision {
        RemoteDecision {
            ok: true,
            url: Some(SERVE_URL.to_string()),
            expires: Some(NOW + 86_400),
        }
    }

    fn setup(state: PersistedLaunchState) -> (tempfile::TempDir, LaunchController) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LaunchStore::open(dir.path().to_path_buf()).unwrap());
        store.save_state(&state).unwrap();
        let controller = LaunchController::new(store, AppPreferences::default());
        (dir, controller)
    }

    fn decided_state() -> PersistedLaunchState {
        PersistedLaunchState {
            has_launched: true,
            accepted_notifications: true,
            ..Default::default()
        }
    }

    fn fetch_count(effects: &[LauncherEffect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, LauncherEffect::FetchConfig(_)))
            .count()
    }

    #[test]
    fn test_first_launch_organic_lands_in_fallback() {
        let (_dir, mut controller) = setup(PersistedLaunchState::default());
        let effects =
            controller.handle_event(LauncherEvent::AttributionSuccess(organic_payload()), NOW);
        assert_eq!(controller.mode(), LaunchMode::Fallback);
        assert!(effects
            .iter()
            .any(|e| matches!(e, LauncherEffect::ModeChanged(LaunchMode::Fallback))));
        assert_eq!(fetch_count(&effects), 0);
        assert_eq!(controller.state().app_mode, Some(PersistedMode::Funtik));
        assert!(controller.state().has_launched);
    }

    #[test]
    fn test_attribution_failure_cannot_trigger_organic_shortcircuit() {
        // An empty payload carries no af_status, so the first-launch
        // organic branch is unreachable; the flow proceeds to the gate.
        let (_dir, mut controller) = setup(PersistedLaunchState::default());
        let effects =
            controller.handle_event(LauncherEvent::AttributionFailure("sdk timeout".into()), NOW);
        assert_eq!(controller.mode(), LaunchMode::Loading);
        assert!(matches!(
            effects.as_slice(),
            [LauncherEffect::ShowNotificationPrompt]
        ));
    }

    #[test]
    fn test_first_launch_prompt_then_config_then_display() {
        let (_dir, mut controller) = setup(PersistedLaunchState::default());
        let effects =
            controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        assert!(matches!(
            effects.as_slice(),
            [LauncherEffect::ShowNotificationPrompt]
        ));

        let effects = controller.handle_event(
            LauncherEvent::PromptResolved(PromptOutcome::Accepted),
            NOW + 2,
        );
        assert!(effects
            .iter()
            .any(|e| matches!(e, LauncherEffect::RegisterForPush)));
        assert_eq!(fetch_count(&effects), 1);
        assert!(controller.state().accepted_notifications);

        let effects =
            controller.handle_event(LauncherEvent::ConfigOutcome(Ok(serve_decision())), NOW + 5);
        assert_eq!(controller.mode(), LaunchMode::Display);
        assert_eq!(controller.resolved_url().unwrap().as_str(), SERVE_URL);
        assert_eq!(controller.state().app_mode, Some(PersistedMode::Display));
        assert_eq!(controller.state().saved_url.as_deref(), Some(SERVE_URL));
        // Prompt already answered this session, not shown again.
        assert!(!effects
            .iter()
            .any(|e| matches!(e, LauncherEffect::ShowNotificationPrompt)));
    }

    #[test]
    fn test_gate_cooldown_skips_prompt_and_fetches() {
        let state = PersistedLaunchState {
            has_launched: true,
            last_notification_ask: Some(NOW - 1000),
            ..Default::default()
        };
        let (_dir, mut controller) = setup(state);
        let effects =
            controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        assert_eq!(fetch_count(&effects), 1);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, LauncherEffect::ShowNotificationPrompt)));
    }

    #[test]
    fn test_ok_false_persists_fallback() {
        let (_dir, mut controller) = setup(decided_state());
        controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        controller.handle_event(
            LauncherEvent::ConfigOutcome(Ok(RemoteDecision {
                ok: false,
                url: None,
                expires: None,
            })),
            NOW,
        );
        assert_eq!(controller.mode(), LaunchMode::Fallback);
        assert_eq!(controller.state().app_mode, Some(PersistedMode::Funtik));
    }

    #[test]
    fn test_ok_without_url_is_failure_equivalent() {
        let (_dir, mut controller) = setup(decided_state());
        controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        controller.handle_event(
            LauncherEvent::ConfigOutcome(Ok(RemoteDecision {
                ok: true,
                url: None,
                expires: None,
            })),
            NOW,
        );
        // No saved URL to fall back on; never stuck in Loading.
        assert_eq!(controller.mode(), LaunchMode::Fallback);
    }

    #[test]
    fn test_config_failure_reuses_saved_url() {
        let state = PersistedLaunchState {
            saved_url: Some("https://eggs.example/stale".to_string()),
            saved_expires: Some(NOW - 100),
            app_mode: Some(PersistedMode::Display),
            ..decided_state()
        };
        let (_dir, mut controller) = setup(state);
        controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        controller.handle_event(
            LauncherEvent::ConfigOutcome(Err(ConfigError::Status(503))),
            NOW,
        );
        assert_eq!(controller.mode(), LaunchMode::Display);
        assert_eq!(
            controller.resolved_url().unwrap().as_str(),
            "https://eggs.example/stale"
        );
    }

    #[test]
    fn test_persisted_fallback_short_circuits_config() {
        let state = PersistedLaunchState {
            app_mode: Some(PersistedMode::Funtik),
            ..decided_state()
        };
        let (_dir, mut controller) = setup(state);
        let effects =
            controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        assert_eq!(controller.mode(), LaunchMode::Fallback);
        assert_eq!(fetch_count(&effects), 0);
    }

    #[test]
    fn test_temp_url_override_is_one_shot() {
        let state = PersistedLaunchState {
            temp_url: Some("https://eggs.example/push-target".to_string()),
            ..decided_state()
        };
        let (_dir, mut controller) = setup(state);
        let effects =
            controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        assert_eq!(controller.mode(), LaunchMode::Display);
        assert_eq!(
            controller.resolved_url().unwrap().as_str(),
            "https://eggs.example/push-target"
        );
        assert_eq!(fetch_count(&effects), 0);
        // Cleared in memory and in the store before anything else ran.
        assert_eq!(controller.state().temp_url, None);

        // A retry resolves normally now that the override is spent.
        controller.handle_event(LauncherEvent::RetryRequested, NOW + 10);
        let effects = controller.handle_event(
            LauncherEvent::ConnectivityChanged { satisfied: true },
            NOW + 11,
        );
        assert_eq!(fetch_count(&effects), 1);
    }

    #[test]
    fn test_repeated_attribution_never_refetches_after_terminal() {
        let (_dir, mut controller) = setup(decided_state());
        controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        controller.handle_event(LauncherEvent::ConfigOutcome(Ok(serve_decision())), NOW);
        assert_eq!(controller.mode(), LaunchMode::Display);

        for _ in 0..3 {
            let effects =
                controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
            assert!(effects.is_empty());
        }
    }

    #[test]
    fn test_push_token_refresh_refetches_only_while_loading() {
        let (_dir, mut controller) = setup(decided_state());
        controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        controller.handle_event(
            LauncherEvent::ConfigOutcome(Err(ConfigError::Transport("down".into()))),
            NOW,
        );
        assert_eq!(controller.mode(), LaunchMode::Fallback);

        let effects =
            controller.handle_event(LauncherEvent::PushTokenRefreshed("tok-1".into()), NOW);
        assert_eq!(fetch_count(&effects), 0);
        assert_eq!(controller.state().fcm_token.as_deref(), Some("tok-1"));
    }

    #[test]
    fn test_push_token_refresh_waits_for_in_flight_fetch() {
        let (_dir, mut controller) = setup(decided_state());
        controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        assert_eq!(controller.mode(), LaunchMode::Loading);

        // The first fetch is in flight: a token refresh persists but
        // must not start a second request.
        let effects =
            controller.handle_event(LauncherEvent::PushTokenRefreshed("tok-2".into()), NOW);
        assert_eq!(fetch_count(&effects), 0);
        assert_eq!(controller.state().fcm_token.as_deref(), Some("tok-2"));
    }

    #[test]
    fn test_offline_requires_established_display_session() {
        let state = PersistedLaunchState {
            app_mode: Some(PersistedMode::Display),
            saved_url: Some(SERVE_URL.to_string()),
            ..decided_state()
        };
        let (_dir, mut controller) = setup(state);
        controller.handle_event(LauncherEvent::ConnectivityChanged { satisfied: false }, NOW);
        assert_eq!(controller.mode(), LaunchMode::Offline);

        // Without a persisted Display session, loss of network falls
        // back instead.
        let (_dir2, mut fresh) = setup(decided_state());
        fresh.handle_event(LauncherEvent::ConnectivityChanged { satisfied: false }, NOW);
        assert_eq!(fresh.mode(), LaunchMode::Fallback);
    }

    #[test]
    fn test_reconnect_after_offline_resolves_again() {
        let state = PersistedLaunchState {
            app_mode: Some(PersistedMode::Display),
            saved_url: Some(SERVE_URL.to_string()),
            ..decided_state()
        };
        let (_dir, mut controller) = setup(state);
        controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        controller.handle_event(
            LauncherEvent::ConfigOutcome(Err(ConfigError::Transport("down".into()))),
            NOW,
        );
        controller.handle_event(LauncherEvent::ConnectivityChanged { satisfied: false }, NOW);
        assert_eq!(controller.mode(), LaunchMode::Offline);

        let effects = controller.handle_event(LauncherEvent::RetryRequested, NOW + 60);
        assert!(matches!(
            effects.as_slice(),
            [LauncherEffect::CheckConnectivity]
        ));
        assert_eq!(controller.mode(), LaunchMode::Offline);

        let effects = controller.handle_event(
            LauncherEvent::ConnectivityChanged { satisfied: true },
            NOW + 61,
        );
        assert_eq!(fetch_count(&effects), 1);
        controller.handle_event(LauncherEvent::ConfigOutcome(Ok(serve_decision())), NOW + 62);
        assert_eq!(controller.mode(), LaunchMode::Display);
    }

    #[test]
    fn test_deep_link_retargets_display() {
        let (_dir, mut controller) = setup(decided_state());
        controller.handle_event(LauncherEvent::AttributionSuccess(paid_payload()), NOW);
        controller.handle_event(LauncherEvent::ConfigOutcome(Ok(serve_decision())), NOW);

        let effects = controller.handle_event(
            LauncherEvent::DeepLinkReceived("https://eggs.example/push".into()),
            NOW + 5,
        );
        assert!(effects
            .iter()
            .any(|e| matches!(e, LauncherEffect::ModeChanged(LaunchMode::Display))));
        assert_eq!(
            controller.resolved_url().unwrap().as_str(),
            "https://eggs.example/push"
        );
    }

    // Any event order terminates: once Display or Fallback is reached,
    // no later event (short of an explicit retry) drags the controller
    // back to Loading.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_mode_never_reenters_loading(choices in proptest::collection::vec(0u8..7, 1..24)) {
            let (_dir, mut controller) = setup(decided_state());
            let mut seen_terminal = false;
            for (step, choice) in choices.into_iter().enumerate() {
                let now = NOW + step as i64;
                let event = match choice {
                    0 => LauncherEvent::AttributionSuccess(paid_payload()),
                    1 => LauncherEvent::AttributionFailure("lost".into()),
                    2 => LauncherEvent::ConfigOutcome(Ok(serve_decision())),
                    3 => LauncherEvent::ConfigOutcome(Err(ConfigError::Status(500))),
                    4 => LauncherEvent::ConnectivityChanged { satisfied: step % 2 == 0 },
                    5 => LauncherEvent::PushTokenRefreshed(format!("tok-{step}")),
                    _ => LauncherEvent::RetryRequested,
                };
                let _ = controller.handle_event(event, now);
                if seen_terminal {
                    prop_assert_ne!(controller.mode(), LaunchMode::Loading);
                }
                if controller.mode() != LaunchMode::Loading {
                    seen_terminal = true;
                }
            }
        }
    }
}
