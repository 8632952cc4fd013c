/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Embedded browser surfaces and the surface arena.
//!
//! A [`BrowserSurface`] models one embedded webview deterministically:
//! committed URL, back/forward history, cookie store, load state. The
//! [`SurfaceStack`] owns exactly one long-lived primary surface plus an
//! ordered list of secondary (popup) surfaces with strict LIFO
//! create/destroy semantics, so the visual stacking and back-navigation
//! contracts are independently testable.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use url::Url;

use crate::persistence::types::{CookieRecord, SessionSnapshot};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct SurfaceId(u64);

impl SurfaceId {
    fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Fixed configuration applied to every surface, primary and secondary,
/// so popups behave identically to the surface that spawned them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub allows_inline_media_playback: bool,
    pub javascript_enabled: bool,
    pub javascript_can_open_windows: bool,
    pub requires_user_action_for_media: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            allows_inline_media_playback: true,
            javascript_enabled: true,
            javascript_can_open_windows: true,
            requires_user_action_for_media: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Stopped,
}

/// In-memory cookie store for one surface, grouped the same way the
/// persisted snapshot is (domain, then cookie name).
#[derive(Clone, Debug, Default)]
pub struct CookieStore {
    cookies: BTreeMap<String, BTreeMap<String, CookieRecord>>,
}

impl CookieStore {
    pub fn set_cookie(&mut self, domain: &str, name: &str, record: CookieRecord) {
        self.cookies
            .entry(domain.to_string())
            .or_default()
            .insert(name.to_string(), record);
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<&CookieRecord> {
        self.cookies.get(domain).and_then(|per| per.get(name))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.cookies.clone()
    }

    /// Re-insert every persisted cookie. Called on the primary surface
    /// before its first navigation; this is the only continuity mechanism
    /// across process restarts.
    pub fn restore(&mut self, snapshot: &SessionSnapshot) {
        for (domain, per_domain) in snapshot {
            for (name, record) in per_domain {
                self.set_cookie(domain, name, record.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Deterministic model of one embedded webview.
pub struct BrowserSurface {
    id: SurfaceId,
    config: SurfaceConfig,
    history: Vec<Url>,
    history_index: Option<usize>,
    load_state: LoadState,
    /// Server redirects observed on the current provisional chain.
    redirect_count: u32,
    /// Last URL accepted by navigation policy before any redirect chain.
    last_valid_url: Option<Url>,
    cookie_store: CookieStore,
    /// Scripts injected after completed navigations, in order.
    injected_scripts: Vec<&'static str>,
    back_gesture_registered: bool,
}

impl BrowserSurface {
    pub fn new(config: SurfaceConfig) -> Self {
        Self {
            id: SurfaceId::next(),
            config,
            history: Vec::new(),
            history_index: None,
            load_state: LoadState::Idle,
            redirect_count: 0,
            last_valid_url: None,
            cookie_store: CookieStore::default(),
            injected_scripts: Vec::new(),
            back_gesture_registered: false,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn current_url(&self) -> Option<&Url> {
        self.history_index.and_then(|i| self.history.get(i))
    }

    pub fn load(&mut self, url: Url) {
        if let Some(index) = self.history_index {
            self.history.truncate(index + 1);
        }
        self.history.push(url);
        self.history_index = Some(self.history.len() - 1);
        self.load_state = LoadState::Loading;
    }

    /// The server moved the provisional navigation to a new URL without a
    /// new top-level request.
    pub fn apply_server_redirect(&mut self, url: Url) {
        if let Some(index) = self.history_index {
            self.history[index] = url;
        } else {
            self.history.push(url);
            self.history_index = Some(0);
        }
    }

    pub fn reload(&mut self) {
        self.load_state = LoadState::Loading;
    }

    pub fn stop_loading(&mut self) {
        self.load_state = LoadState::Stopped;
    }

    pub fn finish_loading(&mut self) {
        self.load_state = LoadState::Idle;
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn can_go_back(&self) -> bool {
        matches!(self.history_index, Some(i) if i > 0)
    }

    pub fn go_back(&mut self) -> bool {
        match self.history_index {
            Some(i) if i > 0 => {
                self.history_index = Some(i - 1);
                self.load_state = LoadState::Loading;
                true
            },
            _ => false,
        }
    }

    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    pub fn bump_redirect_count(&mut self) -> u32 {
        self.redirect_count += 1;
        self.redirect_count
    }

    pub fn reset_redirect_count(&mut self) {
        self.redirect_count = 0;
    }

    pub fn last_valid_url(&self) -> Option<&Url> {
        self.last_valid_url.as_ref()
    }

    pub fn set_last_valid_url(&mut self, url: Url) {
        self.last_valid_url = Some(url);
    }

    pub fn cookie_store(&self) -> &CookieStore {
        &self.cookie_store
    }

    pub fn cookie_store_mut(&mut self) -> &mut CookieStore {
        &mut self.cookie_store
    }

    pub fn inject_script(&mut self, script: &'static str) {
        self.injected_scripts.push(script);
    }

    pub fn injected_scripts(&self) -> &[&'static str] {
        &self.injected_scripts
    }

    pub fn register_back_gesture(&mut self) {
        self.back_gesture_registered = true;
    }

    pub fn has_back_gesture(&self) -> bool {
        self.back_gesture_registered
    }
}

/// Primary surface plus the LIFO arena of secondary surfaces.
pub struct SurfaceStack {
    primary: BrowserSurface,
    secondaries: Vec<BrowserSurface>,
}

impl SurfaceStack {
    pub fn new(primary: BrowserSurface) -> Self {
        Self {
            primary,
            secondaries: Vec::new(),
        }
    }

    pub fn primary(&self) -> &BrowserSurface {
        &self.primary
    }

    pub fn primary_mut(&mut self) -> &mut BrowserSurface {
        &mut self.primary
    }

    pub fn primary_id(&self) -> SurfaceId {
        self.primary.id()
    }

    pub fn secondary_count(&self) -> usize {
        self.secondaries.len()
    }

    pub fn push_secondary(&mut self, surface: BrowserSurface) -> SurfaceId {
        let id = surface.id();
        self.secondaries.push(surface);
        id
    }

    /// Remove the top secondary surface. Destruction is strictly LIFO.
    pub fn pop_secondary(&mut self) -> Option<BrowserSurface> {
        self.secondaries.pop()
    }

    pub fn top_secondary_id(&self) -> Option<SurfaceId> {
        self.secondaries.last().map(BrowserSurface::id)
    }

    pub fn is_top_secondary(&self, id: SurfaceId) -> bool {
        self.top_secondary_id() == Some(id)
    }

    pub fn get(&self, id: SurfaceId) -> Option<&BrowserSurface> {
        if self.primary.id() == id {
            return Some(&self.primary);
        }
        self.secondaries.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut BrowserSurface> {
        if self.primary.id() == id {
            return Some(&mut self.primary);
        }
        self.secondaries.iter_mut().find(|s| s.id() == id)
    }

    /// Ids of all secondaries, bottom to top.
    pub fn secondary_ids(&self) -> Vec<SurfaceId> {
        self.secondaries.iter().map(BrowserSurface::id).collect()
    }
}

/// Platform integration seam for surface lifecycle side effects.
/// Mirrors the role the platform window plays for an embedder: the
/// controller drives policy, the host performs native actions.
pub trait SurfaceHost {
    /// Hand a non-web URL (dialer, mail, store link) to the platform.
    fn open_external(&self, url: &Url);
    /// A secondary surface was attached full-bleed above the primary.
    fn surface_attached(&self, _id: SurfaceId) {}
    /// A secondary surface was removed from the stack.
    fn surface_detached(&self, _id: SurfaceId) {}
}
