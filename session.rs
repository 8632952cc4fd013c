/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Browser session controller: navigation policy, popup lifecycle,
//! redirect-loop guard, auth challenges, and cookie session persistence
//! for the surface arena. One controller implements [`BrowserPolicy`]
//! and is shared by every surface, so popups inherit exactly the same
//! behavior as the primary.

use std::rc::Rc;
use std::sync::Arc;

use log::{debug, warn};
use url::Url;

use crate::persistence::LaunchStore;
use crate::surface::{BrowserSurface, SurfaceConfig, SurfaceHost, SurfaceId, SurfaceStack};

/// Maximum server redirects tolerated on one provisional navigation
/// chain before loading is halted.
pub const REDIRECT_LIMIT: u32 = 70;

/// Injected after every completed navigation: disables pinch zoom and
/// pins form-input font size so embedded content behaves like a native
/// screen.
pub const ZOOM_LOCK_SCRIPT: &str = r#"let metaElement = document.createElement('meta');
metaElement.name = 'viewport';
metaElement.content = 'width=device-width, initial-scale=1.0, maximum-scale=1.0, user-scalable=no';
document.getElementsByTagName('head')[0].appendChild(metaElement);
let styleElement = document.createElement('style');
styleElement.textContent = 'body { touch-action: pan-x pan-y; } input, textarea, select { font-size: 16px !important; }';
document.getElementsByTagName('head')[0].appendChild(styleElement);
document.addEventListener('gesturestart', function(e) { e.preventDefault(); });"#;

const BLANK_SENTINEL: &str = "about:blank";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Load in-surface.
    Allow,
    /// Deflected to the platform external handler; never loaded in-surface.
    OpenExternal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    TooManyRedirects,
    Other(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthChallenge {
    ServerTrust { has_trust: bool },
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthDisposition {
    UseServerTrust,
    PerformDefaultHandling,
}

/// Delegate surface callbacks, implemented once by the session
/// controller and injected into each surface.
pub trait BrowserPolicy {
    fn decide_navigation(&mut self, surface: SurfaceId, url: &Url) -> NavigationDecision;
    fn authenticate(&mut self, challenge: &AuthChallenge) -> AuthDisposition;
    fn on_popup_requested(&mut self, parent: SurfaceId, requested: Option<&str>) -> SurfaceId;
    fn on_redirect(&mut self, surface: SurfaceId, new_url: Url);
    fn on_load_failed(&mut self, surface: SurfaceId, error: LoadError);
    fn on_load_finished(&mut self, surface: SurfaceId);
}

pub struct BrowserSessionController {
    stack: SurfaceStack,
    store: Arc<LaunchStore>,
    host: Rc<dyn SurfaceHost>,
}

impl BrowserSessionController {
    /// Create the primary surface and restore the persisted cookie
    /// session into it before any navigation happens.
    pub fn new(store: Arc<LaunchStore>, host: Rc<dyn SurfaceHost>) -> Self {
        let mut primary = BrowserSurface::new(SurfaceConfig::default());
        match store.load_session() {
            Ok(snapshot) => primary.cookie_store_mut().restore(&snapshot),
            Err(e) => warn!("Could not restore cookie session: {e}"),
        }
        Self {
            stack: SurfaceStack::new(primary),
            store,
            host,
        }
    }

    pub fn stack(&self) -> &SurfaceStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut SurfaceStack {
        &mut self.stack
    }

    pub fn primary_id(&self) -> SurfaceId {
        self.stack.primary_id()
    }

    /// Route a navigation request through policy and perform the result.
    pub fn navigate(&mut self, surface: SurfaceId, url: Url) {
        match self.decide_navigation(surface, &url) {
            NavigationDecision::Allow => {
                if let Some(surface) = self.stack.get_mut(surface) {
                    surface.load(url);
                }
            },
            NavigationDecision::OpenExternal => {},
        }
    }

    /// Remove every secondary surface (top first), reloading the primary
    /// at `url` when given. With no secondaries present, perform a single
    /// in-surface back navigation instead, if one is available.
    pub fn clear_secondary_surfaces(&mut self, url: Option<Url>) {
        if self.stack.secondary_count() > 0 {
            while let Some(surface) = self.stack.pop_secondary() {
                self.host.surface_detached(surface.id());
            }
            if let Some(url) = url {
                self.stack.primary_mut().load(url);
            }
            return;
        }
        if self.stack.primary().can_go_back() {
            self.stack.primary_mut().go_back();
        }
    }

    /// Edge-swipe on a surface: back-navigate if possible, otherwise
    /// dismiss that one secondary. Exactly one navigation action per
    /// gesture.
    pub fn edge_swipe(&mut self, surface: SurfaceId) {
        if let Some(target) = self.stack.get_mut(surface) {
            if target.go_back() {
                return;
            }
        }
        if self.stack.is_top_secondary(surface) {
            if let Some(dismissed) = self.stack.pop_secondary() {
                self.host.surface_detached(dismissed.id());
            }
        }
    }

    /// Serialize the surface's cookies into the grouped snapshot and
    /// persist it. Called on every server redirect, a natural checkpoint
    /// for freshly set session cookies.
    pub fn checkpoint_session(&self, surface: SurfaceId) {
        let Some(surface) = self.stack.get(surface) else {
            return;
        };
        let snapshot = surface.cookie_store().snapshot();
        if let Err(e) = self.store.save_session(&snapshot) {
            warn!("Could not persist cookie session: {e}");
        }
    }

    fn popup_navigation_is_valid(requested: Option<&str>) -> Option<Url> {
        let raw = requested?;
        if raw.is_empty() || raw == BLANK_SENTINEL {
            return None;
        }
        Url::parse(raw).ok()
    }
}

impl BrowserPolicy for BrowserSessionController {
    fn decide_navigation(&mut self, surface: SurfaceId, url: &Url) -> NavigationDecision {
        match url.scheme() {
            "http" | "https" => {
                if let Some(surface) = self.stack.get_mut(surface) {
                    surface.set_last_valid_url(url.clone());
                    // A fresh policy-approved navigation starts a new
                    // provisional chain.
                    surface.reset_redirect_count();
                }
                NavigationDecision::Allow
            },
            scheme => {
                debug!("deflecting {scheme} URL to platform handler");
                self.host.open_external(url);
                NavigationDecision::OpenExternal
            },
        }
    }

    fn authenticate(&mut self, challenge: &AuthChallenge) -> AuthDisposition {
        match challenge {
            AuthChallenge::ServerTrust { has_trust: true } => AuthDisposition::UseServerTrust,
            _ => AuthDisposition::PerformDefaultHandling,
        }
    }

    fn on_popup_requested(&mut self, _parent: SurfaceId, requested: Option<&str>) -> SurfaceId {
        // Popups share the primary's fixed configuration.
        let mut secondary = BrowserSurface::new(*self.stack.primary().config());
        secondary.register_back_gesture();
        let navigation = Self::popup_navigation_is_valid(requested);
        if let Some(url) = &navigation {
            secondary.set_last_valid_url(url.clone());
            secondary.load(url.clone());
        }
        let id = self.stack.push_secondary(secondary);
        self.host.surface_attached(id);
        if navigation.is_none() {
            debug!("popup created without navigation (empty or blank target)");
        }
        id
    }

    fn on_redirect(&mut self, surface_id: SurfaceId, new_url: Url) {
        let Some(surface) = self.stack.get_mut(surface_id) else {
            return;
        };
        surface.apply_server_redirect(new_url);
        let count = surface.bump_redirect_count();
        if count > REDIRECT_LIMIT {
            warn!("redirect limit exceeded ({count}); halting navigation");
            surface.stop_loading();
            if let Some(fallback) = surface.last_valid_url().cloned() {
                surface.load(fallback);
            }
            return;
        }
        self.checkpoint_session(surface_id);
    }

    fn on_load_failed(&mut self, surface_id: SurfaceId, error: LoadError) {
        match error {
            LoadError::TooManyRedirects => {
                let Some(surface) = self.stack.get_mut(surface_id) else {
                    return;
                };
                if let Some(fallback) = surface.last_valid_url().cloned() {
                    surface.load(fallback);
                }
            },
            LoadError::Other(reason) => {
                debug!("surface load failed: {reason}");
            },
        }
    }

    fn on_load_finished(&mut self, surface_id: SurfaceId) {
        if let Some(surface) = self.stack.get_mut(surface_id) {
            surface.finish_loading();
            surface.inject_script(ZOOM_LOCK_SCRIPT);
        }
    }
}
