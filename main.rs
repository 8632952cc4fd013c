/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Binary entry point: wires the CLI, preferences, launch store and
//! event channel together, resolves a launch mode, and on `Display`
//! stands up the browser session controller at the resolved URL.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use url::Url;

use eggshell::attribution::AttributionBridge;
use eggshell::cli;
use eggshell::connectivity::{self, ConnectivityMonitor};
use eggshell::launcher::{LaunchController, LaunchMode, LaunchRuntime, LauncherEvent, LauncherHost};
use eggshell::notifications::PromptOutcome;
use eggshell::persistence::LaunchStore;
use eggshell::prefs::AppPreferences;
use eggshell::remote_config::ConfigClient;
use eggshell::session::BrowserSessionController;
use eggshell::surface::{SurfaceHost, SurfaceId};

const RESOLUTION_WAIT: Duration = Duration::from_secs(15);

struct ShellSurfaceHost;

impl SurfaceHost for ShellSurfaceHost {
    fn open_external(&self, url: &Url) {
        info!("deflecting to platform handler: {url}");
    }

    fn surface_attached(&self, id: SurfaceId) {
        info!("secondary surface attached: {id:?}");
    }

    fn surface_detached(&self, id: SurfaceId) {
        info!("secondary surface detached: {id:?}");
    }
}

struct ShellHost {
    store: Arc<LaunchStore>,
}

impl LauncherHost for ShellHost {
    fn mode_changed(&mut self, mode: LaunchMode, url: Option<&Url>) {
        match mode {
            LaunchMode::Display => {
                let Some(url) = url else {
                    warn!("Display resolved without a URL");
                    return;
                };
                info!("display session at {url}");
                let mut session =
                    BrowserSessionController::new(self.store.clone(), Rc::new(ShellSurfaceHost));
                let primary = session.primary_id();
                session.navigate(primary, url.clone());
            },
            LaunchMode::Fallback => info!("native utility surface"),
            LaunchMode::Offline => info!("offline screen (retry available)"),
            LaunchMode::Loading => {},
        }
    }

    fn show_notification_prompt(&mut self) -> PromptOutcome {
        // Headless shell has no dialog to show.
        info!("notification prompt suppressed (headless)");
        PromptOutcome::Declined
    }

    fn register_for_push(&mut self) {
        info!("registering for remote push");
    }
}

fn run(args: cli::CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut prefs = AppPreferences::load(args.prefs.as_deref())?;
    if let Some(dir) = args.data_dir {
        prefs.data_dir = Some(dir);
    }
    let store = Arc::new(LaunchStore::open(prefs.data_dir())?);
    let controller = LaunchController::new(store.clone(), prefs.clone());

    let (tx, rx) = crossbeam_channel::unbounded();

    if args.offline {
        tx.send(LauncherEvent::ConnectivityChanged { satisfied: false })?;
    } else if let Some((host, port)) = connectivity::probe_target(&prefs.config_endpoint) {
        ConnectivityMonitor::spawn(host, port, tx.clone());
    } else {
        warn!("Config endpoint has no probe target; assuming network up");
        tx.send(LauncherEvent::ConnectivityChanged { satisfied: true })?;
    }

    if let Some(link) = args.deep_link {
        tx.send(LauncherEvent::DeepLinkReceived(link))?;
    }

    let bridge = AttributionBridge::new(tx.clone());
    match &args.attribution {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            match serde_json::from_str(&raw) {
                Ok(values) => bridge.conversion_data_received(values),
                Err(e) => bridge.conversion_data_failed(format!("payload file malformed: {e}")),
            }
        },
        None => {
            // No attribution source wired in; the empty-payload path
            // still resolves a mode.
            bridge.conversion_data_received(std::collections::BTreeMap::new());
        },
    }

    let client = ConfigClient::new()?;
    let host = ShellHost { store };
    let mut runtime = LaunchRuntime::new(controller, rx, tx, client, host);
    let mode = runtime.run_until_resolved(RESOLUTION_WAIT);
    info!("launch mode resolved: {mode:?}");
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cli::cli_parser().run();
    if let Err(e) = run(args) {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}
