/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Network reachability monitor. A background thread probes the config
//! endpoint's host and reports status transitions onto the launch event
//! channel for the process lifetime.

use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, warn};
use url::Url;

use crate::launcher::LauncherEvent;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Satisfied,
    Unsatisfied,
}

/// One-shot reachability probe against `host:port`.
pub fn probe(host: &str, port: u16) -> ConnectivityStatus {
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return ConnectivityStatus::Unsatisfied;
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok() {
            return ConnectivityStatus::Satisfied;
        }
    }
    ConnectivityStatus::Unsatisfied
}

/// Probe target derived from the config endpoint URL.
pub fn probe_target(endpoint: &str) -> Option<(String, u16)> {
    let url = Url::parse(endpoint).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default().unwrap_or(443);
    Some((host, port))
}

pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    /// Emit the current status immediately, then keep watching for
    /// transitions. Stops when the receiving side goes away.
    pub fn spawn(host: String, port: u16, events: Sender<LauncherEvent>) {
        let spawned = thread::Builder::new()
            .name("connectivity-monitor".into())
            .spawn(move || {
                let mut last: Option<ConnectivityStatus> = None;
                loop {
                    let status = probe(&host, port);
                    if last != Some(status) {
                        debug!("connectivity transition: {status:?}");
                        last = Some(status);
                        let satisfied = status == ConnectivityStatus::Satisfied;
                        if events
                            .send(LauncherEvent::ConnectivityChanged { satisfied })
                            .is_err()
                        {
                            return;
                        }
                    }
                    thread::sleep(PROBE_INTERVAL);
                }
            });
        if let Err(e) = spawned {
            warn!("Could not spawn connectivity monitor: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_target_from_endpoint() {
        assert_eq!(
            probe_target("https://cfg.example/decide"),
            Some(("cfg.example".to_string(), 443))
        );
        assert_eq!(
            probe_target("http://cfg.example:8080/x"),
            Some(("cfg.example".to_string(), 8080))
        );
        assert_eq!(probe_target("not a url"), None);
    }

    #[test]
    fn test_unresolvable_host_is_unsatisfied() {
        assert_eq!(
            probe("host.invalid.", 443),
            ConnectivityStatus::Unsatisfied
        );
    }
}
