/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Command-line surface for the launch shell.

use std::path::PathBuf;

use bpaf::{construct, long, OptionParser, Parser};

#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Preferences file overriding the default location.
    pub prefs: Option<PathBuf>,
    /// State directory overriding the preferences value.
    pub data_dir: Option<PathBuf>,
    /// JSON file standing in for the attribution callback.
    pub attribution: Option<PathBuf>,
    /// Deep-link URL delivered at startup.
    pub deep_link: Option<String>,
    /// Skip the connectivity probe and report the network down.
    pub offline: bool,
}

pub fn cli_parser() -> OptionParser<CliArgs> {
    let prefs = long("prefs")
        .help("Path to the preferences file")
        .argument::<PathBuf>("FILE")
        .optional();
    let data_dir = long("data-dir")
        .help("Directory for persisted launch state")
        .argument::<PathBuf>("DIR")
        .optional();
    let attribution = long("attribution")
        .help("JSON file with the attribution payload")
        .argument::<PathBuf>("FILE")
        .optional();
    let deep_link = long("deep-link")
        .help("Open this URL directly, bypassing remote config")
        .argument::<String>("URL")
        .optional();
    let offline = long("offline")
        .help("Treat the network as unavailable")
        .switch();
    construct!(CliArgs {
        prefs,
        data_dir,
        attribution,
        deep_link,
        offline,
    })
    .to_options()
    .descr("Launch-mode resolver and embedded browser session shell")
    .version(env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpaf::Args;

    #[test]
    fn test_defaults() {
        static EMPTY: [&str; 0] = [];
        let args = cli_parser().run_inner(Args::from(&EMPTY)).unwrap();
        assert!(args.prefs.is_none());
        assert!(args.data_dir.is_none());
        assert!(args.attribution.is_none());
        assert!(args.deep_link.is_none());
        assert!(!args.offline);
    }

    #[test]
    fn test_full_invocation() {
        let args = cli_parser()
            .run_inner(Args::from(&[
                "--prefs",
                "prefs.toml",
                "--data-dir",
                "/tmp/state",
                "--attribution",
                "payload.json",
                "--deep-link",
                "https://eggs.example/push",
                "--offline",
            ]))
            .unwrap();
        assert_eq!(args.prefs, Some(PathBuf::from("prefs.toml")));
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/state")));
        assert_eq!(args.attribution, Some(PathBuf::from("payload.json")));
        assert_eq!(args.deep_link.as_deref(), Some("https://eggs.example/push"));
        assert!(args.offline);
    }
}
