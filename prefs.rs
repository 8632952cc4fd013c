/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Application preferences: the fixed device/store metadata carried on
//! every config request, plus local paths. Loaded from a TOML file with
//! per-field defaults so a missing or partial file still yields a usable
//! configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_ENDPOINT: &str = "https://eggmastterpro.com/config.php";
const DEFAULT_BUNDLE_ID: &str = "com.eggmaster.pro";
const DEFAULT_OS_TAG: &str = "iOS";
const DEFAULT_STORE_ID: &str = "id6753349610";

#[derive(Debug)]
pub enum PrefsError {
    Io(String),
    Parse(String),
}

impl fmt::Display for PrefsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefsError::Io(e) => write!(f, "preferences io error: {e}"),
            PrefsError::Parse(e) => write!(f, "preferences parse error: {e}"),
        }
    }
}

impl std::error::Error for PrefsError {}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AppPreferences {
    pub config_endpoint: String,
    pub bundle_id: String,
    pub os_tag: String,
    pub store_id: String,
    pub firebase_project_id: Option<String>,
    /// BCP-47-ish locale override; when absent the process locale is used.
    pub locale: Option<String>,
    /// Launch-store directory override.
    pub data_dir: Option<PathBuf>,
}

impl Default for AppPreferences {
    fn default() -> Self {
        Self {
            config_endpoint: DEFAULT_CONFIG_ENDPOINT.to_string(),
            bundle_id: DEFAULT_BUNDLE_ID.to_string(),
            os_tag: DEFAULT_OS_TAG.to_string(),
            store_id: DEFAULT_STORE_ID.to_string(),
            firebase_project_id: None,
            locale: None,
            data_dir: None,
        }
    }
}

impl AppPreferences {
    /// Load preferences from the given file, or from the default location
    /// when `path` is `None`. A missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, PrefsError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw =
            std::fs::read_to_string(&path).map_err(|e| PrefsError::Io(format!("{e}")))?;
        toml::from_str(&raw).map_err(|e| PrefsError::Parse(format!("{e}")))
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("eggshell").join("prefs.toml"))
    }

    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("eggshell")
    }

    /// Two-letter, uppercased locale tag for the config request body.
    /// Falls back to `EN` when nothing usable is available.
    pub fn resolved_locale(&self) -> String {
        let raw = self
            .locale
            .clone()
            .or_else(|| std::env::var("LANG").ok())
            .unwrap_or_default();
        normalize_locale(&raw)
    }
}

fn normalize_locale(raw: &str) -> String {
    let tag: String = raw
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .take(2)
        .collect();
    if tag.len() == 2 {
        tag.to_ascii_uppercase()
    } else {
        "EN".to_string()
    }
}
