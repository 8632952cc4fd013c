/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Launch-state persistence backed by redb.
//!
//! One string-keyed table holds the JSON-encoded [`PersistedLaunchState`]
//! and the serialized cookie session snapshot; a second holds small
//! identity values such as the stable install id. Every mutation is its
//! own transaction, so a crash can never leave a half-written state.

pub mod types;

use std::fmt;
use std::path::PathBuf;

use redb::{ReadableDatabase, ReadableTable};
use uuid::Uuid;

use types::{PersistedLaunchState, SessionSnapshot};

const FLAGS_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("launch_flags");
const IDENTITY_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("identity");

const LAUNCH_STATE_KEY: &str = "launch_state";
const SESSION_DATA_KEY: &str = "saved_session_data";
const INSTALL_ID_KEY: &str = "af_id";

/// Keys owned by the local record store (batches, weights, encyclopedia).
/// The launch core shares the backing database with that collaborator and
/// must never touch its rows.
pub const RESERVED_RECORD_KEYS: [&str; 4] =
    ["batches", "weights", "unlockedBreeds", "lastUnlockDay"];

#[derive(Debug)]
pub enum LaunchStoreError {
    Io(String),
    Redb(String),
    Serde(String),
    ReservedKey(String),
}

impl fmt::Display for LaunchStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchStoreError::Io(e) => write!(f, "io error: {e}"),
            LaunchStoreError::Redb(e) => write!(f, "store error: {e}"),
            LaunchStoreError::Serde(e) => write!(f, "serialization error: {e}"),
            LaunchStoreError::ReservedKey(k) => {
                write!(f, "key '{k}' belongs to the local record store")
            },
        }
    }
}

impl std::error::Error for LaunchStoreError {}

/// Persistent key-value store for launch flags and the cookie session.
pub struct LaunchStore {
    db: redb::Database,
}

impl LaunchStore {
    /// Open or create a launch store at the given directory.
    pub fn open(base_dir: PathBuf) -> Result<Self, LaunchStoreError> {
        std::fs::create_dir_all(&base_dir)
            .map_err(|e| LaunchStoreError::Io(format!("Failed to create dir: {e}")))?;
        let db = redb::Database::create(base_dir.join("launch.redb"))
            .map_err(|e| LaunchStoreError::Redb(format!("{e}")))?;
        Ok(Self { db })
    }

    /// Load the persisted launch state, defaulting every flag when the
    /// store is fresh.
    pub fn load_state(&self) -> Result<PersistedLaunchState, LaunchStoreError> {
        match self.read_raw(FLAGS_TABLE, LAUNCH_STATE_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LaunchStoreError::Serde(format!("{e}"))),
            None => Ok(PersistedLaunchState::default()),
        }
    }

    /// Write the full launch state in one transaction.
    pub fn save_state(&self, state: &PersistedLaunchState) -> Result<(), LaunchStoreError> {
        let bytes =
            serde_json::to_vec(state).map_err(|e| LaunchStoreError::Serde(format!("{e}")))?;
        self.write_raw(FLAGS_TABLE, LAUNCH_STATE_KEY, &bytes)
    }

    /// Load the persisted cookie session snapshot, empty when absent.
    pub fn load_session(&self) -> Result<SessionSnapshot, LaunchStoreError> {
        match self.read_raw(FLAGS_TABLE, SESSION_DATA_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LaunchStoreError::Serde(format!("{e}"))),
            None => Ok(SessionSnapshot::default()),
        }
    }

    pub fn save_session(&self, snapshot: &SessionSnapshot) -> Result<(), LaunchStoreError> {
        let bytes =
            serde_json::to_vec(snapshot).map_err(|e| LaunchStoreError::Serde(format!("{e}")))?;
        self.write_raw(FLAGS_TABLE, SESSION_DATA_KEY, &bytes)
    }

    /// Return the stable install identifier, generating and persisting a
    /// fresh one on first access.
    pub fn install_id(&self) -> Result<String, LaunchStoreError> {
        if let Some(bytes) = self.read_raw(IDENTITY_TABLE, INSTALL_ID_KEY)? {
            if let Ok(id) = String::from_utf8(bytes) {
                return Ok(id);
            }
        }
        let id = Uuid::new_v4().to_string();
        self.write_raw(IDENTITY_TABLE, INSTALL_ID_KEY, id.as_bytes())?;
        Ok(id)
    }

    /// Raw access for auxiliary values. Refuses the record-store keys:
    /// the CRUD screens own those rows.
    pub fn put_value(&self, key: &str, value: &[u8]) -> Result<(), LaunchStoreError> {
        Self::check_reserved(key)?;
        self.write_raw(FLAGS_TABLE, key, value)
    }

    pub fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>, LaunchStoreError> {
        Self::check_reserved(key)?;
        self.read_raw(FLAGS_TABLE, key)
    }

    fn check_reserved(key: &str) -> Result<(), LaunchStoreError> {
        if RESERVED_RECORD_KEYS.contains(&key) {
            return Err(LaunchStoreError::ReservedKey(key.to_string()));
        }
        Ok(())
    }

    fn read_raw(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<Vec<u8>>, LaunchStoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| LaunchStoreError::Redb(format!("{e}")))?;
        let Ok(table) = read_txn.open_table(table_def) else {
            // Table not created yet; nothing has been written.
            return Ok(None);
        };
        let guard = table
            .get(key)
            .map_err(|e| LaunchStoreError::Redb(format!("{e}")))?;
        Ok(guard.map(|g| g.value().to_vec()))
    }

    fn write_raw(
        &self,
        table_def: redb::TableDefinition<&str, &[u8]>,
        key: &str,
        value: &[u8],
    ) -> Result<(), LaunchStoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| LaunchStoreError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(|e| LaunchStoreError::Redb(format!("{e}")))?;
            table
                .insert(key, value)
                .map_err(|e| LaunchStoreError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| LaunchStoreError::Redb(format!("{e}")))?;
        Ok(())
    }
}
