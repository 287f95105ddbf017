// Sync Store - locally-owned key/value state replicated to the cluster
//
// This instance is the only writer of its own entries. Local reads never
// touch the network. Remote entries are reached through explicit requests
// to the master.

use crate::protocol::{ClientVarsPush, NetworkSyncEntry, SyncDump};
use crate::sync::SyncError;
use crate::transport::{ErrorHandler, MasterLink, Request, StatusEnvelope};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key under which the current round marker is published
pub const ROUND_KEY: &str = "round";
/// Key under which the installed plugin manifest is published
pub const PLUGINS_KEY: &str = "plugins";
/// Key under which startup health data is published
pub const STARTUP_KEY: &str = "startupTimestamp";

/// Locally-owned sync entries plus remote queries against the master
#[derive(Clone)]
pub struct SyncStore {
    local: Arc<RwLock<BTreeMap<String, NetworkSyncEntry>>>,
    link: MasterLink,
}

impl SyncStore {
    pub fn new(link: MasterLink) -> Self {
        Self {
            local: Arc::new(RwLock::new(BTreeMap::new())),
            link,
        }
    }

    // ========================================================================
    // LOCAL ENTRIES
    // ========================================================================

    /// Upsert a locally-owned entry; visible to local readers immediately
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), SyncError> {
        let entry = NetworkSyncEntry::from_typed(key, value)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;
        self.set_entry(entry);
        Ok(())
    }

    /// Upsert a prepared entry
    pub fn set_entry(&self, entry: NetworkSyncEntry) {
        self.local.write().insert(entry.key.clone(), entry);
    }

    /// Read a local entry as `T`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.local.read().get(key).and_then(|e| e.value_as())
    }

    /// Read a local entry as stored
    pub fn entry(&self, key: &str) -> Option<NetworkSyncEntry> {
        self.local.read().get(key).cloned()
    }

    /// Drop a local entry
    pub fn remove(&self, key: &str) -> Option<NetworkSyncEntry> {
        self.local.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.local.read().contains_key(key)
    }

    /// All local entries, ordered by key
    pub fn entries(&self) -> Vec<NetworkSyncEntry> {
        self.local.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.local.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.read().is_empty()
    }

    /// Forget every local entry
    pub fn clear(&self) {
        self.local.write().clear();
    }

    /// Fingerprint over every local key and value hash
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in self.local.read().values() {
            hasher.update(entry.key.as_bytes());
            hasher.update(b":");
            hasher.update(entry.hash.as_bytes());
            hasher.update(b";");
        }
        hex::encode(hasher.finalize())
    }

    // ========================================================================
    // REMOTE ENTRIES
    // ========================================================================

    /// Current value of one entry on the master; `None` on any failure
    pub async fn request_remote<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let request = Request::get("/sync").with_query("key", key);
        let entry: NetworkSyncEntry = self
            .link
            .request(request, &ErrorHandler::quiet("sync::request_remote"))
            .await?;
        entry.value_as()
    }

    /// Push one entry to the master; returns whether it was accepted
    pub async fn set_remote<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let entry = match NetworkSyncEntry::from_typed(key, value) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(key, %error, "sync value not serializable");
                return false;
            }
        };

        let body = match serde_json::to_string(&entry) {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(key, %error, "sync entry not serializable");
                return false;
            }
        };

        let request = Request::post("/sync", body).with_query("key", key);
        self.link
            .request::<StatusEnvelope>(request, &ErrorHandler::log("sync::set_remote"))
            .await
            .map(|status| status.successful)
            .unwrap_or(false)
    }

    /// The master's full table; empty on any failure
    pub async fn dump_all_remote(&self) -> Vec<NetworkSyncEntry> {
        self.link
            .get::<SyncDump>("/sync", &ErrorHandler::log("sync::dump_all_remote"))
            .await
            .map(|dump| dump.entries)
            .unwrap_or_default()
    }

    /// Publish every local entry as this client's vars
    pub async fn push(&self, client_identifier: &str) -> bool {
        let body = ClientVarsPush {
            entries: self.entries(),
        };
        let path = format!("/client/{}/vars", client_identifier);

        self.link
            .post::<StatusEnvelope, _>(&path, &body, &ErrorHandler::quiet("sync::push"))
            .await
            .is_some()
    }
}
