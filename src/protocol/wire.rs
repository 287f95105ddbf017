// Wire payloads - request and reply bodies for the master's endpoints
//
// Reply types carry only their payload fields; the status envelope fields
// sit beside them in the same JSON object and are checked separately.

use crate::crypto::PublicKey;
use crate::protocol::InstanceMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

// ============================================================================
// HANDSHAKE
// ============================================================================

/// Phase 1 request: announce ourselves
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSyn {
    pub client_name: String,
    pub public_key: PublicKey,
    pub port: u16,
}

/// Phase 1 reply: the master's key and our assigned identity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthAck {
    pub public_key: PublicKey,
    pub migration_priority: i32,
    pub client_identifier: String,
}

/// Phase 2 request and reply: a channel key sealed for the other side
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExchange {
    /// base64 sealed box
    pub key: String,
}

/// Phase 3 plaintext sent under the master's channel key
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub secret: String,
    pub client_identifier: String,
}

/// Phase 3 request and reply body: channel ciphertext
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSealed {
    pub payload: String,
}

/// Phase 3 plaintext received under our channel key
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthGrant {
    pub session_token: String,
}

// ============================================================================
// PING
// ============================================================================

/// Reply to a poll of the master
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    /// Aggregate fingerprint of every sync entry in the cluster; absent
    /// when the master did not report one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_var_hash: Option<String>,
    #[serde(default)]
    pub messages: Vec<InstanceMessage>,
    #[serde(default)]
    pub connected_clients: Vec<String>,
}

// ============================================================================
// SYNC ENTRIES
// ============================================================================

/// A named value one instance publishes for the cluster
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSyncEntry {
    pub key: String,
    pub value: Value,
    /// Hex SHA-256 of the serialized value
    #[serde(default)]
    pub hash: String,
}

impl NetworkSyncEntry {
    /// Create an entry and compute its hash
    pub fn new(key: &str, value: Value) -> Self {
        let hash = Self::hash_value(&value);
        Self {
            key: key.to_string(),
            value,
            hash,
        }
    }

    /// Create an entry from any serializable value
    pub fn from_typed<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(key, serde_json::to_value(value)?))
    }

    /// Deserialize the value into `T`
    pub fn value_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.value.clone()).ok()
    }

    /// Hash used to detect changed values cheaply
    pub fn hash_value(value: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Full table of the master's sync entries
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDump {
    #[serde(default)]
    pub entries: Vec<NetworkSyncEntry>,
}

/// Periodic push of this instance's own entries
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientVarsPush {
    pub entries: Vec<NetworkSyncEntry>,
}

// ============================================================================
// DETAILS
// ============================================================================

/// What the master knows about one instance, including its client vars
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDetails {
    pub client_identifier: String,
    pub client_name: String,
    #[serde(default)]
    pub migration_priority: i32,
    #[serde(default)]
    pub client_vars: Vec<NetworkSyncEntry>,
}

impl InstanceDetails {
    /// Look up one of the instance's vars
    pub fn var(&self, key: &str) -> Option<&NetworkSyncEntry> {
        self.client_vars.iter().find(|e| e.key == key)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsReply {
    pub details: InstanceDetails,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsListReply {
    #[serde(default)]
    pub details: Vec<InstanceDetails>,
}

// ============================================================================
// PUBLISHED CLIENT STATE
// ============================================================================

/// Manifest entry for one installed plugin
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    pub author: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
}

/// Published once after connecting under `startupTimestamp`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetHealthData {
    pub client_id: String,
    pub client_name: String,
    /// Unix seconds
    pub startup_timestamp: i64,
}
