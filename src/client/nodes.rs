// Network Nodes - host collaborators that receive inbound messages
//
// Every registered node sees every message a poll brings back, in arrival
// order. Nodes are told about the client once it has connected and then
// about the authority this instance holds.

use crate::client::{NetworkClient, WeakNetworkClient};
use crate::protocol::{InstanceMessage, PluginInfo};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Subject of a single-player lookup; payload is the player uid
pub const GET_PLAYER: &str = "GetPlayer";
/// Subject of a roster request; payload is ignored
pub const GET_PLAYERS: &str = "GetPlayers";

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Role this instance plays for its nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceAuthority {
    #[default]
    Client,
    Master,
}

/// A component that consumes inbound instance messages
pub trait NetworkNode: Send + Sync {
    /// Called after a successful connect
    fn start_client(&self, _client: &NetworkClient) {}

    /// Called after `start_client` with this instance's authority
    fn reconfigure(&self, _authority: InstanceAuthority) {}

    /// Called once per inbound message
    fn receive(&self, message: &InstanceMessage);
}

/// Source of player data for roster queries
pub trait RosterProvider: Send + Sync {
    /// Every player on this instance
    fn local_players(&self) -> Vec<Value>;

    /// A single local player by uid
    fn find_player(&self, uid: &str) -> Option<Value>;
}

/// Host facts published through the sync store
pub trait HostState: Send + Sync {
    /// Refreshed under `round` on every push tick
    fn round_marker(&self) -> Value {
        Value::Null
    }

    /// Published once under `plugins` after connecting
    fn plugin_manifest(&self) -> Vec<PluginInfo> {
        Vec::new()
    }
}

/// Host with nothing to report
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedHost;

impl HostState for DetachedHost {}

// ============================================================================
// NODE REGISTRY
// ============================================================================

/// Ordered set of registered nodes, shared with the poll loop
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: Arc<RwLock<Vec<Arc<dyn NetworkNode>>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node: Arc<dyn NetworkNode>) {
        self.nodes.write().push(node);
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    // Nodes may register further nodes from a callback
    fn snapshot(&self) -> Vec<Arc<dyn NetworkNode>> {
        self.nodes.read().clone()
    }

    /// Hand one message to every node
    pub fn deliver(&self, message: &InstanceMessage) {
        for node in self.snapshot() {
            node.receive(message);
        }
    }

    pub fn start_client(&self, client: &NetworkClient) {
        for node in self.snapshot() {
            node.start_client(client);
        }
    }

    pub fn reconfigure(&self, authority: InstanceAuthority) {
        for node in self.snapshot() {
            node.reconfigure(authority);
        }
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.len())
            .finish()
    }
}

// ============================================================================
// ROSTER NODE
// ============================================================================

/// Answers `GetPlayer` and `GetPlayers` from a RosterProvider
pub struct RosterNode {
    roster: Arc<dyn RosterProvider>,
    client: RwLock<Option<WeakNetworkClient>>,
}

impl RosterNode {
    pub fn new(roster: Arc<dyn RosterProvider>) -> Self {
        Self {
            roster,
            client: RwLock::new(None),
        }
    }

    fn answer(&self, message: &InstanceMessage) -> Option<Value> {
        match message.subject() {
            GET_PLAYER => {
                let uid = message.payload().as_str()?;
                self.roster.find_player(uid)
            }
            GET_PLAYERS => Some(Value::Array(self.roster.local_players())),
            _ => None,
        }
    }
}

impl NetworkNode for RosterNode {
    fn start_client(&self, client: &NetworkClient) {
        *self.client.write() = Some(client.downgrade());
    }

    fn receive(&self, message: &InstanceMessage) {
        let Some(client) = self.client.read().as_ref().and_then(|c| c.upgrade()) else {
            return;
        };
        // Our own broadcasts come back through the master
        if client.client_identifier().as_deref() == Some(message.sender()) {
            return;
        }
        if !matches!(message.subject(), GET_PLAYER | GET_PLAYERS) {
            return;
        }
        // Unknown players get no answer so another instance can claim them
        let Some(payload) = self.answer(message) else {
            return;
        };

        let reply = message.reply(payload);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(subject = message.subject(), "no runtime to send roster reply");
            return;
        };
        runtime.spawn(async move {
            if let Err(error) = client.send_message(reply).await {
                tracing::warn!(%error, "roster reply failed");
            }
        });
    }
}

impl fmt::Debug for RosterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RosterNode").finish_non_exhaustive()
    }
}
