// Client Configuration
// Everything the host supplies at construction time

use crate::client::{ClientError, InstanceAuthority};
use crate::correlator::CorrelatorConfig;
use crate::sync::PollPolicy;
use crate::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a network client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Master base URL; endpoint paths are appended to it
    pub base_url: String,
    /// Shared cluster secret presented during authentication
    pub secret: String,
    /// Name announced to the master
    pub client_name: String,
    /// Port this instance serves players on
    pub port: u16,
    /// Migration priority assumed until the master assigns one
    pub migration_priority_seed: i32,
    /// Role handed to network nodes after connecting
    pub authority: InstanceAuthority,
    /// Interval between pushes of the local sync entries
    pub sync_push_interval_ms: u64,
    pub correlator: CorrelatorConfig,
    pub poll: PollPolicy,
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8880".to_string(),
            secret: String::new(),
            client_name: "cluster-link-client".to_string(),
            port: 7777,
            migration_priority_seed: 0,
            authority: InstanceAuthority::Client,
            sync_push_interval_ms: 5_000,
            correlator: CorrelatorConfig::default(),
            poll: PollPolicy::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str, secret: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            secret: secret.to_string(),
            ..Self::default()
        }
    }

    pub fn with_client_name(mut self, name: &str) -> Self {
        self.client_name = name.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_migration_priority_seed(mut self, seed: i32) -> Self {
        self.migration_priority_seed = seed;
        self
    }

    pub fn with_authority(mut self, authority: InstanceAuthority) -> Self {
        self.authority = authority;
        self
    }

    pub fn with_sync_push_interval(mut self, interval: Duration) -> Self {
        self.sync_push_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_correlator(mut self, correlator: CorrelatorConfig) -> Self {
        self.correlator = correlator;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn sync_push_interval(&self) -> Duration {
        Duration::from_millis(self.sync_push_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.is_empty() {
            return Err(ClientError::InvalidConfig("base_url cannot be empty".to_string()));
        }
        if self.secret.is_empty() {
            return Err(ClientError::InvalidConfig("secret cannot be empty".to_string()));
        }
        if self.client_name.is_empty() {
            return Err(ClientError::InvalidConfig("client_name cannot be empty".to_string()));
        }
        if self.sync_push_interval_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "sync_push_interval_ms cannot be 0".to_string(),
            ));
        }
        if self.correlator.capacity == 0 {
            return Err(ClientError::InvalidConfig(
                "correlator capacity cannot be 0".to_string(),
            ));
        }
        self.transport.validate()?;
        Ok(())
    }
}
