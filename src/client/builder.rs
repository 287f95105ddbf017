// Client Builder
// Wires a ClientConfig and the host's collaborators into a NetworkClient

use crate::client::{
    ClientConfig, ClientError, DetachedHost, HostState, NetworkClient, NetworkNode, NodeRegistry,
    RosterNode, RosterProvider,
};
use crate::transport::{HttpTransport, Transport};
use std::sync::Arc;

/// Builder for [`NetworkClient`]
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    nodes: Vec<Arc<dyn NetworkNode>>,
    roster: Option<Arc<dyn RosterProvider>>,
    host: Option<Arc<dyn HostState>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            nodes: Vec::new(),
            roster: None,
            host: None,
        }
    }

    /// Use a specific transport instead of HTTP to `base_url`
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register a node; nodes receive messages in registration order
    pub fn node(mut self, node: Arc<dyn NetworkNode>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Answer roster queries from other instances with this provider
    pub fn roster(mut self, roster: Arc<dyn RosterProvider>) -> Self {
        self.roster = Some(roster);
        self
    }

    pub fn host(mut self, host: Arc<dyn HostState>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn build(self) -> Result<NetworkClient, ClientError> {
        self.config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(
                &self.config.base_url,
                self.config.transport.clone(),
            )?),
        };

        let nodes = NodeRegistry::new();
        if let Some(roster) = &self.roster {
            nodes.register(Arc::new(RosterNode::new(roster.clone())));
        }
        for node in self.nodes {
            nodes.register(node);
        }

        let host = self.host.unwrap_or_else(|| Arc::new(DetachedHost));

        Ok(NetworkClient::assemble(
            self.config,
            transport,
            nodes,
            self.roster,
            host,
        ))
    }
}
