// Client module - THE CONNECTOR
// Lifecycle, collaborators and the public request surface

mod builder;
mod config;
mod connector;
mod nodes;

pub use builder::ClientBuilder;
pub use config::ClientConfig;
pub use connector::{NetworkClient, WeakNetworkClient};
pub use nodes::{
    DetachedHost, HostState, InstanceAuthority, NetworkNode, NodeRegistry, RosterNode,
    RosterProvider, GET_PLAYER, GET_PLAYERS,
};

use crate::handshake::HandshakeError;
use crate::transport::{LinkError, TransportError};
use thiserror::Error;

/// Errors surfaced by the network client
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Client already started")]
    AlreadyStarted,

    #[error("Client not connected")]
    NotConnected,

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
