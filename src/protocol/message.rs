// Instance Messages - the unit of cluster messaging
//
// Messages are created by the sender and immutable once sent. The master
// queues them for their targets and delivers them in ping replies.

use crate::crypto::short_token;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Suffix appended to a request subject to form its reply subject
pub const REPLY_SUFFIX: &str = "Res";

/// Unique identifier attached to an outbound message
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(String);

impl ReferenceId {
    /// Generate a new random reference id
    pub fn generate() -> Self {
        Self(short_token(12))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReferenceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ReferenceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a message is meant for
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MessageTarget {
    /// Every connected instance
    Broadcast,
    /// One instance by client identifier
    Direct { receiver: String },
}

/// A message exchanged between instances through the master
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMessage {
    reference_id: ReferenceId,
    subject: String,
    #[serde(default)]
    sender: String,
    target: MessageTarget,
    #[serde(default)]
    payload: Value,
}

impl InstanceMessage {
    /// Create a message for every instance
    pub fn broadcast(subject: &str, payload: Value) -> Self {
        Self::new(subject, payload, MessageTarget::Broadcast)
    }

    /// Create a message for a single instance
    pub fn direct(subject: &str, payload: Value, receiver: &str) -> Self {
        Self::new(
            subject,
            payload,
            MessageTarget::Direct {
                receiver: receiver.to_string(),
            },
        )
    }

    fn new(subject: &str, payload: Value, target: MessageTarget) -> Self {
        Self {
            reference_id: ReferenceId::generate(),
            subject: subject.to_string(),
            sender: String::new(),
            target,
            payload,
        }
    }

    /// Use an explicit reference id instead of a generated one
    pub fn with_reference_id(mut self, reference_id: impl Into<ReferenceId>) -> Self {
        self.reference_id = reference_id.into();
        self
    }

    /// Stamp the sending instance (done by the client before posting)
    pub fn with_sender(mut self, sender: &str) -> Self {
        self.sender = sender.to_string();
        self
    }

    /// Build the reply to this message: same reference id, reply subject,
    /// addressed to the original sender
    pub fn reply(&self, payload: Value) -> Self {
        Self {
            reference_id: self.reference_id.clone(),
            subject: self.reply_subject(),
            sender: String::new(),
            target: MessageTarget::Direct {
                receiver: self.sender.clone(),
            },
            payload,
        }
    }

    /// Subject a reply to this message carries by default
    pub fn reply_subject(&self) -> String {
        format!("{}{}", self.subject, REPLY_SUFFIX)
    }

    pub fn reference_id(&self) -> &ReferenceId {
        &self.reference_id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn target(&self) -> &MessageTarget {
        &self.target
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Deserialize the payload into `T`
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }

    /// Take ownership of the payload
    pub fn into_payload(self) -> Value {
        self.payload
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self.target, MessageTarget::Broadcast)
    }

    /// Whether `client_id` should see this message
    pub fn is_addressed_to(&self, client_id: &str) -> bool {
        match &self.target {
            MessageTarget::Broadcast => true,
            MessageTarget::Direct { receiver } => receiver == client_id,
        }
    }
}
