// Pending Replies - the awaitable side of a registration

use crate::protocol::InstanceMessage;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// How an outstanding request ended
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// A matching reply arrived
    Replied(InstanceMessage),
    /// The TTL elapsed, or capacity pressure evicted the entry
    Expired,
    /// The correlator was cleared or dropped (e.g. on disconnect)
    Cancelled,
}

impl ReplyOutcome {
    /// The reply, if one arrived
    pub fn message(&self) -> Option<&InstanceMessage> {
        match self {
            Self::Replied(message) => Some(message),
            _ => None,
        }
    }

    pub fn into_message(self) -> Option<InstanceMessage> {
        match self {
            Self::Replied(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_replied(&self) -> bool {
        matches!(self, Self::Replied(_))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

/// Future resolving exactly once with the outcome of a registration
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<ReplyOutcome>,
}

impl PendingReply {
    pub(crate) fn new(rx: oneshot::Receiver<ReplyOutcome>) -> Self {
        Self { rx }
    }
}

impl Future for PendingReply {
    type Output = ReplyOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Completion dropped without firing: the table went away
            Poll::Ready(Err(_)) => Poll::Ready(ReplyOutcome::Cancelled),
            Poll::Pending => Poll::Pending,
        }
    }
}
