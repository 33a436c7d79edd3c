//! Queue-backed subscriptions.
//!
//! Instead of running a callback, a channel subscription pushes each event
//! into a bounded queue the consumer drains at its own pace. A full queue
//! shows up in the publisher's error list under the subscription key and
//! the event is not retried. A queue whose receiver was dropped is reported
//! once and then unsubscribed.

use crate::handler::{Handler, HandlerResult};
use crate::types::Event;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a queue-backed subscriber could not take an event.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelDeliveryError {
    #[error("subscriber queue is full")]
    Full,

    #[error("subscriber queue is disconnected")]
    Disconnected,
}

/// Handler half of a channel subscription.
pub(crate) struct ChannelHandler {
    sender: Sender<Event>,
}

impl Handler for ChannelHandler {
    fn handle(&self, event: &Event) -> HandlerResult {
        match self.sender.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Box::new(ChannelDeliveryError::Full)),
            Err(TrySendError::Disconnected(_)) => Err(Box::new(ChannelDeliveryError::Disconnected)),
        }
    }
}

/// Create the handler and receiving handle for a new channel subscription.
///
/// A zero `buffer_size` is raised to one; a rendezvous queue would reject
/// every `try_send` that finds no receiver already waiting.
pub(crate) fn pair(key: String, path: String, buffer_size: usize) -> (ChannelHandler, ChannelSubscription) {
    let (sender, receiver) = bounded(buffer_size.max(1));
    (
        ChannelHandler { sender },
        ChannelSubscription {
            key,
            path,
            receiver,
        },
    )
}

/// Receiving end of a channel subscription.
pub struct ChannelSubscription {
    /// Key to pass to `unsubscribe`.
    pub key: String,
    /// Path the subscription was registered on.
    pub path: String,
    /// Channel to receive events.
    pub receiver: Receiver<Event>,
}

impl ChannelSubscription {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<Event, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<Event, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<Event, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl std::fmt::Debug for ChannelSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSubscription")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("pending", &self.receiver.len())
            .finish()
    }
}
