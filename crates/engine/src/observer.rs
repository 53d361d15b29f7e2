//! Observability hooks for controller runs.

use std::fmt;

use jalan_types::ControllerEvent;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Receives controller events as they happen.
///
/// Notification is one-way and synchronous; implementations should hand the
/// event off quickly rather than block the run.
pub trait RunObserver: Send + Sync {
    fn notify(&self, event: &ControllerEvent);
}

/// Forwards events to a Tokio channel.
///
/// Events are dropped silently once the receiver is gone.
#[derive(Clone)]
pub struct ChannelObserver {
    sender: UnboundedSender<ControllerEvent>,
}

impl ChannelObserver {
    pub fn new(sender: UnboundedSender<ControllerEvent>) -> Self {
        Self { sender }
    }

    /// Observer plus the receiving end of its channel.
    pub fn channel() -> (Self, UnboundedReceiver<ControllerEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl RunObserver for ChannelObserver {
    fn notify(&self, event: &ControllerEvent) {
        let _ = self.sender.send(event.clone());
    }
}

impl fmt::Debug for ChannelObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelObserver")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}
