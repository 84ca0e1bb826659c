//! Subscriber channels used by every registry in the core.
//!
//! Each registry owns an [`EventChannel`] and emits an event only after a
//! mutation has succeeded; failed operations leave state untouched and fire
//! nothing. The GUI subscribes once per registry and drains the receivers on
//! its own context.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Multi-subscriber event fan-out.
///
/// Subscribers that drop their receiver are pruned on the next `emit`.
#[derive(Debug)]
pub struct EventChannel<E: Clone> {
    senders: Vec<UnboundedSender<E>>,
}

// Manual impl: a derived Default would demand `E: Default`, which event
// enums do not implement.
impl<E: Clone> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> EventChannel<E> {
    /// Create an empty channel with no subscribers.
    pub fn new() -> Self {
        Self {
            senders: Vec::new(),
        }
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&mut self) -> UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn emit(&mut self, event: E) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.senders.len()
    }
}
