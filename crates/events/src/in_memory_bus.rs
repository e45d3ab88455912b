//! Process-local delivery fan-out, used by tests and single-node setups.

use std::sync::{Mutex, mpsc};

use crate::bus::{EventBus, Subscription};
use crate::topic::Delivery;

#[derive(Debug, thiserror::Error)]
pub enum InMemoryBusError {
    #[error("delivery fan-out lock poisoned")]
    Poisoned,
}

/// Copies every delivery into one channel per live subscription.
///
/// Publishing never blocks on a slow reader. A subscription whose receiver
/// was dropped is forgotten on the next publish.
#[derive(Debug)]
pub struct InMemoryEventBus<M = Delivery> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subscribers = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        // Poisoned: the subscription is handed out but stays silent.
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        Subscription::new(rx)
    }
}
