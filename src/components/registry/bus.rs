use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 256;

/// Notification that an entity's state changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChanged {
    pub entity_id: String,
}

/// Host-wide change notification bus
#[derive(Clone)]
pub struct StateBus {
    tx: broadcast::Sender<StateChanged>,
}

impl Default for StateBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl StateBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Announce that `entity_id` changed
    pub fn notify(&self, entity_id: &str) {
        // No listeners is not an error
        let _ = self.tx.send(StateChanged {
            entity_id: entity_id.to_string(),
        });
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Call `callback` every time `entity_id` changes.
    ///
    /// The listener runs until the returned [`Subscription`] is dropped or
    /// unsubscribed. Notifications lost to lag are folded into one call.
    pub fn track_state_change<F>(&self, entity_id: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let entity_id = entity_id.into();
        let mut rx = self.tx.subscribe();
        let callback = Arc::new(callback);
        let watched = entity_id.clone();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) if change.entity_id == watched => callback(),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(entity_id = %watched, skipped, "State listener lagged behind");
                        callback();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(entity_id = %watched, "State listener stopped");
        });

        Subscription {
            entity_id,
            task: Some(task),
        }
    }
}

/// Registration of a state change listener; released on drop
pub struct Subscription {
    entity_id: String,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop listening
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(entity_id = %self.entity_id, "Released state subscription");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
