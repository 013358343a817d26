//! Data-update notifications

use tokio::sync::broadcast;

use super::policy::CacheType;

const CHANNEL_CAPACITY: usize = 64;

/// Notification that the application changed data of one type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUpdated {
    pub cache_type: CacheType,
}

impl DataUpdated {
    /// Event name, e.g. `tasksUpdated`
    pub fn event_name(&self) -> String {
        self.cache_type.update_event()
    }
}

/// Broadcast channel of [`DataUpdated`] events
#[derive(Debug, Clone)]
pub struct UpdateSignal {
    tx: broadcast::Sender<DataUpdated>,
}

impl Default for UpdateSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Announce an update; returns how many listeners received it
    pub fn emit(&self, cache_type: CacheType) -> usize {
        let event = DataUpdated { cache_type };
        log::debug!("Emitting {}", event.event_name());
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataUpdated> {
        self.tx.subscribe()
    }
}
