use dashmap::DashMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    PriceLists,
    Vouchers,
}

/// What changed in a published view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewUpdate {
    pub topic: Topic,
    /// Sequence of the snapshot now visible.
    pub seq: u64,
    /// Number of entities in the snapshot.
    pub count: usize,
    /// Status writes the cycle applied before publishing.
    pub changes: usize,
}

/// Broadcast hub for view updates per topic.
pub struct NotifyHub {
    channels: DashMap<Topic, broadcast::Sender<ViewUpdate>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to updates for a topic. Creates the channel if needed.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<ViewUpdate> {
        let sender = self
            .channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send an update. No-op if nobody is listening.
    pub fn send(&self, update: ViewUpdate) {
        if let Some(sender) = self.channels.get(&update.topic) {
            let _ = sender.send(update);
        }
    }
}
