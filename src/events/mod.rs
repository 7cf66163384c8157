//! Event system for chunk lifecycle notifications
//!
//! Hosts subscribe to learn when a chunk file is complete (for upload or
//! indexing) and when the pipeline stops or fails.

pub mod types;

pub use types::ChunkEvent;

use tokio::sync::broadcast;
use tracing::trace;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event bus for broadcasting chunk events
///
/// # Example
///
/// ```no_run
/// use chunked_encoder::events::{ChunkEvent, EventBus};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ChunkEvent::PipelineStopped { total_frames: 0, chunks: 1 });
///
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         println!("Received event: {:?}", event);
///     }
/// });
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChunkEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// Events published with no subscriber are dropped.
    pub fn publish(&self, event: ChunkEvent) {
        trace!("Publishing {}", event.event_name());
        let _ = self.tx.send(event);
    }

    /// Subscribe to events
    ///
    /// A subscriber that falls more than the channel capacity behind receives
    /// a `Lagged` error and misses the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChunkEvent> {
        self.tx.subscribe()
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
