//! Notifications emitted while synchronizing.

use tokio::sync::mpsc;

/// An event published to the [`EventSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Records were written and merged into the index.
    ItemsChanged { count: usize },
    /// A multi-delete finished another chunk.
    DeleteProgress { completed: usize, total: usize },
}

impl SyncEvent {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::ItemsChanged { .. } => "itemsChanged",
            SyncEvent::DeleteProgress { .. } => "deleteProgress",
        }
    }
}

/// Receiver of sync events. Must not block.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: SyncEvent);
}

/// Forwards events into a channel. A closed receiver drops them.
impl EventSink for mpsc::UnboundedSender<SyncEvent> {
    fn notify(&self, event: SyncEvent) {
        if self.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.notify(SyncEvent::DeleteProgress {
            completed: 1,
            total: 3,
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name(), "deleteProgress");
        assert_eq!(
            event,
            SyncEvent::DeleteProgress {
                completed: 1,
                total: 3
            }
        );

        drop(rx);
        tx.notify(SyncEvent::ItemsChanged { count: 2 });
    }
}
