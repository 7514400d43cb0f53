//! Change feed for observing committed writes.
//!
//! The change feed emits one event per object touched by a committed write
//! transaction, in commit order. Events are emitted only after commit;
//! rolled-back transactions produce nothing.
//!
//! # Usage
//!
//! ```rust,ignore
//! let receiver = db.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = receiver.recv() {
//!         println!("{} {:?} {}", event.object_type, event.change_type, event.id);
//!     }
//! });
//! ```

use crate::object::ObjectId;
use crate::value::PrimaryKey;
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// Type of change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// Object was created.
    Insert,
    /// Object existed before the transaction and was modified.
    Update,
    /// Object existed before the transaction and was deleted.
    Delete,
}

/// A single change event from the change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Sequence number of the commit.
    pub sequence: u64,
    /// Object type name.
    pub object_type: String,
    /// Object identity.
    pub id: ObjectId,
    /// Primary key, if the type declares one.
    pub primary_key: Option<PrimaryKey>,
    /// Type of change.
    pub change_type: ChangeType,
}

impl ChangeEvent {
    /// Creates an event.
    pub fn new(
        sequence: u64,
        object_type: impl Into<String>,
        id: ObjectId,
        primary_key: Option<PrimaryKey>,
        change_type: ChangeType,
    ) -> Self {
        Self {
            sequence,
            object_type: object_type.into(),
            id,
            primary_key,
            change_type,
        }
    }
}

/// Distributes committed changes to subscribers.
///
/// The change feed:
/// - Emits only committed operations
/// - Preserves commit order
/// - Supports multiple subscribers
/// - Keeps a bounded history for polling
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    history: RwLock<Vec<ChangeEvent>>,
    max_history: usize,
}

impl ChangeFeed {
    /// Creates a change feed with the default history limit.
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a change feed with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
        }
    }

    /// Subscribes to all future change events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits the events of one commit.
    pub fn emit_batch(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        {
            let mut history = self.history.write();
            history.extend(events.iter().cloned());
            if history.len() > self.max_history {
                let excess = history.len() - self.max_history;
                history.drain(0..excess);
            }
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| events.iter().all(|e| tx.send(e.clone()).is_ok()));
    }

    /// Returns events with sequence > `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest sequence number in history.
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().last().map_or(0, |e| e.sequence)
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.history_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn insert(seq: u64) -> ChangeEvent {
        ChangeEvent::new(seq, "Task", ObjectId::new(), Some(PrimaryKey::Int(seq as i64)), ChangeType::Insert)
    }

    #[test]
    fn emit_and_receive() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();

        let event = insert(1);
        feed.emit_batch(vec![event.clone()]);

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received, event);
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.emit_batch(vec![insert(1)]);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn poll_from_cursor() {
        let feed = ChangeFeed::new();
        for i in 1..=5 {
            feed.emit_batch(vec![insert(i)]);
        }

        let events = feed.poll(2, 10);
        let seqs: Vec<_> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![3, 4, 5]);
        assert_eq!(feed.poll(0, 2).len(), 2);
    }

    #[test]
    fn history_truncation() {
        let feed = ChangeFeed::with_max_history(5);
        for i in 1..=10 {
            feed.emit_batch(vec![insert(i)]);
        }

        assert_eq!(feed.history_len(), 5);
        assert_eq!(feed.poll(0, 100)[0].sequence, 6);
        assert_eq!(feed.latest_sequence(), 10);
    }

    #[test]
    fn threaded_subscribe() {
        let feed = Arc::new(ChangeFeed::new());
        let rx = feed.subscribe();

        let feed_clone = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            feed_clone.emit_batch(vec![insert(1), insert(1)]);
        });

        assert_eq!(rx.recv_timeout(Duration::from_millis(500)).unwrap().sequence, 1);
        assert_eq!(rx.recv_timeout(Duration::from_millis(500)).unwrap().sequence, 1);
        handle.join().unwrap();
    }
}
