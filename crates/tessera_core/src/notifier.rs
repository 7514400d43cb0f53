//! Commit notification delivery.
//!
//! Commits are queued while the committing thread still holds the write
//! lock, so the queue is always in commit order. Whichever thread finds the
//! queue idle drains it: change feed first, then every registered observer.
//! A commit made from inside an observer callback is queued and delivered
//! by the outer drain loop once the callback returns.

use crate::change_feed::{ChangeEvent, ChangeFeed};
use crate::store::Snapshot;
use crate::types::SequenceNumber;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::warn;

/// A committed transaction as seen by observers.
#[derive(Debug, Clone)]
pub(crate) struct CommitInfo {
    pub seq: SequenceNumber,
    pub events: Vec<ChangeEvent>,
    /// State right after the commit.
    pub snapshot: Arc<Snapshot>,
}

/// Receives every commit in order.
pub(crate) trait CommitObserver: Send + Sync {
    fn on_commit(&self, commit: &CommitInfo);
}

#[derive(Default)]
struct Queue {
    commits: VecDeque<Arc<CommitInfo>>,
    draining: bool,
}

pub(crate) struct Notifier {
    feed: Arc<ChangeFeed>,
    observers: Mutex<BTreeMap<u64, Arc<dyn CommitObserver>>>,
    queue: Mutex<Queue>,
    next_id: AtomicU64,
}

impl Notifier {
    pub fn new(feed: Arc<ChangeFeed>) -> Self {
        Self {
            feed,
            observers: Mutex::new(BTreeMap::new()),
            queue: Mutex::new(Queue::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers an observer; it stays registered until the token drops.
    pub fn register(self: &Arc<Self>, observer: Arc<dyn CommitObserver>) -> NotificationToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().insert(id, observer);
        NotificationToken {
            notifier: Arc::downgrade(self),
            id,
        }
    }

    fn unregister(&self, id: u64) {
        self.observers.lock().remove(&id);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn clear(&self) {
        self.observers.lock().clear();
    }

    /// Queues a commit. Must be called before the write lock is released.
    ///
    /// Returns true if the caller should drain the queue.
    pub fn enqueue(&self, commit: CommitInfo) -> bool {
        let mut queue = self.queue.lock();
        queue.commits.push_back(Arc::new(commit));
        if queue.draining {
            false
        } else {
            queue.draining = true;
            true
        }
    }

    /// Delivers queued commits until the queue is empty.
    ///
    /// A panicking observer is skipped for that commit; the others still
    /// receive it.
    pub fn drain(&self) {
        let _guard = DrainGuard(&self.queue);
        loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.commits.pop_front() {
                    Some(commit) => commit,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            self.feed.emit_batch(next.events.clone());
            let observers: Vec<_> = self.observers.lock().values().cloned().collect();
            for observer in observers {
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer.on_commit(&next)));
                if delivered.is_err() {
                    warn!(seq = %next.seq, "observer panicked during notification");
                }
            }
        }
    }
}

/// Hands the queue back to the next committer if a drain unwinds.
struct DrainGuard<'a>(&'a Mutex<Queue>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observer_count())
            .finish_non_exhaustive()
    }
}

/// Keeps an observer registered.
///
/// Dropping the token (or calling [`NotificationToken::unsubscribe`]) stops
/// further callbacks.
#[must_use = "dropping the token unsubscribes immediately"]
pub struct NotificationToken {
    notifier: Weak<Notifier>,
    id: u64,
}

impl NotificationToken {
    /// Stops notifications.
    pub fn unsubscribe(self) {}
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        if let Some(notifier) = self.notifier.upgrade() {
            notifier.unregister(self.id);
        }
    }
}

impl std::fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationToken").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::store::StoreState;

    struct Recorder(Mutex<Vec<u64>>);

    impl CommitObserver for Recorder {
        fn on_commit(&self, commit: &CommitInfo) {
            self.0.lock().push(commit.seq.as_u64());
        }
    }

    fn commit(seq: u64) -> CommitInfo {
        let snapshot = Snapshot {
            seq: SequenceNumber::new(seq),
            version: seq,
            registry: Arc::new(SchemaRegistry::new(1, Vec::new()).unwrap()),
            state: StoreState::default(),
        };
        CommitInfo {
            seq: SequenceNumber::new(seq),
            events: Vec::new(),
            snapshot: Arc::new(snapshot),
        }
    }

    #[test]
    fn delivers_in_commit_order() {
        let notifier = Arc::new(Notifier::new(Arc::new(ChangeFeed::new())));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let _token = notifier.register(recorder.clone());

        assert!(notifier.enqueue(commit(1)));
        assert!(!notifier.enqueue(commit(2)));
        notifier.drain();

        assert_eq!(*recorder.0.lock(), vec![1, 2]);
        assert!(notifier.enqueue(commit(3)));
    }

    struct Panicking;

    impl CommitObserver for Panicking {
        fn on_commit(&self, _commit: &CommitInfo) {
            panic!("observer failure");
        }
    }

    #[test]
    fn panicking_observer_does_not_block_others() {
        let notifier = Arc::new(Notifier::new(Arc::new(ChangeFeed::new())));
        let _bad = notifier.register(Arc::new(Panicking));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let _good = notifier.register(recorder.clone());

        assert!(notifier.enqueue(commit(1)));
        notifier.drain();
        assert!(notifier.enqueue(commit(2)));
        notifier.drain();

        assert_eq!(*recorder.0.lock(), vec![1, 2]);
    }

    #[test]
    fn token_drop_unregisters() {
        let notifier = Arc::new(Notifier::new(Arc::new(ChangeFeed::new())));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let token = notifier.register(recorder.clone());
        assert_eq!(notifier.observer_count(), 1);

        token.unsubscribe();
        assert_eq!(notifier.observer_count(), 0);

        notifier.enqueue(commit(1));
        notifier.drain();
        assert!(recorder.0.lock().is_empty());
    }
}
