//! Thread-Safe Storage Engine with Expiry Support
//!
//! The engine owns the whole key space. Every read, write and expiry
//! removal goes through one `parking_lot::Mutex`, so connection tasks and
//! the expiry sweeper never observe a half-applied update.
//!
//! ## Expiry
//!
//! ```text
//!   SET k v PX 50          SET k v2              sweeper @ t+50
//!        │                    │                        │
//!        ▼                    ▼                        ▼
//!   data[k] = (v, gen 1)  data[k] = (v2, gen 2)   pop (t+50, gen 1, k)
//!   heap += (t+50, 1, k)                          gen 1 != gen 2 → keep v2
//! ```
//!
//! Each `SET` stamps its entry with a fresh generation. Deadlines are kept
//! in a min-heap tagged with that generation; a deadline only removes the
//! key if the entry still carries the same generation. Reads also check the
//! deadline themselves (lazy expiry), so an expired key is never returned
//! even before the sweeper reaches it.

use bytes::Bytes;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// A stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
    /// Which `SET` produced this entry
    generation: u64,
}

impl Entry {
    /// Checks if this entry has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// A scheduled removal. Ordered by deadline first.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    at: Instant,
    generation: u64,
    key: Bytes,
}

/// Stale deadlines tolerated before the heap is rebuilt.
const DEADLINE_SLACK: usize = 64;

#[derive(Debug, Default)]
struct KeySpace {
    data: HashMap<Bytes, Entry>,
    deadlines: BinaryHeap<Reverse<Deadline>>,
    next_generation: u64,
    /// Entries in `data` that carry a deadline
    expiring: usize,
}

impl KeySpace {
    fn insert(&mut self, key: Bytes, value: Bytes, expires_at: Option<Instant>) -> (bool, u64) {
        self.next_generation += 1;
        let generation = self.next_generation;

        if expires_at.is_some() {
            self.expiring += 1;
        }

        let previous = self.data.insert(
            key,
            Entry {
                value,
                expires_at,
                generation,
            },
        );

        if previous.as_ref().is_some_and(|e| e.expires_at.is_some()) {
            self.expiring -= 1;
        }

        (previous.is_none(), generation)
    }

    fn remove(&mut self, key: &Bytes) {
        if let Some(entry) = self.data.remove(key) {
            if entry.expires_at.is_some() {
                self.expiring -= 1;
            }
        }
    }

    /// Drops deadlines whose entry was overwritten or already removed once
    /// they outnumber the live ones. Each entry has at most one matching
    /// deadline, so the heap stays within twice the expiring entries.
    fn compact_deadlines(&mut self) {
        if self.deadlines.len() <= 2 * self.expiring + DEADLINE_SLACK {
            return;
        }

        let data = &self.data;
        self.deadlines
            .retain(|Reverse(d)| data.get(&d.key).is_some_and(|e| e.generation == d.generation));
    }
}

/// The main storage engine.
///
/// Designed to be wrapped in an `Arc` and shared by every connection task
/// and the expiry sweeper.
///
/// # Example
///
/// ```
/// use respkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("color"), Bytes::from("blue"));
/// assert_eq!(engine.get(&Bytes::from("color")), Some(Bytes::from("blue")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// ```
pub struct StorageEngine {
    keyspace: Mutex<KeySpace>,

    /// Signalled when a deadline earlier than every pending one is added
    deadline_added: Notify,

    get_count: AtomicU64,
    set_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self {
            keyspace: Mutex::new(KeySpace::default()),
            deadline_added: Notify::new(),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Sets a key-value pair without expiry.
    ///
    /// Any previous value and any previous expiry of the key are replaced.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut keyspace = self.keyspace.lock();
        let (is_new, _) = keyspace.insert(key, value, None);
        keyspace.compact_deadlines();
        is_new
    }

    /// Sets a key-value pair that expires `ttl` from now.
    ///
    /// A `ttl` too large to represent as an instant is treated as no expiry.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let Some(at) = Instant::now().checked_add(ttl) else {
            let mut keyspace = self.keyspace.lock();
            let (is_new, _) = keyspace.insert(key, value, None);
            keyspace.compact_deadlines();
            return is_new;
        };

        let mut keyspace = self.keyspace.lock();
        let (is_new, generation) = keyspace.insert(key.clone(), value, Some(at));

        let earliest = keyspace.deadlines.peek().map(|Reverse(d)| d.at);
        keyspace.deadlines.push(Reverse(Deadline {
            at,
            generation,
            key,
        }));
        keyspace.compact_deadlines();
        drop(keyspace);

        if earliest.map_or(true, |earliest| at < earliest) {
            self.deadline_added.notify_one();
        }

        is_new
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// key found here is removed on the spot (lazy expiry).
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let mut keyspace = self.keyspace.lock();
        let entry = keyspace.data.get(key)?;

        if entry.is_expired_at(Instant::now()) {
            keyspace.remove(key);
            keyspace.compact_deadlines();
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        Some(entry.value.clone())
    }

    /// Checks if a key exists and is not expired.
    pub fn exists(&self, key: &Bytes) -> bool {
        self.keyspace
            .lock()
            .data
            .get(key)
            .is_some_and(|e| !e.is_expired_at(Instant::now()))
    }

    /// Returns the number of stored keys, including expired keys that
    /// have not been removed yet.
    pub fn len(&self) -> usize {
        self.keyspace.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.keyspace.lock().deadlines.peek().map(|Reverse(d)| d.at)
    }

    /// Waits until a deadline earlier than all pending ones is scheduled.
    pub async fn deadline_added(&self) {
        self.deadline_added.notified().await
    }

    /// Removes every key whose deadline has passed at `now`.
    ///
    /// A deadline left behind by an overwritten entry is discarded without
    /// touching the key.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were removed.
    pub fn expire_due(&self, now: Instant) -> u64 {
        let mut keyspace = self.keyspace.lock();
        let mut removed = 0u64;

        while keyspace
            .deadlines
            .peek()
            .is_some_and(|Reverse(d)| d.at <= now)
        {
            let Some(Reverse(deadline)) = keyspace.deadlines.pop() else {
                break;
            };

            let current = keyspace
                .data
                .get(&deadline.key)
                .is_some_and(|e| e.generation == deadline.generation);

            if current {
                keyspace.remove(&deadline.key);
                removed += 1;
            }
        }

        if removed > 0 {
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }

        removed
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> StorageStats {
        let keyspace = self.keyspace.lock();
        StorageStats {
            keys: keyspace.data.len() as u64,
            pending_deadlines: keyspace.deadlines.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub pending_deadlines: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub expired: u64,
}
