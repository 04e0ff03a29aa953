// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps source messages to the messages relayed from them.
//!
//! Replies in the source chat are reproduced as replies in each destination
//! by looking up the relayed copy of the parent here.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tokio::sync::Mutex;
use tracing::debug;

use chorus_core::{AccountId, ChatId, MessageId, ThreadId};

/// Identity of a message in a source chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub chat: ChatId,
    pub message: MessageId,
}

impl SourceKey {
    pub fn new(chat: ChatId, message: MessageId) -> Self {
        Self { chat, message }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat, self.message)
    }
}

/// The copy of a source message in one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationEntry {
    pub destination: ChatId,
    pub account: AccountId,
    pub relayed: MessageId,
}

/// Outcome of [`CorrelationStore::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug)]
struct Record {
    thread: ThreadId,
    entries: HashMap<ChatId, CorrelationEntry>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<SourceKey, Record>,
    order: VecDeque<SourceKey>,
}

/// Bounded map of source message to relayed copies, oldest evicted first.
pub struct CorrelationStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl CorrelationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Thread of a known source message.
    pub async fn thread_of(&self, key: SourceKey) -> Option<ThreadId> {
        self.inner
            .lock()
            .await
            .records
            .get(&key)
            .map(|r| r.thread.clone())
    }

    /// The relayed copy of `key` in `destination`.
    pub async fn lookup(&self, key: SourceKey, destination: ChatId) -> Option<CorrelationEntry> {
        self.inner
            .lock()
            .await
            .records
            .get(&key)
            .and_then(|r| r.entries.get(&destination))
            .cloned()
    }

    /// Records that `key` was relayed as `entry`.
    ///
    /// Re-registering the same destination overwrites the previous copy;
    /// the thread of an existing record is kept.
    pub async fn register(
        &self,
        key: SourceKey,
        thread: &ThreadId,
        entry: CorrelationEntry,
    ) -> Registration {
        let mut inner = self.inner.lock().await;
        if !inner.records.contains_key(&key) {
            while inner.order.len() >= self.capacity {
                match inner.order.pop_front() {
                    Some(oldest) => {
                        inner.records.remove(&oldest);
                    }
                    None => break,
                }
            }
            inner.order.push_back(key);
            inner.records.insert(
                key,
                Record {
                    thread: thread.clone(),
                    entries: HashMap::new(),
                },
            );
        }

        let Some(record) = inner.records.get_mut(&key) else {
            return Registration::Unchanged;
        };
        let destination = entry.destination;
        match record.entries.insert(destination, entry.clone()) {
            None => Registration::Inserted,
            Some(previous) if previous == entry => Registration::Unchanged,
            Some(previous) => {
                debug!(
                    source = %key,
                    destination = %destination,
                    previous = %previous.relayed,
                    relayed = %entry.relayed,
                    "updated mapping"
                );
                Registration::Updated
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn entry(dest: i64, account: &str, relayed: i64) -> CorrelationEntry {
        CorrelationEntry {
            destination: ChatId(dest),
            account: AccountId::new(account),
            relayed: MessageId(relayed),
        }
    }

    fn key(message: i64) -> SourceKey {
        SourceKey::new(ChatId(10), MessageId(message))
    }

    #[tokio::test]
    async fn lookup_finds_copy_per_destination() {
        let store = CorrelationStore::new(10);
        let thread = ThreadId::mint();
        store.register(key(1), &thread, entry(100, "+1", 5)).await;
        store.register(key(1), &thread, entry(200, "+2", 6)).await;

        assert_eq!(store.lookup(key(1), ChatId(100)).await, Some(entry(100, "+1", 5)));
        assert_eq!(store.lookup(key(1), ChatId(200)).await, Some(entry(200, "+2", 6)));
        assert_eq!(store.lookup(key(1), ChatId(300)).await, None);
        assert_eq!(store.thread_of(key(1)).await, Some(thread));
    }

    #[tokio::test]
    async fn oldest_records_are_evicted() {
        let store = CorrelationStore::new(2);
        let thread = ThreadId::mint();
        for m in 1..=3 {
            store.register(key(m), &thread, entry(100, "+1", m)).await;
        }
        assert_eq!(store.len().await, 2);
        assert!(store.thread_of(key(1)).await.is_none());
        assert!(store.thread_of(key(3)).await.is_some());
    }

    #[tokio::test]
    async fn thread_of_first_registration_is_kept() {
        let store = CorrelationStore::new(10);
        let first = ThreadId::mint();
        store.register(key(1), &first, entry(100, "+1", 5)).await;
        store
            .register(key(1), &ThreadId::mint(), entry(200, "+1", 6))
            .await;
        assert_eq!(store.thread_of(key(1)).await, Some(first));
    }

    #[traced_test]
    #[tokio::test]
    async fn overwrite_logs_only_on_change() {
        let store = CorrelationStore::new(10);
        let thread = ThreadId::mint();
        assert_eq!(
            store.register(key(1), &thread, entry(100, "+1", 5)).await,
            Registration::Inserted
        );
        assert_eq!(
            store.register(key(1), &thread, entry(100, "+1", 5)).await,
            Registration::Unchanged
        );
        assert!(!logs_contain("updated mapping"));
        assert_eq!(
            store.register(key(1), &thread, entry(100, "+2", 9)).await,
            Registration::Updated
        );
        assert!(logs_contain("updated mapping"));
    }
}
