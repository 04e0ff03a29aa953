// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recent messages posted into each destination.
//!
//! Used to place replies whose parent has no correlation entry: the parent
//! text is matched against what was recently posted. Entries are written
//! through to storage so matching survives a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use chorus_core::{ChatId, StorageAdapter};

pub use chorus_core::HistoryEntry;

pub struct DestinationHistory {
    capacity: usize,
    threshold: f64,
    storage: Arc<dyn StorageAdapter>,
    restored: AtomicBool,
    entries: Mutex<HashMap<ChatId, VecDeque<HistoryEntry>>>,
}

impl DestinationHistory {
    pub fn new(capacity: usize, threshold: f64, storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            capacity: capacity.max(1),
            threshold,
            storage,
            restored: AtomicBool::new(false),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Loads the persisted history once per process. Entries recorded
    /// before the load are kept after the restored ones.
    pub async fn restore(&self) {
        if self.restored.swap(true, Ordering::SeqCst) {
            return;
        }
        let persisted = match self.storage.load_history(self.capacity).await {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "could not load destination history, starting empty");
                return;
            }
        };
        let count = persisted.len();
        let mut entries = self.entries.lock().await;
        let mut restored: HashMap<ChatId, VecDeque<HistoryEntry>> = HashMap::new();
        for entry in persisted {
            restored.entry(entry.chat_id).or_default().push_back(entry);
        }
        for (chat, recent) in entries.drain() {
            let queue = restored.entry(chat).or_default();
            for entry in recent {
                if !queue.iter().any(|e| e.message_id == entry.message_id) {
                    queue.push_back(entry);
                }
            }
        }
        for queue in restored.values_mut() {
            while queue.len() > self.capacity {
                queue.pop_front();
            }
        }
        *entries = restored;
        debug!(count, "destination history restored");
    }

    /// Remembers a relayed message in memory and in storage. A storage
    /// failure only costs matching after a restart.
    pub async fn append(&self, entry: HistoryEntry) {
        if let Err(e) = self.storage.append_history(&entry, self.capacity).await {
            warn!(chat = %entry.chat_id, error = %e, "could not persist destination history");
        }
        let mut entries = self.entries.lock().await;
        let queue = entries.entry(entry.chat_id).or_default();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(entry);
    }

    /// The most recent entry whose text is at least `threshold` similar to
    /// `text`. On equal scores the newer entry wins.
    pub async fn best_match(&self, destination: ChatId, text: &str) -> Option<HistoryEntry> {
        let needle = normalize(text);
        if needle.is_empty() {
            return None;
        }
        let entries = self.entries.lock().await;
        let queue = entries.get(&destination)?;

        let mut best: Option<(f64, &HistoryEntry)> = None;
        for entry in queue.iter().rev() {
            let score = strsim::normalized_levenshtein(&needle, &normalize(&entry.text));
            if score < self.threshold {
                continue;
            }
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, entry));
            }
        }
        best.map(|(_, entry)| entry.clone())
    }

    pub async fn len(&self, destination: ChatId) -> usize {
        self.entries
            .lock()
            .await
            .get(&destination)
            .map_or(0, VecDeque::len)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::{AccountId, MessageId, ThreadId};
    use chorus_test_utils::MemoryStorage;

    fn entry(id: i64, text: &str) -> HistoryEntry {
        entry_in(1, id, text)
    }

    fn entry_in(chat: i64, id: i64, text: &str) -> HistoryEntry {
        HistoryEntry {
            chat_id: ChatId(chat),
            message_id: MessageId(id),
            text: text.into(),
            account: AccountId::new("+1"),
            thread: ThreadId::mint(),
            reply_to: None,
        }
    }

    fn history(capacity: usize, threshold: f64) -> DestinationHistory {
        DestinationHistory::new(capacity, threshold, Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn finds_similar_text() {
        let history = history(10, 0.8);
        history.append(entry(1, "Good morning everyone")).await;
        history.append(entry(2, "what a day")).await;

        let hit = history
            .best_match(ChatId(1), "good morning everyone!")
            .await
            .unwrap();
        assert_eq!(hit.message_id, MessageId(1));
        assert!(history.best_match(ChatId(1), "unrelated").await.is_none());
        assert!(history.best_match(ChatId(2), "what a day").await.is_none());
    }

    #[tokio::test]
    async fn newest_wins_ties() {
        let history = history(10, 0.8);
        history.append(entry(1, "hello")).await;
        history.append(entry(2, "hello")).await;
        let hit = history.best_match(ChatId(1), "hello").await.unwrap();
        assert_eq!(hit.message_id, MessageId(2));
    }

    #[tokio::test]
    async fn capacity_is_bounded_per_destination() {
        let history = history(2, 0.8);
        for id in 1..=3 {
            history.append(entry(id, &format!("line {id}"))).await;
        }
        assert_eq!(history.len(ChatId(1)).await, 2);
        assert!(history.best_match(ChatId(1), "line 1").await.is_none_or(|e| e.message_id != MessageId(1)));
    }

    #[tokio::test]
    async fn empty_text_never_matches() {
        let history = history(2, 0.0);
        history.append(entry(1, "")).await;
        assert!(history.best_match(ChatId(1), "  ").await.is_none());
    }

    #[tokio::test]
    async fn restore_brings_back_persisted_entries() {
        let storage = Arc::new(MemoryStorage::new());
        let before = DestinationHistory::new(2, 0.8, storage.clone());
        for id in 1..=3 {
            before.append(entry(id, &format!("line {id}"))).await;
        }
        before.append(entry_in(2, 9, "elsewhere")).await;

        let after = DestinationHistory::new(2, 0.8, storage.clone());
        assert!(after.best_match(ChatId(1), "line 3").await.is_none());
        after.append(entry(4, "line 4")).await;
        after.restore().await;
        after.restore().await;

        assert_eq!(after.len(ChatId(1)).await, 2);
        assert_eq!(after.len(ChatId(2)).await, 1);
        let hit = after.best_match(ChatId(1), "line 4").await.unwrap();
        assert_eq!(hit.message_id, MessageId(4));
        let hit = after.best_match(ChatId(1), "line 3").await.unwrap();
        assert_eq!(hit.message_id, MessageId(3));
        assert!(after.best_match(ChatId(1), "line 1").await.is_none_or(|e| e.message_id != MessageId(1)));
    }

    #[tokio::test]
    async fn storage_failure_keeps_memory_history() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_failing(true);
        let history = DestinationHistory::new(4, 0.8, storage.clone());
        history.restore().await;
        history.append(entry(1, "still here")).await;
        assert_eq!(history.len(ChatId(1)).await, 1);
    }
}
