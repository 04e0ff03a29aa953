// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage adapter with switchable failure injection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use chorus_core::{
    Account, AccountId, AdapterType, ChorusError, HealthStatus, HistoryEntry, ManagedGroup,
    PluginAdapter, Proxy, RelayCursor, Script, StorageAdapter,
};

#[derive(Default)]
struct State {
    accounts: Vec<Account>,
    proxies: Vec<Proxy>,
    scripts: Vec<Script>,
    cursor: Option<RelayCursor>,
    groups: Vec<ManagedGroup>,
    history: Vec<HistoryEntry>,
    next_proxy_id: i64,
}

/// Storage kept in process memory.
///
/// While [`MemoryStorage::set_failing`] is on, every operation returns
/// [`ChorusError::Storage`].
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
    failing: AtomicBool,
    cursor_saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful cursor saves.
    pub fn cursor_saves(&self) -> usize {
        self.cursor_saves.load(Ordering::SeqCst)
    }

    /// Reads an account without going through the failure switch.
    pub async fn account(&self, id: &str) -> Option<Account> {
        self.state
            .lock()
            .await
            .accounts
            .iter()
            .find(|a| a.id.0 == id)
            .cloned()
    }

    /// Reads the cursor without going through the failure switch.
    pub async fn cursor(&self) -> Option<RelayCursor> {
        self.state.lock().await.cursor
    }

    fn check(&self) -> Result<(), ChorusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChorusError::Storage {
                source: "injected storage failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ChorusError> {
        Ok(if self.failing.load(Ordering::SeqCst) {
            HealthStatus::Unhealthy("injected failure".into())
        } else {
            HealthStatus::Healthy
        })
    }

    async fn shutdown(&self) -> Result<(), ChorusError> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn initialize(&self) -> Result<(), ChorusError> {
        self.check()
    }

    async fn close(&self) -> Result<(), ChorusError> {
        Ok(())
    }

    async fn load_accounts(&self) -> Result<Vec<Account>, ChorusError> {
        self.check()?;
        Ok(self.state.lock().await.accounts.clone())
    }

    async fn save_account(&self, account: &Account) -> Result<(), ChorusError> {
        self.check()?;
        let mut state = self.state.lock().await;
        match state.accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account.clone(),
            None => state.accounts.push(account.clone()),
        }
        Ok(())
    }

    async fn delete_account(&self, id: &AccountId) -> Result<(), ChorusError> {
        self.check()?;
        self.state.lock().await.accounts.retain(|a| &a.id != id);
        Ok(())
    }

    async fn save_script_cursor(&self, id: &AccountId, line: usize) -> Result<(), ChorusError> {
        self.check()?;
        if let Some(account) = self.state.lock().await.accounts.iter_mut().find(|a| &a.id == id) {
            account.script_cursor = line;
        }
        Ok(())
    }

    async fn set_account_enabled(&self, id: &AccountId, enabled: bool) -> Result<(), ChorusError> {
        self.check()?;
        if let Some(account) = self.state.lock().await.accounts.iter_mut().find(|a| &a.id == id) {
            account.enabled = enabled;
        }
        Ok(())
    }

    async fn load_proxies(&self) -> Result<Vec<Proxy>, ChorusError> {
        self.check()?;
        Ok(self.state.lock().await.proxies.clone())
    }

    async fn add_proxy(&self, proxy: &Proxy) -> Result<i64, ChorusError> {
        self.check()?;
        let mut state = self.state.lock().await;
        state.next_proxy_id += 1;
        let mut proxy = proxy.clone();
        proxy.id = state.next_proxy_id;
        state.proxies.push(proxy);
        Ok(state.next_proxy_id)
    }

    async fn delete_proxy(&self, id: i64) -> Result<(), ChorusError> {
        self.check()?;
        let mut state = self.state.lock().await;
        state.proxies.retain(|p| p.id != id);
        for account in state.accounts.iter_mut() {
            if account.proxy_id == Some(id) {
                account.proxy_id = None;
            }
        }
        Ok(())
    }

    async fn load_scripts(&self) -> Result<Vec<Script>, ChorusError> {
        self.check()?;
        Ok(self.state.lock().await.scripts.clone())
    }

    async fn save_script(&self, id: &str, lines: &[String]) -> Result<(), ChorusError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let script = Script {
            id: id.to_string(),
            lines: lines.to_vec(),
        };
        match state.scripts.iter_mut().find(|s| s.id == id) {
            Some(existing) => *existing = script,
            None => state.scripts.push(script),
        }
        Ok(())
    }

    async fn delete_script(&self, id: &str) -> Result<(), ChorusError> {
        self.check()?;
        self.state.lock().await.scripts.retain(|s| s.id != id);
        Ok(())
    }

    async fn load_cursor(&self) -> Result<RelayCursor, ChorusError> {
        self.check()?;
        Ok(self.state.lock().await.cursor.unwrap_or_default())
    }

    async fn save_cursor(&self, cursor: RelayCursor) -> Result<(), ChorusError> {
        self.check()?;
        self.state.lock().await.cursor = Some(cursor);
        self.cursor_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_managed_groups(&self) -> Result<Vec<ManagedGroup>, ChorusError> {
        self.check()?;
        Ok(self.state.lock().await.groups.clone())
    }

    async fn save_managed_group(&self, group: &ManagedGroup) -> Result<(), ChorusError> {
        self.check()?;
        let mut state = self.state.lock().await;
        match state.groups.iter_mut().find(|g| g.chat_ref == group.chat_ref) {
            Some(existing) => *existing = group.clone(),
            None => state.groups.push(group.clone()),
        }
        Ok(())
    }

    async fn delete_managed_group(&self, chat_ref: &str) -> Result<(), ChorusError> {
        self.check()?;
        self.state
            .lock()
            .await
            .groups
            .retain(|g| g.chat_ref != chat_ref);
        Ok(())
    }

    async fn append_history(&self, entry: &HistoryEntry, keep: usize) -> Result<(), ChorusError> {
        self.check()?;
        let mut state = self.state.lock().await;
        state.history.push(entry.clone());
        let in_chat = state
            .history
            .iter()
            .filter(|e| e.chat_id == entry.chat_id)
            .count();
        let mut excess = in_chat.saturating_sub(keep.max(1));
        state.history.retain(|e| {
            if excess > 0 && e.chat_id == entry.chat_id {
                excess -= 1;
                return false;
            }
            true
        });
        Ok(())
    }

    async fn load_history(&self, per_chat: usize) -> Result<Vec<HistoryEntry>, ChorusError> {
        self.check()?;
        let state = self.state.lock().await;
        let mut chats: Vec<_> = state.history.iter().map(|e| e.chat_id).collect();
        chats.sort();
        chats.dedup();
        let mut loaded = Vec::new();
        for chat in chats {
            let entries: Vec<_> = state.history.iter().filter(|e| e.chat_id == chat).collect();
            let skip = entries.len().saturating_sub(per_chat);
            loaded.extend(entries.into_iter().skip(skip).cloned());
        }
        Ok(loaded)
    }
}
