// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence gateway for accounts, proxies, scripts, groups, the relay
//! cursor, and the destination history.

use async_trait::async_trait;

use crate::error::ChorusError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Account, AccountId, HistoryEntry, ManagedGroup, Proxy, RelayCursor, Script};

/// Storage adapter for durable relay state.
///
/// Every failure is reported as [`ChorusError::Storage`]; the relay treats
/// storage failures as non-fatal.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Opens the backing store and applies pending migrations.
    async fn initialize(&self) -> Result<(), ChorusError>;

    /// Flushes and closes the backing store.
    async fn close(&self) -> Result<(), ChorusError>;

    // --- Accounts ---

    /// All accounts, in insertion order.
    async fn load_accounts(&self) -> Result<Vec<Account>, ChorusError>;

    /// Inserts or replaces an account.
    async fn save_account(&self, account: &Account) -> Result<(), ChorusError>;

    async fn delete_account(&self, id: &AccountId) -> Result<(), ChorusError>;

    /// Records the script line an account last posted. Touches no other
    /// column; unknown accounts are ignored.
    async fn save_script_cursor(&self, id: &AccountId, line: usize) -> Result<(), ChorusError>;

    /// Turns an account on or off. Touches no other column; unknown
    /// accounts are ignored.
    async fn set_account_enabled(&self, id: &AccountId, enabled: bool) -> Result<(), ChorusError>;

    // --- Proxies ---

    async fn load_proxies(&self) -> Result<Vec<Proxy>, ChorusError>;

    /// Adds a proxy and returns its id. The `id` field of `proxy` is ignored.
    async fn add_proxy(&self, proxy: &Proxy) -> Result<i64, ChorusError>;

    /// Deletes a proxy and clears it from every account that used it.
    async fn delete_proxy(&self, id: i64) -> Result<(), ChorusError>;

    // --- Scripts ---

    async fn load_scripts(&self) -> Result<Vec<Script>, ChorusError>;

    /// Inserts or replaces the lines of a script.
    async fn save_script(&self, id: &str, lines: &[String]) -> Result<(), ChorusError>;

    async fn delete_script(&self, id: &str) -> Result<(), ChorusError>;

    // --- Playback cursor ---

    /// The persisted cursor, or the default when none was saved yet.
    async fn load_cursor(&self) -> Result<RelayCursor, ChorusError>;

    async fn save_cursor(&self, cursor: RelayCursor) -> Result<(), ChorusError>;

    // --- Managed groups ---

    async fn load_managed_groups(&self) -> Result<Vec<ManagedGroup>, ChorusError>;

    /// Inserts or replaces a managed group keyed by its chat reference.
    async fn save_managed_group(&self, group: &ManagedGroup) -> Result<(), ChorusError>;

    async fn delete_managed_group(&self, chat_ref: &str) -> Result<(), ChorusError>;

    // --- Destination history ---

    /// Appends a relayed message and keeps only the newest `keep` entries of
    /// its chat.
    async fn append_history(&self, entry: &HistoryEntry, keep: usize) -> Result<(), ChorusError>;

    /// The newest `per_chat` entries of every chat, oldest first within a chat.
    async fn load_history(&self, per_chat: usize) -> Result<Vec<HistoryEntry>, ChorusError>;
}
