// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use chorus_config::model::StorageConfig;
use chorus_core::{
    Account, AccountId, AdapterType, ChorusError, HealthStatus, HistoryEntry, ManagedGroup,
    PluginAdapter, Proxy, RelayCursor, Script, StorageAdapter,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wraps an already opened database (e.g. an in-memory one).
    pub fn from_database(db: Database) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".to_string(),
                wal_mode: false,
            },
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, ChorusError> {
        self.db.get().ok_or_else(|| ChorusError::Storage {
            source: "storage not initialized, call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ChorusError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ChorusError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ChorusError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ChorusError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ChorusError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Accounts ---

    async fn load_accounts(&self) -> Result<Vec<Account>, ChorusError> {
        queries::accounts::load_accounts(self.db()?).await
    }

    async fn save_account(&self, account: &Account) -> Result<(), ChorusError> {
        queries::accounts::save_account(self.db()?, account).await
    }

    async fn delete_account(&self, id: &AccountId) -> Result<(), ChorusError> {
        queries::accounts::delete_account(self.db()?, id).await
    }

    async fn save_script_cursor(&self, id: &AccountId, line: usize) -> Result<(), ChorusError> {
        queries::accounts::save_script_cursor(self.db()?, id, line).await
    }

    async fn set_account_enabled(&self, id: &AccountId, enabled: bool) -> Result<(), ChorusError> {
        queries::accounts::set_account_enabled(self.db()?, id, enabled).await
    }

    // --- Proxies ---

    async fn load_proxies(&self) -> Result<Vec<Proxy>, ChorusError> {
        queries::proxies::load_proxies(self.db()?).await
    }

    async fn add_proxy(&self, proxy: &Proxy) -> Result<i64, ChorusError> {
        queries::proxies::add_proxy(self.db()?, proxy).await
    }

    async fn delete_proxy(&self, id: i64) -> Result<(), ChorusError> {
        queries::proxies::delete_proxy(self.db()?, id).await
    }

    // --- Scripts ---

    async fn load_scripts(&self) -> Result<Vec<Script>, ChorusError> {
        queries::scripts::load_scripts(self.db()?).await
    }

    async fn save_script(&self, id: &str, lines: &[String]) -> Result<(), ChorusError> {
        queries::scripts::save_script(self.db()?, id, lines).await
    }

    async fn delete_script(&self, id: &str) -> Result<(), ChorusError> {
        queries::scripts::delete_script(self.db()?, id).await
    }

    // --- Playback cursor ---

    async fn load_cursor(&self) -> Result<RelayCursor, ChorusError> {
        queries::cursor::load_cursor(self.db()?).await
    }

    async fn save_cursor(&self, cursor: RelayCursor) -> Result<(), ChorusError> {
        queries::cursor::save_cursor(self.db()?, cursor).await
    }

    // --- Managed groups ---

    async fn load_managed_groups(&self) -> Result<Vec<ManagedGroup>, ChorusError> {
        queries::groups::load_managed_groups(self.db()?).await
    }

    async fn save_managed_group(&self, group: &ManagedGroup) -> Result<(), ChorusError> {
        queries::groups::save_managed_group(self.db()?, group).await
    }

    async fn delete_managed_group(&self, chat_ref: &str) -> Result<(), ChorusError> {
        queries::groups::delete_managed_group(self.db()?, chat_ref).await
    }

    // --- Destination history ---

    async fn append_history(&self, entry: &HistoryEntry, keep: usize) -> Result<(), ChorusError> {
        queries::history::append_history(self.db()?, entry, keep).await
    }

    async fn load_history(&self, per_chat: usize) -> Result<Vec<HistoryEntry>, ChorusError> {
        queries::history::load_history(self.db()?, per_chat).await
    }
}
