// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection pool: at most one live connection per account.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use chorus_core::{Account, AccountId, ChatClient, ChorusError, Connection, Proxy, UserId};

use crate::controller::{FloodWaitPolicy, with_retry};

/// Owns the live connections of all accounts.
pub struct ConnectionPool {
    client: Arc<dyn ChatClient>,
    connections: RwLock<HashMap<AccountId, Arc<dyn Connection>>>,
    /// One dial at a time per account; the connection map is never locked
    /// while dialing.
    dialing: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
    connect_policy: FloodWaitPolicy,
}

impl ConnectionPool {
    pub fn new(client: Arc<dyn ChatClient>, connect_policy: FloodWaitPolicy) -> Self {
        Self {
            client,
            connections: RwLock::new(HashMap::new()),
            dialing: Mutex::new(HashMap::new()),
            connect_policy,
        }
    }

    /// Opens (or reuses) the connection of `account`.
    ///
    /// A live connection is returned as is, so starting an account twice
    /// never opens a second connection. A dead one is disconnected before
    /// it is replaced.
    pub async fn start(
        &self,
        account: &Account,
        proxy: Option<&Proxy>,
    ) -> Result<Arc<dyn Connection>, ChorusError> {
        if let Some(conn) = self.get(&account.id).await {
            return Ok(conn);
        }

        let gate = self
            .dialing
            .lock()
            .await
            .entry(account.id.clone())
            .or_default()
            .clone();
        let _dialing = gate.lock().await;

        // Another start may have finished while this one waited.
        if let Some(conn) = self.get(&account.id).await {
            return Ok(conn);
        }
        let stale = self.connections.write().await.remove(&account.id);
        if let Some(stale) = stale {
            debug!(account = %account.id, "replacing dead connection");
            if let Err(e) = stale.disconnect().await {
                debug!(account = %account.id, error = %e, "dead connection did not disconnect cleanly");
            }
        }

        debug!(account = %account.id, proxy = ?proxy.map(|p| p.id), "connecting account");
        let conn = with_retry(&self.connect_policy, || self.client.connect(account, proxy)).await?;
        self.connections
            .write()
            .await
            .insert(account.id.clone(), conn.clone());
        info!(account = %account.id, "account connected");
        Ok(conn)
    }

    /// Disconnects `account`. Disconnect errors are logged, never returned.
    pub async fn stop(&self, account: &AccountId) {
        let conn = self.connections.write().await.remove(account);
        if let Some(conn) = conn {
            if let Err(e) = conn.disconnect().await {
                warn!(account = %account, error = %e, "disconnect failed, dropping connection");
            } else {
                debug!(account = %account, "account disconnected");
            }
        }
    }

    /// Disconnects every account, tolerating individual failures. Returns
    /// how many connections were closed.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        let count = drained.len();
        for (account, conn) in drained {
            if let Err(e) = conn.disconnect().await {
                warn!(account = %account, error = %e, "disconnect failed, dropping connection");
            }
        }
        if count > 0 {
            info!(count, "connection pool stopped");
        }
        count
    }

    pub async fn is_live(&self, account: &AccountId) -> bool {
        self.connections
            .read()
            .await
            .get(account)
            .is_some_and(|c| c.is_live())
    }

    /// The live connection of `account`, if any.
    pub async fn get(&self, account: &AccountId) -> Option<Arc<dyn Connection>> {
        self.connections
            .read()
            .await
            .get(account)
            .filter(|c| c.is_live())
            .cloned()
    }

    /// The pool account whose platform user is `user`.
    pub async fn account_for_user(&self, user: UserId) -> Option<AccountId> {
        self.connections
            .read()
            .await
            .iter()
            .find(|(_, c)| c.self_user() == user)
            .map(|(id, _)| id.clone())
    }

    /// Accounts currently holding a connection, live or not.
    pub async fn accounts(&self) -> Vec<AccountId> {
        self.connections.read().await.keys().cloned().collect()
    }

    pub async fn live_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.is_live())
            .count()
    }
}
