// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared state of a relay run and the per-destination send path.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use chorus_config::model::{GenderConfig, RelayConfig};
use chorus_core::{
    Account, AccountId, ChatClient, ChatId, ChorusError, Connection, Content, FailureKind,
    ManagedGroup, MessageId, Notifier, OutboundMessage, Proxy, RelayMode, StorageAdapter,
    normalize_chat_ref,
};

use crate::controller::{ControllerSettings, FailureController, FloodWaitPolicy, with_retry};
use crate::correlation::CorrelationStore;
use crate::gender::GenderAdapter;
use crate::history::DestinationHistory;
use crate::pacing::Pacing;
use crate::pool::ConnectionPool;
use crate::resolver::ChatResolver;
use crate::selector::AccountSelector;
use crate::telemetry;

/// Last successfully loaded view of the store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub accounts: Vec<Account>,
    pub proxies: Vec<Proxy>,
    closed_groups: HashSet<String>,
}

impl Snapshot {
    pub fn new(accounts: Vec<Account>, proxies: Vec<Proxy>, groups: &[ManagedGroup]) -> Self {
        Self {
            accounts,
            proxies,
            closed_groups: closed_set(groups),
        }
    }

    fn proxy_of(&self, account: &Account) -> Option<&Proxy> {
        let id = account.proxy_id?;
        self.proxies.iter().find(|p| p.id == id)
    }

    /// Whether `raw` names a managed group that is closed for posting.
    pub fn is_closed_group(&self, raw: &str) -> bool {
        self.closed_groups.contains(&normalize_chat_ref(raw))
    }
}

fn closed_set(groups: &[ManagedGroup]) -> HashSet<String> {
    groups
        .iter()
        .filter(|g| !g.open)
        .map(|g| normalize_chat_ref(&g.chat_ref))
        .collect()
}

/// An account that may relay right now, with its live connection.
#[derive(Clone)]
pub struct Eligible {
    pub account: Account,
    pub conn: Arc<dyn Connection>,
}

/// Everything a relay run shares: adapters, stores, and policies.
pub struct RelayContext {
    pub config: RelayConfig,
    pub storage: Arc<dyn StorageAdapter>,
    pub notifier: Arc<dyn Notifier>,
    pub pool: Arc<ConnectionPool>,
    pub resolver: Arc<ChatResolver>,
    pub selector: AccountSelector,
    pub correlation: CorrelationStore,
    pub history: DestinationHistory,
    pub controller: FailureController,
    pub gender: GenderAdapter,
    pub pacing: Pacing,
    enabled: AtomicBool,
    snapshot: Mutex<Snapshot>,
}

impl RelayContext {
    pub fn new(
        config: RelayConfig,
        gender: &GenderConfig,
        client: Arc<dyn ChatClient>,
        storage: Arc<dyn StorageAdapter>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ChorusError> {
        let settings = ControllerSettings::from(&config);
        let connect_policy = FloodWaitPolicy {
            multiplier: settings.flood_multiplier,
            max_retries: config.connect_attempts.saturating_sub(1),
            max_wait: settings.max_flood_wait,
        };
        let pool = Arc::new(ConnectionPool::new(client, connect_policy));
        let resolver = Arc::new(ChatResolver::new(config.join_fallback.clone()));
        let controller = FailureController::new(
            settings,
            storage.clone(),
            notifier.clone(),
            pool.clone(),
            resolver.clone(),
        );

        Ok(Self {
            resolver,
            selector: AccountSelector::new(),
            correlation: CorrelationStore::new(config.correlation_capacity),
            history: DestinationHistory::new(
                config.history_size,
                config.similarity_threshold,
                storage.clone(),
            ),
            gender: GenderAdapter::new(gender)?,
            pacing: Pacing::from(&config),
            enabled: AtomicBool::new(false),
            snapshot: Mutex::new(Snapshot::default()),
            controller,
            pool,
            storage,
            notifier,
            config,
        })
    }

    /// The global relaying flag, polled before every unit of work.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().await.clone()
    }

    /// Re-reads accounts, proxies, and managed groups. A part that fails to
    /// load keeps its previous value.
    pub async fn refresh(&self) -> Snapshot {
        let mut snapshot = self.snapshot.lock().await;
        match self.storage.load_accounts().await {
            Ok(accounts) => snapshot.accounts = accounts,
            Err(e) => warn!(error = %e, "could not load accounts, keeping last snapshot"),
        }
        match self.storage.load_proxies().await {
            Ok(proxies) => snapshot.proxies = proxies,
            Err(e) => warn!(error = %e, "could not load proxies, keeping last snapshot"),
        }
        match self.storage.load_managed_groups().await {
            Ok(groups) => snapshot.closed_groups = closed_set(&groups),
            Err(e) => warn!(error = %e, "could not load managed groups, keeping last snapshot"),
        }
        snapshot.clone()
    }

    /// Connects every enabled account of `snapshot` and disconnects pool
    /// accounts that are no longer enabled. Returns the live count.
    pub async fn ensure_connections(&self, snapshot: &Snapshot) -> usize {
        let wanted: HashSet<&AccountId> = snapshot
            .accounts
            .iter()
            .filter(|a| a.enabled)
            .map(|a| &a.id)
            .collect();
        for id in self.pool.accounts().await {
            if !wanted.contains(&id) {
                debug!(account = %id, "account no longer enabled, disconnecting");
                self.pool.stop(&id).await;
            }
        }

        for account in snapshot.accounts.iter().filter(|a| a.enabled) {
            if self.controller.is_disabled(&account.id).await {
                continue;
            }
            if let Err(e) = self.pool.start(account, snapshot.proxy_of(account)).await {
                if e.kind() == FailureKind::AuthRevoked {
                    self.controller
                        .disable_account(&account.id, &e.to_string())
                        .await;
                } else {
                    warn!(account = %account.id, error = %e, "could not connect account this cycle");
                }
            }
        }
        self.pool.live_count().await
    }

    /// Accounts of `snapshot` that may relay now, in storage order.
    pub async fn eligible(&self, snapshot: &Snapshot) -> Vec<Eligible> {
        let mut eligible = Vec::new();
        for account in &snapshot.accounts {
            if !account.enabled
                || !account.has_destinations()
                || self.controller.is_disabled(&account.id).await
            {
                continue;
            }
            if let Some(conn) = self.pool.get(&account.id).await {
                eligible.push(Eligible {
                    account: account.clone(),
                    conn,
                });
            }
        }
        eligible
    }

    /// Gates, cools down, and resolves one destination for `account`.
    /// Returns `None` when the destination is skipped.
    pub async fn prepare_destination(
        &self,
        account: &Account,
        conn: &dyn Connection,
        destination: &str,
        snapshot: &Snapshot,
        cancel: &CancellationToken,
    ) -> Option<ChatId> {
        if !self.is_enabled() || self.controller.is_disabled(&account.id).await {
            return None;
        }
        if snapshot.is_closed_group(destination) {
            debug!(account = %account.id, destination, "managed group is closed, skipping");
            return None;
        }
        if !self
            .controller
            .wait_cooldown(&account.id, destination, cancel)
            .await
        {
            return None;
        }
        match self.resolver.resolve(conn, destination).await {
            Ok(chat) => Some(chat),
            Err(e) => {
                self.controller
                    .handle_failure(&account.id, destination, &e)
                    .await;
                None
            }
        }
    }

    /// Types, adapts, and sends `content` into `chat` as `account`.
    ///
    /// Playback sleeps out rate limits and retries in place; Mirror hands
    /// them to the controller as a cooldown. Returns the relayed message id.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_to(
        &self,
        account: &Account,
        conn: &dyn Connection,
        destination: &str,
        chat: ChatId,
        content: &Content,
        reply_to: Option<MessageId>,
        mode: RelayMode,
        cancel: &CancellationToken,
    ) -> Option<MessageId> {
        if !self.is_enabled() {
            return None;
        }
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = self.pacing.simulate_typing(conn, chat) => {}
        }

        let message = OutboundMessage {
            chat_id: chat,
            content: self.gender.adapt(content, account.gender),
            reply_to,
        };
        let sent = match mode {
            RelayMode::Playback => {
                let policy = self.controller.playback_policy();
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    result = with_retry(&policy, || conn.send(message.clone())) => result,
                }
            }
            RelayMode::Mirror => conn.send(message).await,
        };

        match sent {
            Ok(id) => {
                telemetry::record_sent(mode);
                self.controller.record_success(&account.id, destination).await;
                debug!(account = %account.id, chat = %chat, message = %id, "relayed");
                Some(id)
            }
            Err(e) => {
                self.controller
                    .handle_failure(&account.id, destination, &e)
                    .await;
                None
            }
        }
    }
}
