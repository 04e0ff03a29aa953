// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate and failure control.
//!
//! Every send, join, and connect failure ends up here. Rate limits become
//! sleeps (Playback) or per-destination cooldowns (Mirror), permission
//! errors are reported and skipped, revoked sessions disable the account,
//! and repeated failures on one destination are escalated to the operator.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chorus_config::model::RelayConfig;
use chorus_core::{
    AccountId, ChorusError, FailureKind, Notification, Notifier, StorageAdapter,
    normalize_chat_ref,
};

use crate::notify::notify_operator;
use crate::pool::ConnectionPool;
use crate::resolver::ChatResolver;
use crate::telemetry;

/// State handed to a [`RetryPolicy`] after each failed attempt.
#[derive(Debug)]
pub struct RetryContext<'a> {
    /// Failed attempts so far, starting at 1.
    pub fail_count: u32,
    /// Total time already spent sleeping between attempts.
    pub slept_so_far: Duration,
    pub error: &'a ChorusError,
}

/// Decides whether a failed operation is retried, and after how long.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> ControlFlow<(), Duration>;
}

/// Never retries.
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _ctx: &RetryContext<'_>) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Retries rate-limited operations after `seconds * multiplier`, up to
/// `max_retries` times. Every other error breaks immediately.
#[derive(Debug, Clone, Copy)]
pub struct FloodWaitPolicy {
    pub multiplier: f64,
    pub max_retries: u32,
    pub max_wait: Duration,
}

impl FloodWaitPolicy {
    pub fn wait_for(&self, seconds: u64) -> Duration {
        flood_wait(seconds, self.multiplier, self.max_wait)
    }
}

impl RetryPolicy for FloodWaitPolicy {
    fn should_retry(&self, ctx: &RetryContext<'_>) -> ControlFlow<(), Duration> {
        match ctx.error.retry_after() {
            Some(seconds) if ctx.fail_count <= self.max_retries => {
                ControlFlow::Continue(self.wait_for(seconds))
            }
            _ => ControlFlow::Break(()),
        }
    }
}

/// The wait applied to a rate-limit error asking for `seconds`.
///
/// `multiplier` is validated to be at least 1.0 when configuration loads.
pub fn flood_wait(seconds: u64, multiplier: f64, max_wait: Duration) -> Duration {
    let wait = Duration::from_secs_f64(seconds as f64 * multiplier);
    wait.min(max_wait)
}

/// Runs `op` until it succeeds or `policy` gives up, sleeping in between.
pub async fn with_retry<T, F, Fut>(policy: &dyn RetryPolicy, mut op: F) -> Result<T, ChorusError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChorusError>>,
{
    let mut fail_count = 0;
    let mut slept_so_far = Duration::ZERO;
    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        fail_count += 1;
        let ctx = RetryContext {
            fail_count,
            slept_so_far,
            error: &error,
        };
        match policy.should_retry(&ctx) {
            ControlFlow::Continue(delay) => {
                warn!(
                    error = %error,
                    attempt = fail_count,
                    delay_secs = delay.as_secs_f64(),
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
                slept_so_far += delay;
            }
            ControlFlow::Break(()) => return Err(error),
        }
    }
}

/// Tunables of the failure controller.
#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub flood_multiplier: f64,
    pub max_flood_wait: Duration,
    pub max_flood_retries: u32,
    pub failure_notify_threshold: u32,
}

impl From<&RelayConfig> for ControllerSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            flood_multiplier: config.flood_multiplier,
            max_flood_wait: Duration::from_secs(config.max_flood_wait_secs),
            max_flood_retries: config.max_flood_retries,
            failure_notify_threshold: config.failure_notify_threshold,
        }
    }
}

/// What the controller decided for one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// The account/destination pair is paused for this long.
    Cooldown(Duration),
    /// The destination is skipped for this cycle.
    Skipped,
    /// The account was disabled permanently.
    Disabled,
}

type PairKey = (AccountId, String);

/// Classifies relay failures and applies the matching reaction.
pub struct FailureController {
    settings: ControllerSettings,
    storage: Arc<dyn StorageAdapter>,
    notifier: Arc<dyn Notifier>,
    pool: Arc<ConnectionPool>,
    resolver: Arc<ChatResolver>,
    cooldowns: Mutex<HashMap<PairKey, Instant>>,
    failures: Mutex<HashMap<PairKey, u32>>,
    disabled: Mutex<HashSet<AccountId>>,
}

impl FailureController {
    pub fn new(
        settings: ControllerSettings,
        storage: Arc<dyn StorageAdapter>,
        notifier: Arc<dyn Notifier>,
        pool: Arc<ConnectionPool>,
        resolver: Arc<ChatResolver>,
    ) -> Self {
        Self {
            settings,
            storage,
            notifier,
            pool,
            resolver,
            cooldowns: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            disabled: Mutex::new(HashSet::new()),
        }
    }

    /// Policy for sends that sleep out rate limits in place (Playback).
    pub fn playback_policy(&self) -> FloodWaitPolicy {
        FloodWaitPolicy {
            multiplier: self.settings.flood_multiplier,
            max_retries: self.settings.max_flood_retries,
            max_wait: self.settings.max_flood_wait,
        }
    }

    pub fn flood_wait(&self, seconds: u64) -> Duration {
        flood_wait(
            seconds,
            self.settings.flood_multiplier,
            self.settings.max_flood_wait,
        )
    }

    /// Accounts disabled during this process lifetime.
    pub async fn is_disabled(&self, account: &AccountId) -> bool {
        self.disabled.lock().await.contains(account)
    }

    /// Remaining cooldown of an account/destination pair.
    pub async fn cooldown_remaining(&self, account: &AccountId, destination: &str) -> Option<Duration> {
        let key = (account.clone(), normalize_chat_ref(destination));
        let until = *self.cooldowns.lock().await.get(&key)?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    /// Sleeps out a pending cooldown on the pair. Returns `false` when
    /// `cancel` fired first.
    pub async fn wait_cooldown(
        &self,
        account: &AccountId,
        destination: &str,
        cancel: &CancellationToken,
    ) -> bool {
        if let Some(remaining) = self.cooldown_remaining(account, destination).await {
            debug!(
                account = %account,
                destination,
                wait_secs = remaining.as_secs_f64(),
                "waiting out flood cooldown"
            );
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(remaining) => {}
            }
        }
        let key = (account.clone(), normalize_chat_ref(destination));
        let mut cooldowns = self.cooldowns.lock().await;
        if cooldowns.get(&key).is_some_and(|until| *until <= Instant::now()) {
            cooldowns.remove(&key);
        }
        true
    }

    /// Resets the consecutive failure count of the pair.
    pub async fn record_success(&self, account: &AccountId, destination: &str) {
        let key = (account.clone(), normalize_chat_ref(destination));
        self.failures.lock().await.remove(&key);
    }

    /// Applies the reaction for `error`, raised while `account` worked on
    /// `destination`.
    pub async fn handle_failure(
        &self,
        account: &AccountId,
        destination: &str,
        error: &ChorusError,
    ) -> Reaction {
        let kind = error.kind();
        telemetry::record_failure(kind);

        match kind {
            FailureKind::RateLimited => {
                let seconds = error.retry_after().unwrap_or(0);
                let wait = self.flood_wait(seconds);
                let key = (account.clone(), normalize_chat_ref(destination));
                self.cooldowns
                    .lock()
                    .await
                    .insert(key, Instant::now() + wait);
                telemetry::record_rate_limited();
                warn!(
                    account = %account,
                    destination,
                    requested_secs = seconds,
                    wait_secs = wait.as_secs_f64(),
                    "rate limited, destination paused for this account"
                );
                Reaction::Cooldown(wait)
            }
            FailureKind::PermissionDenied => {
                warn!(account = %account, destination, error = %error, "permission denied, skipping destination");
                notify_operator(
                    self.notifier.as_ref(),
                    Notification::PermissionDenied {
                        account: account.clone(),
                        chat: destination.to_string(),
                    },
                )
                .await;
                Reaction::Skipped
            }
            FailureKind::AuthRevoked => {
                self.disable_account(account, &error.to_string()).await;
                Reaction::Disabled
            }
            FailureKind::Unsupported => {
                debug!(account = %account, destination, error = %error, "content not relayable");
                Reaction::Skipped
            }
            FailureKind::ResolutionFailed => {
                // The cached id may be stale (chat migrated, account removed).
                self.resolver.invalidate(account, destination).await;
                warn!(account = %account, destination, error = %error, "chat did not resolve, will resolve again next cycle");
                self.count_failure(account, destination).await;
                Reaction::Skipped
            }
            FailureKind::Transient => {
                warn!(account = %account, destination, error = %error, "relay attempt failed, will retry next cycle");
                self.count_failure(account, destination).await;
                Reaction::Skipped
            }
        }
    }

    async fn count_failure(&self, account: &AccountId, destination: &str) {
        let key = (account.clone(), normalize_chat_ref(destination));
        let failures = {
            let mut counts = self.failures.lock().await;
            let count = counts.entry(key).or_insert(0);
            *count += 1;
            *count
        };
        if failures == self.settings.failure_notify_threshold {
            notify_operator(
                self.notifier.as_ref(),
                Notification::DestinationFailing {
                    account: account.clone(),
                    chat: destination.to_string(),
                    failures,
                },
            )
            .await;
        }
    }

    /// Disables the account permanently: persisted, disconnected, forgotten
    /// by the resolver, and reported.
    pub async fn disable_account(&self, account: &AccountId, reason: &str) {
        if !self.disabled.lock().await.insert(account.clone()) {
            return;
        }
        warn!(account = %account, reason, "disabling account");

        if let Err(e) = self.storage.set_account_enabled(account, false).await {
            warn!(account = %account, error = %e, "could not persist disabled account");
        }

        self.resolver.invalidate_account(account).await;
        self.pool.stop(account).await;
        notify_operator(
            self.notifier.as_ref(),
            Notification::AccountDisabled {
                account: account.clone(),
                reason: reason.to_string(),
            },
        )
        .await;
        info!(account = %account, "account disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chorus_config::model::JoinFallbackConfig;
    use chorus_core::ChatId;
    use chorus_test_utils::{MemoryStorage, MockClient, MockConnection, RecordingNotifier, fixtures};

    fn settings() -> ControllerSettings {
        ControllerSettings {
            flood_multiplier: 1.5,
            max_flood_wait: Duration::from_secs(3600),
            max_flood_retries: 2,
            failure_notify_threshold: 3,
        }
    }

    fn controller(
        storage: Arc<MemoryStorage>,
        notifier: Arc<RecordingNotifier>,
    ) -> (FailureController, Arc<ConnectionPool>) {
        let (controller, pool, _resolver) = controller_with_resolver(storage, notifier);
        (controller, pool)
    }

    fn controller_with_resolver(
        storage: Arc<MemoryStorage>,
        notifier: Arc<RecordingNotifier>,
    ) -> (FailureController, Arc<ConnectionPool>, Arc<ChatResolver>) {
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(MockClient::new()),
            FloodWaitPolicy {
                multiplier: 1.5,
                max_retries: 0,
                max_wait: Duration::from_secs(60),
            },
        ));
        let resolver = Arc::new(ChatResolver::new(JoinFallbackConfig::default()));
        (
            FailureController::new(settings(), storage, notifier, pool.clone(), resolver.clone()),
            pool,
            resolver,
        )
    }

    #[test]
    fn flood_wait_applies_multiplier_and_cap() {
        assert_eq!(
            flood_wait(30, 1.5, Duration::from_secs(3600)),
            Duration::from_secs(45)
        );
        assert_eq!(
            flood_wait(10_000, 1.5, Duration::from_secs(60)),
            Duration::from_secs(60)
        );
        assert_eq!(
            flood_wait(10, 1.0, Duration::from_secs(60)),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn flood_policy_only_retries_rate_limits() {
        let policy = FloodWaitPolicy {
            multiplier: 2.0,
            max_retries: 1,
            max_wait: Duration::from_secs(100),
        };
        let limited = ChorusError::RateLimited { seconds: 5 };
        let ctx = RetryContext {
            fail_count: 1,
            slept_so_far: Duration::ZERO,
            error: &limited,
        };
        assert_eq!(
            policy.should_retry(&ctx),
            ControlFlow::Continue(Duration::from_secs(10))
        );
        let ctx = RetryContext {
            fail_count: 2,
            ..ctx
        };
        assert_eq!(policy.should_retry(&ctx), ControlFlow::Break(()));

        let other = ChorusError::channel("boom");
        let ctx = RetryContext {
            fail_count: 1,
            slept_so_far: Duration::ZERO,
            error: &other,
        };
        assert_eq!(policy.should_retry(&ctx), ControlFlow::Break(()));
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_sleeps_between_attempts() {
        let policy = FloodWaitPolicy {
            multiplier: 1.5,
            max_retries: 2,
            max_wait: Duration::from_secs(3600),
        };
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result = with_retry(&policy, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ChorusError::RateLimited { seconds: 4 })
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn no_retry_returns_first_error() {
        let result: Result<(), _> =
            with_retry(&NoRetry, || async { Err(ChorusError::RateLimited { seconds: 1 }) }).await;
        assert!(matches!(result, Err(ChorusError::RateLimited { seconds: 1 })));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_sets_cooldown_on_the_pair_only() {
        let (controller, _pool) = controller(
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingNotifier::new()),
        );
        let account = AccountId::new("+1");
        let reaction = controller
            .handle_failure(&account, "@dest", &ChorusError::RateLimited { seconds: 30 })
            .await;
        assert_eq!(reaction, Reaction::Cooldown(Duration::from_secs(45)));

        let remaining = controller.cooldown_remaining(&account, "t.me/dest").await;
        assert_eq!(remaining, Some(Duration::from_secs(45)));
        assert_eq!(controller.cooldown_remaining(&account, "@other").await, None);
        assert_eq!(
            controller
                .cooldown_remaining(&AccountId::new("+2"), "@dest")
                .await,
            None
        );

        let started = Instant::now();
        assert!(
            controller
                .wait_cooldown(&account, "@dest", &CancellationToken::new())
                .await
        );
        assert!(started.elapsed() >= Duration::from_secs(45));
        assert_eq!(controller.cooldown_remaining(&account, "@dest").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_cooldown_wait_returns_false() {
        let (controller, _pool) = controller(
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingNotifier::new()),
        );
        let account = AccountId::new("+1");
        controller
            .handle_failure(&account, "@dest", &ChorusError::RateLimited { seconds: 30 })
            .await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!controller.wait_cooldown(&account, "@dest", &cancel).await);
    }

    #[tokio::test]
    async fn permission_denied_notifies_and_keeps_account() {
        let notifier = Arc::new(RecordingNotifier::new());
        let (controller, _pool) = controller(Arc::new(MemoryStorage::new()), notifier.clone());
        let account = AccountId::new("+1");
        let reaction = controller
            .handle_failure(
                &account,
                "@dest",
                &ChorusError::PermissionDenied {
                    chat: "@dest".into(),
                    message: "muted".into(),
                },
            )
            .await;
        assert_eq!(reaction, Reaction::Skipped);
        assert!(!controller.is_disabled(&account).await);
        assert_eq!(
            notifier.notifications().await,
            vec![Notification::PermissionDenied {
                account,
                chat: "@dest".into()
            }]
        );
    }

    #[tokio::test]
    async fn revoked_session_disables_account_once() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save_account(&fixtures::account("+1", &["@dest"]))
            .await
            .unwrap();
        let notifier = Arc::new(RecordingNotifier::new());
        let (controller, _pool) = controller(storage.clone(), notifier.clone());
        let account = AccountId::new("+1");
        let revoked = ChorusError::Auth {
            account: "+1".into(),
            message: "session revoked".into(),
        };

        assert_eq!(
            controller.handle_failure(&account, "@dest", &revoked).await,
            Reaction::Disabled
        );
        controller.handle_failure(&account, "@dest", &revoked).await;

        assert!(controller.is_disabled(&account).await);
        assert!(!storage.account("+1").await.unwrap().enabled);
        let disabled = notifier
            .count_matching(|n| matches!(n, Notification::AccountDisabled { .. }))
            .await;
        assert_eq!(disabled, 1);
    }

    #[tokio::test]
    async fn disable_survives_storage_failure() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_failing(true);
        let (controller, _pool) = controller(storage, Arc::new(RecordingNotifier::new()));
        let account = AccountId::new("+1");
        controller.disable_account(&account, "revoked").await;
        assert!(controller.is_disabled(&account).await);
    }

    #[tokio::test]
    async fn repeated_failures_notify_exactly_at_threshold() {
        let notifier = Arc::new(RecordingNotifier::new());
        let (controller, _pool) = controller(Arc::new(MemoryStorage::new()), notifier.clone());
        let account = AccountId::new("+1");
        for _ in 0..5 {
            controller
                .handle_failure(&account, "@dest", &ChorusError::channel("timeout"))
                .await;
        }
        let failing = || {
            notifier.count_matching(|n| matches!(n, Notification::DestinationFailing { .. }))
        };
        assert_eq!(failing().await, 1);

        controller.record_success(&account, "@dest").await;
        for _ in 0..3 {
            controller
                .handle_failure(&account, "@dest", &ChorusError::channel("timeout"))
                .await;
        }
        assert_eq!(failing().await, 2);
    }

    #[tokio::test]
    async fn resolution_failure_drops_the_cached_chat() {
        let (controller, _pool, resolver) = controller_with_resolver(
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingNotifier::new()),
        );
        let conn = MockConnection::new("+1", 1);
        conn.with_chat("@dest", 7).await;
        conn.with_chat("@other", 8).await;
        resolver.resolve(&conn, "@dest").await.unwrap();
        resolver.resolve(&conn, "@other").await.unwrap();

        let account = AccountId::new("+1");
        let reaction = controller
            .handle_failure(
                &account,
                "https://t.me/dest",
                &ChorusError::ResolutionFailed {
                    reference: "@dest".into(),
                    message: "chat not found".into(),
                },
            )
            .await;
        assert_eq!(reaction, Reaction::Skipped);
        assert_eq!(resolver.cached(&account, "@dest").await, None);
        assert_eq!(resolver.cached(&account, "@other").await, Some(ChatId(8)));

        resolver.resolve(&conn, "@dest").await.unwrap();
        assert_eq!(conn.resolve_calls(), 3);
    }

    #[tokio::test]
    async fn disabling_forgets_everything_the_account_resolved() {
        let (controller, _pool, resolver) = controller_with_resolver(
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingNotifier::new()),
        );
        let first = MockConnection::new("+1", 1);
        let second = MockConnection::new("+2", 2);
        for conn in [&first, &second] {
            conn.with_chat("@dest", 7).await;
            resolver.resolve(conn, "@dest").await.unwrap();
        }
        first.with_chat("@other", 8).await;
        resolver.resolve(&first, "@other").await.unwrap();

        controller
            .disable_account(&AccountId::new("+1"), "revoked")
            .await;
        assert_eq!(resolver.cached(&AccountId::new("+1"), "@dest").await, None);
        assert_eq!(resolver.cached(&AccountId::new("+1"), "@other").await, None);
        assert_eq!(
            resolver.cached(&AccountId::new("+2"), "@dest").await,
            Some(ChatId(7))
        );
    }
}
