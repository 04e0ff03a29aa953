// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat resolution with a per-account join cache.
//!
//! A reference resolved once by an account is never looked up (or joined)
//! again by that account. Concurrent resolutions of the same pair share one
//! underlying call; failures are not cached.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use chorus_config::model::JoinFallbackConfig;
use chorus_core::{
    AccountId, ChatId, ChatRef, ChorusError, Connection, FailureKind, normalize_chat_ref,
};

type CacheKey = (AccountId, String);

pub struct ChatResolver {
    cache: Mutex<HashMap<CacheKey, Arc<OnceCell<ChatId>>>>,
    fallback: JoinFallbackConfig,
}

impl ChatResolver {
    pub fn new(fallback: JoinFallbackConfig) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            fallback,
        }
    }

    /// Resolves `raw` for the account behind `conn`, joining when needed.
    pub async fn resolve(&self, conn: &dyn Connection, raw: &str) -> Result<ChatId, ChorusError> {
        let reference = ChatRef::parse(raw)?;
        if let ChatRef::Id(id) = reference {
            return Ok(id);
        }

        let key = (conn.identity().clone(), reference.key());
        let cell = self.cache.lock().await.entry(key).or_default().clone();
        cell.get_or_try_init(|| self.resolve_uncached(conn, &reference))
            .await
            .copied()
    }

    /// Drops any cached entry and resolves again.
    pub async fn resolve_fresh(
        &self,
        conn: &dyn Connection,
        raw: &str,
    ) -> Result<ChatId, ChorusError> {
        self.invalidate(conn.identity(), raw).await;
        self.resolve(conn, raw).await
    }

    pub async fn invalidate(&self, account: &AccountId, raw: &str) {
        let key = (account.clone(), normalize_chat_ref(raw));
        self.cache.lock().await.remove(&key);
    }

    /// Forgets everything resolved by `account`.
    pub async fn invalidate_account(&self, account: &AccountId) {
        self.cache.lock().await.retain(|(a, _), _| a != account);
    }

    /// Cached id of the pair, if resolved already.
    pub async fn cached(&self, account: &AccountId, raw: &str) -> Option<ChatId> {
        let key = (account.clone(), normalize_chat_ref(raw));
        self.cache
            .lock()
            .await
            .get(&key)
            .and_then(|cell| cell.get().copied())
    }

    async fn resolve_uncached(
        &self,
        conn: &dyn Connection,
        reference: &ChatRef,
    ) -> Result<ChatId, ChorusError> {
        let account = conn.identity();
        match reference {
            ChatRef::Id(id) => Ok(*id),
            ChatRef::Public(_) => match conn.resolve_chat(reference).await {
                Ok(id) => Ok(id),
                Err(e) if e.kind() == FailureKind::ResolutionFailed => {
                    debug!(account = %account, chat = %reference, "not a member yet, joining");
                    let joined = conn.join_chat(reference).await?;
                    Ok(conn.resolve_chat(reference).await.unwrap_or(joined))
                }
                Err(e) => Err(e),
            },
            ChatRef::Invite(hash) => {
                let memberships = conn.memberships(self.fallback.scan_limit).await?;
                if let Some(m) = memberships.iter().find(|m| {
                    m.invite_hash.as_deref() == Some(hash.as_str())
                        || m.title.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(hash))
                }) {
                    return Ok(m.chat_id);
                }
                match conn.join_chat(reference).await {
                    Ok(id) => Ok(id),
                    Err(e) if e.kind() == FailureKind::RateLimited && self.fallback.enabled => {
                        warn!(
                            account = %account,
                            chat = %reference,
                            error = %e,
                            "join rate limited, looking for a joined chat by title"
                        );
                        self.fallback_by_title(conn, reference).await
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn fallback_by_title(
        &self,
        conn: &dyn Connection,
        reference: &ChatRef,
    ) -> Result<ChatId, ChorusError> {
        let keywords: Vec<String> = self
            .fallback
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        let memberships = conn.memberships(self.fallback.scan_limit).await?;
        memberships
            .into_iter()
            .find(|m| {
                m.title.as_deref().is_some_and(|title| {
                    let title = title.to_lowercase();
                    keywords.iter().any(|k| title.contains(k.as_str()))
                })
            })
            .map(|m| m.chat_id)
            .ok_or_else(|| ChorusError::ResolutionFailed {
                reference: reference.to_string(),
                message: "join rate limited and no joined chat matches the fallback keywords"
                    .into(),
            })
    }
}
