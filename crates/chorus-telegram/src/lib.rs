// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram Bot API backend for the Chorus relay engine.
//!
//! Implements [`ChatClient`] via teloxide, where every pool account's session
//! credential is a bot token. Each connection long-polls for updates, keeps
//! track of the chats it has seen, and relays media by file id, handing
//! files over between bots when the sender did not receive them. Account
//! proxies are applied to the bot's HTTP client. Also provides
//! [`TelegramNotifier`] for operator notifications.

pub mod error;
pub mod handler;
mod media;
pub mod notifier;
pub mod send;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chorus_core::{
    Account, AccountId, AdapterType, ChatClient, ChatId, ChatRef, ChorusError, Connection,
    HealthStatus, InboundMessage, Membership, MessageId, OutboundMessage, PluginAdapter, Proxy,
    ProxyScheme, UserId,
};
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId as TgChatId, Recipient, ReplyParameters};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Target, map_request_error};
use crate::media::FileOwners;

pub use notifier::TelegramNotifier;

/// Opens one bot connection per account. Connections of one client share
/// the record of which bot received which media file.
#[derive(Default)]
pub struct TelegramClient {
    files: Arc<FileOwners>,
}

impl TelegramClient {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The proxy a bot's HTTP client goes through. Only schemes the HTTP client
/// can speak are accepted; anything else fails rather than bypassing the proxy.
fn http_proxy(proxy: &Proxy) -> Result<reqwest::Proxy, ChorusError> {
    match proxy.scheme {
        ProxyScheme::Http | ProxyScheme::Socks5 => reqwest::Proxy::all(proxy.url())
            .map_err(|e| ChorusError::Config(format!("proxy #{}: {e}", proxy.id))),
        ProxyScheme::Socks4 | ProxyScheme::Mtproto => Err(ChorusError::Config(format!(
            "proxy #{} uses {}, which the Bot API backend cannot route through",
            proxy.id, proxy.scheme
        ))),
    }
}

/// A bot for `token`, routed through `proxy` when one is given.
fn build_bot(token: &str, proxy: Option<&Proxy>) -> Result<Bot, ChorusError> {
    let Some(proxy) = proxy else {
        return Ok(Bot::new(token));
    };
    let client = teloxide::net::default_reqwest_settings()
        .proxy(http_proxy(proxy)?)
        .build()
        .map_err(|e| ChorusError::Internal(format!("could not build HTTP client: {e}")))?;
    Ok(Bot::with_client(token, client))
}

#[async_trait]
impl PluginAdapter for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Client
    }

    async fn health_check(&self) -> Result<HealthStatus, ChorusError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ChorusError> {
        debug!("Telegram client shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn connect(
        &self,
        account: &Account,
        proxy: Option<&Proxy>,
    ) -> Result<Arc<dyn Connection>, ChorusError> {
        let token = account.session.expose();
        if token.is_empty() {
            return Err(ChorusError::Auth {
                account: account.id.to_string(),
                message: "empty bot token".into(),
            });
        }
        let bot = build_bot(token, proxy).inspect_err(|e| {
            warn!(account = %account.id, error = %e, "proxy unusable, account not connected");
        })?;
        if let Some(proxy) = proxy {
            debug!(account = %account.id, proxy = proxy.id, "bot routed through proxy");
        }
        let me = bot
            .get_me()
            .await
            .map_err(|e| map_request_error(e, &account.id, Target::Account))?;
        let self_user = UserId(me.user.id.0 as i64);

        let conn = BotConnection::new(account.id.clone(), bot, self_user, self.files.clone());
        conn.start_polling();
        info!(account = %account.id, bot_user = %self_user, "bot connected");
        Ok(Arc::new(conn))
    }
}

/// Chats seen in updates, with a recency stamp.
#[derive(Default)]
struct SeenChats {
    next: AtomicU64,
    chats: RwLock<HashMap<ChatId, (u64, Membership)>>,
}

impl SeenChats {
    async fn record(&self, membership: Membership) {
        let stamp = self.next.fetch_add(1, Ordering::Relaxed);
        self.chats
            .write()
            .await
            .insert(membership.chat_id, (stamp, membership));
    }

    async fn newest(&self, limit: usize) -> Vec<Membership> {
        let chats = self.chats.read().await;
        let mut entries: Vec<_> = chats.values().collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries
            .into_iter()
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect()
    }

    async fn find_handle(&self, handle: &str) -> Option<ChatId> {
        self.chats
            .read()
            .await
            .values()
            .find(|(_, m)| m.handle.as_deref() == Some(handle))
            .map(|(_, m)| m.chat_id)
    }
}

/// State shared between a connection and its polling task.
struct Shared {
    account: AccountId,
    bot: Bot,
    seen: SeenChats,
    files: Arc<FileOwners>,
    subscriber: Mutex<Option<mpsc::Sender<InboundMessage>>>,
}

impl Shared {
    async fn deliver(&self, msg: &Message) {
        self.seen.record(handler::to_membership(&msg.chat)).await;

        let inbound = handler::to_inbound_message(msg);
        if let Some(media) = inbound.content.as_ref().and_then(|c| c.media()) {
            self.files.record(&media.file_ref, &self.account, &self.bot).await;
        }

        let Some(tx) = self.subscriber.lock().await.clone() else {
            return;
        };
        if tx.send(inbound).await.is_err() {
            debug!(chat_id = msg.chat.id.0, "inbound subscriber gone, dropping message");
            let mut current = self.subscriber.lock().await;
            if current.as_ref().is_some_and(|c| c.same_channel(&tx)) {
                *current = None;
            }
        }
    }
}

/// A long-polling bot connection of one account.
pub struct BotConnection {
    account: AccountId,
    bot: Bot,
    self_user: UserId,
    shared: Arc<Shared>,
    live: AtomicBool,
    polling: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BotConnection {
    fn new(account: AccountId, bot: Bot, self_user: UserId, files: Arc<FileOwners>) -> Self {
        Self {
            shared: Arc::new(Shared {
                account: account.clone(),
                bot: bot.clone(),
                seen: SeenChats::default(),
                files,
                subscriber: Mutex::new(None),
            }),
            account,
            bot,
            self_user,
            live: AtomicBool::new(true),
            polling: std::sync::Mutex::new(None),
        }
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    fn start_polling(&self) {
        let bot = self.bot.clone();
        let messages = self.shared.clone();
        let posts = self.shared.clone();
        let account = self.account.clone();

        let handle = tokio::spawn(async move {
            let handler = dptree::entry()
                .branch(Update::filter_message().endpoint(move |msg: Message| {
                    let shared = messages.clone();
                    async move {
                        shared.deliver(&msg).await;
                        respond(())
                    }
                }))
                .branch(Update::filter_channel_post().endpoint(move |msg: Message| {
                    let shared = posts.clone();
                    async move {
                        shared.deliver(&msg).await;
                        respond(())
                    }
                }));

            debug!(account = %account, "starting long polling");
            Dispatcher::builder(bot, handler)
                .default_handler(|_| async {})
                .build()
                .dispatch()
                .await;
            debug!(account = %account, "long polling ended");
        });

        if let Ok(mut slot) = self.polling.lock() {
            *slot = Some(handle);
        }
    }

    fn err(&self, e: teloxide::RequestError, target: Target<'_>) -> ChorusError {
        map_request_error(e, &self.account, target)
    }
}

#[async_trait]
impl Connection for BotConnection {
    fn identity(&self) -> &AccountId {
        &self.account
    }

    fn self_user(&self) -> UserId {
        self.self_user
    }

    fn is_live(&self) -> bool {
        if !self.live.load(Ordering::Acquire) {
            return false;
        }
        match self.polling.lock() {
            Ok(slot) => slot.as_ref().is_some_and(|h| !h.is_finished()),
            Err(_) => false,
        }
    }

    async fn resolve_chat(&self, reference: &ChatRef) -> Result<ChatId, ChorusError> {
        match reference {
            ChatRef::Id(id) => Ok(*id),
            ChatRef::Public(handle) => {
                if let Some(id) = self.shared.seen.find_handle(handle).await {
                    return Ok(id);
                }
                let raw = reference.to_string();
                let chat = self
                    .bot
                    .get_chat(Recipient::ChannelUsername(format!("@{handle}")))
                    .await
                    .map_err(|e| self.err(e, Target::Reference(&raw)))?;
                Ok(ChatId(chat.id.0))
            }
            ChatRef::Invite(_) => Err(ChorusError::ResolutionFailed {
                reference: reference.to_string(),
                message: "bots cannot look up invite links".into(),
            }),
        }
    }

    async fn join_chat(&self, reference: &ChatRef) -> Result<ChatId, ChorusError> {
        Err(ChorusError::ResolutionFailed {
            reference: reference.to_string(),
            message: "bots cannot join chats, add the bot to the chat instead".into(),
        })
    }

    async fn memberships(&self, limit: usize) -> Result<Vec<Membership>, ChorusError> {
        Ok(self.shared.seen.newest(limit).await)
    }

    async fn send(&self, message: OutboundMessage) -> Result<MessageId, ChorusError> {
        let reply = message
            .reply_to
            .map(send::to_tg_message_id)
            .transpose()?
            .map(ReplyParameters::new);
        let upload = match message.content.media() {
            Some(media) => self.shared.files.upload_for(&self.account, media).await?,
            None => None,
        };
        let sent = send::send_content(
            &self.bot,
            TgChatId(message.chat_id.0),
            &message.content,
            reply,
            upload,
        )
        .await
            .map_err(|e| self.err(e, Target::Chat(message.chat_id)))?;
        Ok(MessageId(i64::from(sent.id.0)))
    }

    async fn send_typing(&self, chat: ChatId) -> Result<(), ChorusError> {
        self.bot
            .send_chat_action(TgChatId(chat.0), ChatAction::Typing)
            .await
            .map_err(|e| self.err(e, Target::Chat(chat)))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        capacity: usize,
    ) -> Result<mpsc::Receiver<InboundMessage>, ChorusError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        *self.shared.subscriber.lock().await = Some(tx);
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<(), ChorusError> {
        self.live.store(false, Ordering::Release);
        *self.shared.subscriber.lock().await = None;
        if let Ok(mut slot) = self.polling.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
        }
        info!(account = %self.account, "bot disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::SessionToken;

    fn membership(id: i64, handle: Option<&str>) -> Membership {
        Membership {
            chat_id: ChatId(id),
            title: None,
            handle: handle.map(str::to_string),
            invite_hash: None,
        }
    }

    #[tokio::test]
    async fn seen_chats_are_newest_first() {
        let seen = SeenChats::default();
        seen.record(membership(1, None)).await;
        seen.record(membership(2, Some("two"))).await;
        seen.record(membership(3, None)).await;
        seen.record(membership(1, None)).await;

        let ids: Vec<_> = seen.newest(10).await.iter().map(|m| m.chat_id).collect();
        assert_eq!(ids, vec![ChatId(1), ChatId(3), ChatId(2)]);
        assert_eq!(seen.newest(1).await.len(), 1);
        assert_eq!(seen.find_handle("two").await, Some(ChatId(2)));
    }

    #[tokio::test]
    async fn empty_token_is_an_auth_failure() {
        let account = Account::new("bot-1", SessionToken::new(""));
        match TelegramClient::new().connect(&account, None).await {
            Err(ChorusError::Auth { account, .. }) => assert_eq!(account, "bot-1"),
            Err(other) => panic!("expected Auth, got {other:?}"),
            Ok(_) => panic!("expected Auth, got a connection"),
        }
    }

    #[tokio::test]
    async fn connection_without_network_calls() {
        let conn = BotConnection::new(
            AccountId::new("bot-1"),
            Bot::new("123:token"),
            UserId(123),
            Arc::new(FileOwners::default()),
        );
        assert_eq!(conn.identity().as_str(), "bot-1");
        assert_eq!(conn.self_user(), UserId(123));
        assert!(!conn.is_live());

        assert_eq!(
            conn.resolve_chat(&ChatRef::Id(ChatId(-5))).await.unwrap(),
            ChatId(-5)
        );
        assert!(matches!(
            conn.resolve_chat(&ChatRef::Invite("abc".into())).await,
            Err(ChorusError::ResolutionFailed { .. })
        ));
        assert!(matches!(
            conn.join_chat(&ChatRef::Public("group".into())).await,
            Err(ChorusError::ResolutionFailed { .. })
        ));

        conn.shared.seen.record(membership(-100, Some("group"))).await;
        assert_eq!(
            conn.resolve_chat(&ChatRef::Public("group".into())).await.unwrap(),
            ChatId(-100)
        );
        assert_eq!(conn.memberships(5).await.unwrap().len(), 1);
    }

    fn proxy(scheme: ProxyScheme) -> Proxy {
        Proxy {
            id: 3,
            scheme,
            host: "10.0.0.1".into(),
            port: 1080,
            username: Some("u".into()),
            password: Some("p".into()),
        }
    }

    #[test]
    fn http_and_socks5_proxies_are_routed() {
        assert!(http_proxy(&proxy(ProxyScheme::Http)).is_ok());
        assert!(http_proxy(&proxy(ProxyScheme::Socks5)).is_ok());
        assert!(build_bot("123:token", Some(&proxy(ProxyScheme::Socks5))).is_ok());
        assert!(build_bot("123:token", None).is_ok());
    }

    #[test]
    fn unroutable_proxy_is_refused() {
        for scheme in [ProxyScheme::Socks4, ProxyScheme::Mtproto] {
            match build_bot("123:token", Some(&proxy(scheme))) {
                Err(ChorusError::Config(message)) => assert!(message.contains("proxy #3")),
                Err(other) => panic!("expected Config, got {other:?}"),
                Ok(_) => panic!("{scheme} proxy must not connect directly"),
            }
        }
    }

    #[tokio::test]
    async fn unroutable_proxy_fails_before_any_request() {
        let account = Account::new("bot-1", SessionToken::new("123:token"));
        let result = TelegramClient::new()
            .connect(&account, Some(&proxy(ProxyScheme::Mtproto)))
            .await;
        assert!(matches!(result, Err(ChorusError::Config(_))));
    }

    #[tokio::test]
    async fn resubscribing_replaces_the_sender() {
        let conn = BotConnection::new(
            AccountId::new("bot-1"),
            Bot::new("123:token"),
            UserId(1),
            Arc::new(FileOwners::default()),
        );
        let mut first = conn.subscribe(4).await.unwrap();
        let _second = conn.subscribe(4).await.unwrap();
        assert!(first.recv().await.is_none());

        conn.disconnect().await.unwrap();
        assert!(conn.shared.subscriber.lock().await.is_none());
    }
}
