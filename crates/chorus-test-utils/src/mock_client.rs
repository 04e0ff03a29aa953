// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat-platform client for deterministic relay tests.
//!
//! `MockClient` hands out `MockConnection`s. Each connection has scriptable
//! chats, memberships, and failures, captures everything it sends, and lets
//! tests inject inbound messages into a subscribed stream.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use chorus_core::{
    Account, AccountId, AdapterType, ChatClient, ChatId, ChatRef, ChorusError, Connection,
    HealthStatus, InboundMessage, Membership, MessageId, OutboundMessage, PluginAdapter, Proxy,
    UserId,
};

/// One message a mock connection delivered.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub message: OutboundMessage,
    pub id: MessageId,
    pub at: Instant,
}

/// A mock connection of one account.
pub struct MockConnection {
    account: AccountId,
    user: UserId,
    live: AtomicBool,
    resolvable: Mutex<HashMap<ChatRef, ChatId>>,
    joinable: Mutex<HashMap<ChatRef, ChatId>>,
    memberships: Mutex<Vec<Membership>>,
    resolve_delay: Mutex<Duration>,
    join_failures: Mutex<VecDeque<ChorusError>>,
    send_failures: Mutex<HashMap<ChatId, VecDeque<ChorusError>>>,
    fail_disconnect: AtomicBool,
    resolve_calls: AtomicUsize,
    join_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    next_message_id: AtomicI64,
    sent: Mutex<Vec<SentRecord>>,
    attempts: Mutex<Vec<(ChatId, Instant)>>,
    typing: Mutex<Vec<ChatId>>,
    inbound: Mutex<Option<mpsc::Sender<InboundMessage>>>,
}

impl MockConnection {
    pub fn new(account: impl Into<String>, user: i64) -> Self {
        Self {
            account: AccountId::new(account),
            user: UserId(user),
            live: AtomicBool::new(true),
            resolvable: Mutex::new(HashMap::new()),
            joinable: Mutex::new(HashMap::new()),
            memberships: Mutex::new(Vec::new()),
            resolve_delay: Mutex::new(Duration::ZERO),
            join_failures: Mutex::new(VecDeque::new()),
            send_failures: Mutex::new(HashMap::new()),
            fail_disconnect: AtomicBool::new(false),
            resolve_calls: AtomicUsize::new(0),
            join_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            next_message_id: AtomicI64::new(user * 1000 + 1),
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(Vec::new()),
            typing: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
        }
    }

    /// Makes `raw` resolvable by lookup (the account is already a member).
    pub async fn with_chat(&self, raw: &str, id: i64) {
        let reference = parse(raw);
        self.resolvable.lock().await.insert(reference, ChatId(id));
    }

    /// Makes `raw` joinable; after joining it becomes resolvable and a membership.
    pub async fn with_joinable(&self, raw: &str, id: i64) {
        let reference = parse(raw);
        self.joinable.lock().await.insert(reference, ChatId(id));
    }

    pub async fn with_membership(&self, membership: Membership) {
        self.memberships.lock().await.push(membership);
    }

    /// Delays every lookup, to widen race windows.
    pub async fn set_resolve_delay(&self, delay: Duration) {
        *self.resolve_delay.lock().await = delay;
    }

    /// The next join fails with `error`.
    pub async fn fail_next_join(&self, error: ChorusError) {
        self.join_failures.lock().await.push_back(error);
    }

    /// The next send into `chat` fails with `error`.
    pub async fn fail_next_send(&self, chat: i64, error: ChorusError) {
        self.send_failures
            .lock()
            .await
            .entry(ChatId(chat))
            .or_default()
            .push_back(error);
    }

    pub fn fail_disconnect(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    /// Pushes a message into the subscribed inbound stream.
    pub async fn inject(&self, message: InboundMessage) -> bool {
        let sender = self.inbound.lock().await.clone();
        match sender {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }

    pub async fn is_subscribed(&self) -> bool {
        self.inbound.lock().await.is_some()
    }

    pub async fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, chat: i64) -> Vec<SentRecord> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|r| r.message.chat_id == ChatId(chat))
            .cloned()
            .collect()
    }

    /// Every send attempt, successful or not, with its time.
    pub async fn attempts(&self) -> Vec<(ChatId, Instant)> {
        self.attempts.lock().await.clone()
    }

    pub async fn typing_events(&self) -> Vec<ChatId> {
        self.typing.lock().await.clone()
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn join_calls(&self) -> usize {
        self.join_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

fn parse(raw: &str) -> ChatRef {
    ChatRef::parse(raw).unwrap_or_else(|_| ChatRef::Public(raw.to_string()))
}

#[async_trait]
impl Connection for MockConnection {
    fn identity(&self) -> &AccountId {
        &self.account
    }

    fn self_user(&self) -> UserId {
        self.user
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn resolve_chat(&self, reference: &ChatRef) -> Result<ChatId, ChorusError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.resolve_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let ChatRef::Id(id) = reference {
            return Ok(*id);
        }
        self.resolvable
            .lock()
            .await
            .get(reference)
            .copied()
            .ok_or_else(|| ChorusError::ResolutionFailed {
                reference: reference.to_string(),
                message: "not a member".into(),
            })
    }

    async fn join_chat(&self, reference: &ChatRef) -> Result<ChatId, ChorusError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.join_failures.lock().await.pop_front() {
            return Err(err);
        }
        let id = self.joinable.lock().await.get(reference).copied().ok_or_else(|| {
            ChorusError::ResolutionFailed {
                reference: reference.to_string(),
                message: "no such chat".into(),
            }
        })?;
        self.resolvable.lock().await.insert(reference.clone(), id);
        let invite_hash = match reference {
            ChatRef::Invite(hash) => Some(hash.clone()),
            _ => None,
        };
        self.memberships.lock().await.insert(
            0,
            Membership {
                chat_id: id,
                title: None,
                handle: None,
                invite_hash,
            },
        );
        Ok(id)
    }

    async fn memberships(&self, limit: usize) -> Result<Vec<Membership>, ChorusError> {
        Ok(self
            .memberships
            .lock()
            .await
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn send(&self, message: OutboundMessage) -> Result<MessageId, ChorusError> {
        let now = Instant::now();
        self.attempts.lock().await.push((message.chat_id, now));
        if let Some(queue) = self.send_failures.lock().await.get_mut(&message.chat_id)
            && let Some(err) = queue.pop_front()
        {
            return Err(err);
        }
        let id = MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst));
        self.sent.lock().await.push(SentRecord {
            message,
            id,
            at: now,
        });
        Ok(id)
    }

    async fn send_typing(&self, chat: ChatId) -> Result<(), ChorusError> {
        self.typing.lock().await.push(chat);
        Ok(())
    }

    async fn subscribe(
        &self,
        capacity: usize,
    ) -> Result<mpsc::Receiver<InboundMessage>, ChorusError> {
        let (tx, rx) = mpsc::channel(capacity);
        *self.inbound.lock().await = Some(tx);
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<(), ChorusError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
        self.inbound.lock().await.take();
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ChorusError::channel("connection already dead"));
        }
        Ok(())
    }
}

/// Mock client that hands out registered (or fresh) mock connections.
#[derive(Default)]
pub struct MockClient {
    connections: Mutex<HashMap<AccountId, Arc<MockConnection>>>,
    connect_failures: Mutex<HashMap<AccountId, VecDeque<ChorusError>>>,
    connect_calls: Mutex<HashMap<AccountId, usize>>,
    proxies_seen: Mutex<Vec<(AccountId, Option<i64>)>>,
    next_user: AtomicI64,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the connection returned for its account.
    pub async fn register(&self, connection: Arc<MockConnection>) {
        self.connections
            .lock()
            .await
            .insert(connection.identity().clone(), connection);
    }

    /// Creates and registers a connection for `account`.
    pub async fn connection(&self, account: &str, user: i64) -> Arc<MockConnection> {
        let conn = Arc::new(MockConnection::new(account, user));
        self.register(conn.clone()).await;
        conn
    }

    /// The next connect for `account` fails with `error`.
    pub async fn fail_next_connect(&self, account: &str, error: ChorusError) {
        self.connect_failures
            .lock()
            .await
            .entry(AccountId::new(account))
            .or_default()
            .push_back(error);
    }

    pub async fn connect_calls(&self, account: &str) -> usize {
        self.connect_calls
            .lock()
            .await
            .get(&AccountId::new(account))
            .copied()
            .unwrap_or(0)
    }

    /// Proxy ids connections were opened with, in call order.
    pub async fn proxies_seen(&self) -> Vec<(AccountId, Option<i64>)> {
        self.proxies_seen.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockClient {
    fn name(&self) -> &str {
        "mock-client"
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
        Ok(())
    }
}

#[async_trait]
impl ChatClient for MockClient {
    async fn connect(
        &self,
        account: &Account,
        proxy: Option<&Proxy>,
    ) -> Result<Arc<dyn Connection>, ChorusError> {
        *self
            .connect_calls
            .lock()
            .await
            .entry(account.id.clone())
            .or_default() += 1;
        self.proxies_seen
            .lock()
            .await
            .push((account.id.clone(), proxy.map(|p| p.id)));

        if let Some(queue) = self.connect_failures.lock().await.get_mut(&account.id)
            && let Some(err) = queue.pop_front()
        {
            return Err(err);
        }

        let mut connections = self.connections.lock().await;
        let conn = match connections.get(&account.id) {
            Some(conn) => {
                conn.set_live(true);
                conn.clone()
            }
            None => {
                let user = 9_000 + self.next_user.fetch_add(1, Ordering::SeqCst);
                let conn = Arc::new(MockConnection::new(account.id.0.clone(), user));
                connections.insert(account.id.clone(), conn.clone());
                conn
            }
        };
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::{Content, SessionToken};

    #[tokio::test]
    async fn send_captures_and_numbers_messages() {
        let conn = MockConnection::new("+1", 1);
        let id = conn
            .send(OutboundMessage {
                chat_id: ChatId(5),
                content: Content::Text("hi".into()),
                reply_to: None,
            })
            .await
            .unwrap();
        assert_eq!(id, MessageId(1001));
        assert_eq!(conn.sent_to(5).await.len(), 1);
    }

    #[tokio::test]
    async fn scripted_send_failure_is_returned_once() {
        let conn = MockConnection::new("+1", 1);
        conn.fail_next_send(5, ChorusError::RateLimited { seconds: 3 })
            .await;
        let msg = OutboundMessage {
            chat_id: ChatId(5),
            content: Content::Text("hi".into()),
            reply_to: None,
        };
        assert!(conn.send(msg.clone()).await.is_err());
        assert!(conn.send(msg).await.is_ok());
        assert_eq!(conn.attempts().await.len(), 2);
    }

    #[tokio::test]
    async fn join_makes_chat_resolvable() {
        let conn = MockConnection::new("+1", 1);
        conn.with_joinable("@club", 77).await;
        let reference = ChatRef::parse("@club").unwrap();
        assert!(conn.resolve_chat(&reference).await.is_err());
        assert_eq!(conn.join_chat(&reference).await.unwrap(), ChatId(77));
        assert_eq!(conn.resolve_chat(&reference).await.unwrap(), ChatId(77));
    }

    #[tokio::test]
    async fn client_returns_registered_connection() {
        let client = MockClient::new();
        let registered = client.connection("+1", 11).await;
        let account = Account::new("+1", SessionToken::new("s"));
        let conn = client.connect(&account, None).await.unwrap();
        assert_eq!(conn.self_user(), registered.self_user());
        assert_eq!(client.connect_calls("+1").await, 1);
    }

    #[tokio::test]
    async fn inject_reaches_subscriber() {
        let conn = MockConnection::new("+1", 1);
        let mut rx = conn.subscribe(4).await.unwrap();
        assert!(conn.inject(crate::fixtures::text_message(10, 1, Some(5), "yo")).await);
        assert_eq!(rx.recv().await.unwrap().message_id, MessageId(1));
    }
}
