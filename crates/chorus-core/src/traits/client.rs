// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-platform client capability consumed by the relay engine.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChorusError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Account, AccountId, ChatId, ChatRef, InboundMessage, Membership, MessageId, OutboundMessage,
    Proxy, UserId,
};

/// Opens authenticated connections for accounts.
#[async_trait]
pub trait ChatClient: PluginAdapter {
    /// Connects using the account's stored session, through `proxy` if given.
    ///
    /// Returns [`ChorusError::Auth`] when the session is revoked or invalid.
    async fn connect(
        &self,
        account: &Account,
        proxy: Option<&Proxy>,
    ) -> Result<Arc<dyn Connection>, ChorusError>;
}

/// One long-lived authenticated connection of a single account.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// The account this connection belongs to.
    fn identity(&self) -> &AccountId;

    /// The platform user id of the connected account.
    fn self_user(&self) -> UserId;

    /// Whether the connection is still usable.
    fn is_live(&self) -> bool;

    /// Looks up a chat without joining it.
    async fn resolve_chat(&self, reference: &ChatRef) -> Result<ChatId, ChorusError>;

    /// Joins a chat (public handle or private invite) and returns its id.
    async fn join_chat(&self, reference: &ChatRef) -> Result<ChatId, ChorusError>;

    /// Most recent chats this connection is a member of, newest first.
    async fn memberships(&self, limit: usize) -> Result<Vec<Membership>, ChorusError>;

    /// Sends a message and returns the id it received in the destination.
    async fn send(&self, message: OutboundMessage) -> Result<MessageId, ChorusError>;

    /// Shows a "typing" indicator in the chat.
    async fn send_typing(&self, chat: ChatId) -> Result<(), ChorusError>;

    /// Starts delivering inbound messages into a bounded channel.
    async fn subscribe(
        &self,
        capacity: usize,
    ) -> Result<mpsc::Receiver<InboundMessage>, ChorusError>;

    /// Closes the connection.
    async fn disconnect(&self) -> Result<(), ChorusError>;
}
