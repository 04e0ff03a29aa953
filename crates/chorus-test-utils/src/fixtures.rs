// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for accounts and inbound messages.

use chorus_core::{
    Account, ChatId, Content, InboundMessage, Media, MessageId, SessionToken, UserId,
};

/// An enabled account posting into `destinations`.
pub fn account(id: &str, destinations: &[&str]) -> Account {
    let mut account = Account::new(id, SessionToken::new(format!("session-{id}")));
    account.destinations = destinations.iter().map(|d| d.to_string()).collect();
    account
}

/// An enabled account watching `source` and posting into `destinations`.
pub fn watcher(id: &str, source: &str, destinations: &[&str]) -> Account {
    let mut account = account(id, destinations);
    account.source_chat = Some(source.to_string());
    account
}

pub fn text_message(chat: i64, id: i64, sender: Option<i64>, text: &str) -> InboundMessage {
    InboundMessage {
        chat_id: ChatId(chat),
        message_id: MessageId(id),
        sender: sender.map(UserId),
        chat_title: None,
        content: Some(Content::Text(text.to_string())),
        reply_to: None,
        reply_text: None,
    }
}

/// A text message replying to `parent` (whose text was `parent_text`).
pub fn reply_message(
    chat: i64,
    id: i64,
    sender: Option<i64>,
    text: &str,
    parent: i64,
    parent_text: Option<&str>,
) -> InboundMessage {
    let mut msg = text_message(chat, id, sender, text);
    msg.reply_to = Some(MessageId(parent));
    msg.reply_text = parent_text.map(str::to_string);
    msg
}

pub fn photo_message(chat: i64, id: i64, sender: Option<i64>, file: &str) -> InboundMessage {
    let mut msg = text_message(chat, id, sender, "");
    msg.content = Some(Content::Photo(Media::new(file)));
    msg
}

/// A message whose content the relay does not forward.
pub fn unsupported_message(chat: i64, id: i64, sender: Option<i64>) -> InboundMessage {
    let mut msg = text_message(chat, id, sender, "");
    msg.content = None;
    msg
}
