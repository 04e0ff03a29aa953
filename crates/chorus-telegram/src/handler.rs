// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of incoming Telegram updates into relay messages.
//!
//! Media is carried by file id so that relaying never downloads or
//! re-uploads anything.

use chorus_core::{ChatId, Content, InboundMessage, Media, Membership, MessageId, UserId};
use teloxide::types::{Chat, Message};

/// Extracts relayable content from a Telegram message.
///
/// Returns `None` for message types the relay does not forward (polls,
/// locations, service messages, and so on).
pub fn extract_content(msg: &Message) -> Option<Content> {
    if let Some(text) = msg.text() {
        return Some(Content::Text(text.to_string()));
    }

    let caption = msg.caption().map(str::to_string);
    let media = |file_ref: String| Media {
        file_ref,
        caption: caption.clone(),
    };

    // The last photo size is the largest.
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        return Some(Content::Photo(media(photo.file.id.to_string())));
    }
    // Animations also carry a document; check them first.
    if let Some(animation) = msg.animation() {
        return Some(Content::Animation(media(animation.file.id.to_string())));
    }
    if let Some(video) = msg.video() {
        return Some(Content::Video(media(video.file.id.to_string())));
    }
    if let Some(voice) = msg.voice() {
        return Some(Content::Voice(media(voice.file.id.to_string())));
    }
    if let Some(sticker) = msg.sticker() {
        return Some(Content::Sticker(Media::new(sticker.file.id.to_string())));
    }
    None
}

/// Converts a Telegram message into an [`InboundMessage`].
pub fn to_inbound_message(msg: &Message) -> InboundMessage {
    let parent = msg.reply_to_message();
    InboundMessage {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(i64::from(msg.id.0)),
        sender: msg.from.as_ref().map(|u| UserId(u.id.0 as i64)),
        chat_title: msg.chat.title().map(str::to_string),
        content: extract_content(msg),
        reply_to: parent.map(|p| MessageId(i64::from(p.id.0))),
        reply_text: parent.and_then(|p| p.text().or_else(|| p.caption()).map(str::to_string)),
    }
}

/// Describes a chat the bot has seen as a membership entry.
pub fn to_membership(chat: &Chat) -> Membership {
    Membership {
        chat_id: ChatId(chat.id.0),
        title: chat.title().map(str::to_string),
        handle: chat.username().map(str::to_lowercase),
        invite_hash: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_message(body: serde_json::Value) -> Message {
        let mut json = serde_json::json!({
            "message_id": 7,
            "date": 1700000000i64,
            "chat": {
                "id": -100123i64,
                "type": "supergroup",
                "title": "Source Group",
                "username": "SourceGroup",
            },
            "from": {
                "id": 4242u64,
                "is_bot": false,
                "first_name": "Alice",
            },
        });
        if let (Some(target), Some(extra)) = (json.as_object_mut(), body.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(json).expect("failed to deserialize mock message")
    }

    #[test]
    fn text_message_maps_fields() {
        let msg = group_message(serde_json::json!({ "text": "hello" }));
        let inbound = to_inbound_message(&msg);

        assert_eq!(inbound.chat_id, ChatId(-100123));
        assert_eq!(inbound.message_id, MessageId(7));
        assert_eq!(inbound.sender, Some(UserId(4242)));
        assert_eq!(inbound.chat_title.as_deref(), Some("Source Group"));
        assert_eq!(inbound.content, Some(Content::Text("hello".into())));
        assert!(inbound.reply_to.is_none());
    }

    #[test]
    fn photo_uses_largest_size_and_keeps_caption() {
        let msg = group_message(serde_json::json!({
            "caption": "look",
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90 },
                { "file_id": "large", "file_unique_id": "l", "width": 800, "height": 800 },
            ],
        }));
        assert_eq!(
            extract_content(&msg),
            Some(Content::Photo(Media::new("large").with_caption("look")))
        );
    }

    #[test]
    fn reply_carries_parent_id_and_text() {
        let msg = group_message(serde_json::json!({
            "text": "agreed",
            "reply_to_message": {
                "message_id": 5,
                "date": 1699999999i64,
                "chat": { "id": -100123i64, "type": "supergroup", "title": "Source Group" },
                "text": "shall we?",
            },
        }));
        let inbound = to_inbound_message(&msg);
        assert_eq!(inbound.reply_to, Some(MessageId(5)));
        assert_eq!(inbound.reply_text.as_deref(), Some("shall we?"));
    }

    #[test]
    fn unsupported_content_is_none() {
        let msg = group_message(serde_json::json!({
            "location": { "latitude": 1.0, "longitude": 2.0 },
        }));
        assert!(extract_content(&msg).is_none());
        assert!(to_inbound_message(&msg).content.is_none());
    }

    #[test]
    fn membership_lowercases_handle() {
        let msg = group_message(serde_json::json!({ "text": "x" }));
        let membership = to_membership(&msg.chat);
        assert_eq!(membership.chat_id, ChatId(-100123));
        assert_eq!(membership.handle.as_deref(), Some("sourcegroup"));
        assert_eq!(membership.title.as_deref(), Some("Source Group"));
    }
}
