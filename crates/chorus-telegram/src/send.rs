// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound delivery of relay content through the Bot API.

use chorus_core::{ChorusError, Content, Media, MessageId};
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId as TgChatId, FileId, InputFile, MessageId as TgMessageId, ReplyParameters,
};

/// Converts a relay message id into a Bot API one.
pub(crate) fn to_tg_message_id(id: MessageId) -> Result<TgMessageId, ChorusError> {
    i32::try_from(id.0)
        .map(TgMessageId)
        .map_err(|_| ChorusError::Internal(format!("message id {id} out of Bot API range")))
}

fn file(media: &Media) -> InputFile {
    InputFile::file_id(FileId(media.file_ref.clone()))
}

/// Sends `content` to `chat`, optionally as a reply, and returns the
/// resulting message. Media goes out by file id unless `upload` replaces it.
pub(crate) async fn send_content(
    bot: &Bot,
    chat: TgChatId,
    content: &Content,
    reply: Option<ReplyParameters>,
    upload: Option<InputFile>,
) -> Result<Message, RequestError> {
    match content {
        Content::Text(text) => {
            let mut req = bot.send_message(chat, text);
            if let Some(reply) = reply {
                req = req.reply_parameters(reply);
            }
            req.await
        }
        Content::Photo(media) => {
            let mut req = bot.send_photo(chat, upload.unwrap_or_else(|| file(media)));
            if let Some(caption) = &media.caption {
                req = req.caption(caption);
            }
            if let Some(reply) = reply {
                req = req.reply_parameters(reply);
            }
            req.await
        }
        Content::Video(media) => {
            let mut req = bot.send_video(chat, upload.unwrap_or_else(|| file(media)));
            if let Some(caption) = &media.caption {
                req = req.caption(caption);
            }
            if let Some(reply) = reply {
                req = req.reply_parameters(reply);
            }
            req.await
        }
        Content::Animation(media) => {
            let mut req = bot.send_animation(chat, upload.unwrap_or_else(|| file(media)));
            if let Some(caption) = &media.caption {
                req = req.caption(caption);
            }
            if let Some(reply) = reply {
                req = req.reply_parameters(reply);
            }
            req.await
        }
        Content::Voice(media) => {
            let mut req = bot.send_voice(chat, upload.unwrap_or_else(|| file(media)));
            if let Some(caption) = &media.caption {
                req = req.caption(caption);
            }
            if let Some(reply) = reply {
                req = req.reply_parameters(reply);
            }
            req.await
        }
        Content::Sticker(media) => {
            let mut req = bot.send_sticker(chat, upload.unwrap_or_else(|| file(media)));
            if let Some(reply) = reply {
                req = req.reply_parameters(reply);
            }
            req.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_convert_within_range() {
        assert_eq!(to_tg_message_id(MessageId(42)).unwrap(), TgMessageId(42));
        assert!(to_tg_message_id(MessageId(i64::from(i32::MAX) + 1)).is_err());
    }
}
