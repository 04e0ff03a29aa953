// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of Bot API failures onto [`ChorusError`].

use chorus_core::{AccountId, ChatId, ChorusError};
use teloxide::{ApiError, RequestError};

/// Where a failed request was aimed, for error context.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target<'a> {
    /// A request not tied to a chat (`getMe`).
    Account,
    Chat(ChatId),
    Reference(&'a str),
}

impl Target<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Account => "account".to_string(),
            Self::Chat(id) => id.to_string(),
            Self::Reference(raw) => raw.to_string(),
        }
    }
}

/// Converts a teloxide request error into the relay's error signal.
///
/// Flood waits become [`ChorusError::RateLimited`], a rejected token becomes
/// [`ChorusError::Auth`], and removal or missing rights in a chat become
/// [`ChorusError::PermissionDenied`]. Everything else is a transport failure.
pub(crate) fn map_request_error(
    err: RequestError,
    account: &AccountId,
    target: Target<'_>,
) -> ChorusError {
    match err {
        RequestError::RetryAfter(wait) => ChorusError::RateLimited {
            seconds: u64::from(wait.seconds()),
        },
        RequestError::Api(ApiError::InvalidToken) => ChorusError::Auth {
            account: account.to_string(),
            message: "bot token rejected".into(),
        },
        RequestError::Api(
            api @ (ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::BotBlocked
            | ApiError::NotEnoughRightsToPostMessages),
        ) => ChorusError::PermissionDenied {
            chat: target.describe(),
            message: api.to_string(),
        },
        RequestError::Api(ApiError::ChatNotFound) => ChorusError::ResolutionFailed {
            reference: target.describe(),
            message: "chat not found".into(),
        },
        RequestError::Api(ApiError::Unknown(message)) if is_rights_message(&message) => {
            ChorusError::PermissionDenied {
                chat: target.describe(),
                message,
            }
        }
        other => ChorusError::Channel {
            message: format!("Bot API request failed for {account}: {other}"),
            source: Some(Box::new(other)),
        },
    }
}

fn is_rights_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not enough rights")
        || lower.contains("have no rights")
        || lower.contains("chat_write_forbidden")
        || lower.contains("kicked")
}
