// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator notifications delivered through a Telegram bot.

use async_trait::async_trait;
use chorus_core::{
    AccountId, AdapterType, ChatId, ChorusError, HealthStatus, Notification, Notifier,
    PluginAdapter,
};
use teloxide::prelude::*;
use teloxide::types::ChatId as TgChatId;
use tracing::debug;

use crate::error::{Target, map_request_error};

/// Sends every notification as a plain message to the operator chat.
pub struct TelegramNotifier {
    bot: Bot,
    operator_chat: ChatId,
    identity: AccountId,
}

impl TelegramNotifier {
    /// Creates a notifier posting to `operator_chat` with the given bot token.
    pub fn new(bot_token: &str, operator_chat: ChatId) -> Result<Self, ChorusError> {
        if bot_token.is_empty() {
            return Err(ChorusError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }
        Ok(Self {
            bot: Bot::new(bot_token),
            operator_chat,
            identity: AccountId::new("operator-bot"),
        })
    }

    pub fn operator_chat(&self) -> ChatId {
        self.operator_chat
    }
}

#[async_trait]
impl PluginAdapter for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram-notifier"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, ChorusError> {
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "operator bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ChorusError> {
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ChorusError> {
        self.bot
            .send_message(TgChatId(self.operator_chat.0), notification.to_string())
            .await
            .map_err(|e| map_request_error(e, &self.identity, Target::Chat(self.operator_chat)))?;
        debug!(chat = %self.operator_chat, "operator notified");
        Ok(())
    }
}
