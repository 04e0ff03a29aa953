// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-like pacing: typing indicators and delays between sends.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use chorus_config::model::RelayConfig;
use chorus_core::{ChatId, Connection};

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub typing_min: Duration,
    pub typing_max: Duration,
    pub inter_message: Duration,
    pub inter_account: Duration,
}

impl From<&RelayConfig> for Pacing {
    fn from(config: &RelayConfig) -> Self {
        Self {
            typing_min: Duration::from_millis(config.typing_min_ms),
            typing_max: Duration::from_millis(config.typing_max_ms.max(config.typing_min_ms)),
            inter_message: config.inter_message_delay(),
            inter_account: config.inter_account_delay(),
        }
    }
}

impl Pacing {
    /// A random typing duration within the configured range.
    pub fn typing_delay(&self) -> Duration {
        if self.typing_max <= self.typing_min {
            return self.typing_min;
        }
        rand::thread_rng().gen_range(self.typing_min..=self.typing_max)
    }

    /// Shows a typing indicator in `chat`, then waits as if typing.
    pub async fn simulate_typing(&self, conn: &dyn Connection, chat: ChatId) {
        let delay = self.typing_delay();
        if delay.is_zero() {
            return;
        }
        if let Err(e) = conn.send_typing(chat).await {
            debug!(account = %conn.identity(), chat = %chat, error = %e, "typing indicator failed");
        }
        tokio::time::sleep(delay).await;
    }
}

/// Sleeps for `duration` unless `cancel` fires first. Returns `false` on
/// cancellation.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
