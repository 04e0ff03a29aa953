// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator notification channel.

use async_trait::async_trait;

use crate::error::ChorusError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Notification;

/// Delivers operator-facing notifications.
///
/// Callers treat delivery as fire-and-forget: errors are logged, never propagated.
#[async_trait]
pub trait Notifier: PluginAdapter {
    async fn notify(&self, notification: &Notification) -> Result<(), ChorusError>;
}
