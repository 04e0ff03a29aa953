// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator notifications.

use async_trait::async_trait;
use tracing::{info, warn};

use chorus_core::{AdapterType, ChorusError, HealthStatus, Notification, Notifier, PluginAdapter};

/// Notifier that only writes to the log. Used when no operator chat is
/// configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl PluginAdapter for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Notifier
    }

    async fn health_check(&self) -> Result<HealthStatus, ChorusError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ChorusError> {
        Ok(())
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ChorusError> {
        info!(target: "chorus::operator", "{notification}");
        Ok(())
    }
}

/// Delivers `notification`; delivery failures are logged and swallowed.
pub async fn notify_operator(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(&notification).await {
        warn!(
            notifier = notifier.name(),
            error = %e,
            notification = %notification,
            "operator notification failed"
        );
    }
}
