// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifier that records every notification for assertions.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use chorus_core::{
    AdapterType, ChorusError, HealthStatus, Notification, Notifier, PluginAdapter,
};

#[derive(Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery fail (the notification is still recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.received.lock().await.clone()
    }

    pub async fn count_matching(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        self.received
            .lock()
            .await
            .iter()
            .filter(|n| predicate(n))
            .count()
    }
}

#[async_trait]
impl PluginAdapter for RecordingNotifier {
    fn name(&self) -> &str {
        "recording-notifier"
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
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), ChorusError> {
        self.received.lock().await.push(notification.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChorusError::channel("operator chat unreachable"));
        }
        Ok(())
    }
}
