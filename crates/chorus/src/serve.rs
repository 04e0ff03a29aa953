// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chorus serve` command implementation.
//!
//! Takes the instance lock, opens storage, wires the platform client and
//! operator notifier into the relay engine, starts the configured mode, and
//! drains on SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use chorus_config::model::{ChorusConfig, MetricsConfig, TelegramConfig};
use chorus_core::{ChatId, ChorusError, Notifier, StorageAdapter};
use chorus_relay::shutdown;
use chorus_relay::{Dispatcher, LogNotifier, RelayContext};
use chorus_storage::{InstanceLock, SqliteStorage};
use tracing::{debug, info, warn};

#[cfg(feature = "telegram")]
use chorus_telegram::{TelegramClient, TelegramNotifier};

#[cfg(not(feature = "telegram"))]
compile_error!("chorus requires the 'telegram' feature for a chat platform client");

/// Time granted to in-flight sends after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the `chorus serve` command.
pub async fn run_serve(config: ChorusConfig) -> Result<(), ChorusError> {
    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "starting chorus serve");

    let lock = InstanceLock::acquire(&config.storage.database_path)?;

    if install_metrics(&config.metrics) {
        chorus_relay::telemetry::describe_metrics();
    }

    let storage = {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        Arc::new(storage)
    };
    info!(path = %config.storage.database_path, "storage initialized");

    let notifier = build_notifier(&config.telegram);
    info!(notifier = notifier.name(), "operator notifier ready");

    let ctx = RelayContext::new(
        config.relay.clone(),
        &config.gender,
        Arc::new(TelegramClient::new()),
        storage.clone(),
        notifier,
    )?;
    let dispatcher = Dispatcher::new(Arc::new(ctx));

    let cancel = shutdown::install_signal_handler();

    if config.relay.autostart {
        dispatcher.start(config.relay.mode).await?;
    } else {
        info!("relay autostart disabled, waiting for shutdown");
    }

    cancel.cancelled().await;

    shutdown::drain(&dispatcher, DRAIN_TIMEOUT).await;
    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage did not close cleanly");
    }
    drop(lock);
    info!("chorus stopped");
    Ok(())
}

/// Installs the Prometheus exporter when enabled. A failure is logged and
/// the relay runs without metrics.
#[cfg(feature = "prometheus")]
fn install_metrics(config: &MetricsConfig) -> bool {
    use metrics_exporter_prometheus::PrometheusBuilder;

    if !config.enabled {
        debug!("prometheus exporter disabled");
        return false;
    }
    let addr: std::net::SocketAddr = match config.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(addr = %config.listen_addr, error = %e, "invalid metrics listen address");
            return false;
        }
    };
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            info!(%addr, "prometheus exporter listening");
            true
        }
        Err(e) => {
            warn!(error = %e, "failed to install prometheus exporter");
            false
        }
    }
}

#[cfg(not(feature = "prometheus"))]
fn install_metrics(config: &MetricsConfig) -> bool {
    if config.enabled {
        warn!("metrics.enabled is set but chorus was built without the prometheus feature");
    }
    false
}

/// Telegram operator notifier when both the token and the chat are set,
/// otherwise notifications only go to the log.
fn build_notifier(config: &TelegramConfig) -> Arc<dyn Notifier> {
    match (&config.bot_token, config.operator_chat_id) {
        (Some(token), Some(chat)) => match TelegramNotifier::new(token, ChatId(chat)) {
            Ok(notifier) => return Arc::new(notifier),
            Err(e) => warn!(error = %e, "operator bot unusable, logging notifications instead"),
        },
        (Some(_), None) => {
            warn!("telegram.bot_token set without telegram.operator_chat_id, logging notifications instead");
        }
        _ => {}
    }
    Arc::new(LogNotifier)
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chorus={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifier_falls_back_to_log() {
        let none = TelegramConfig {
            bot_token: None,
            operator_chat_id: Some(5),
        };
        assert_eq!(build_notifier(&none).name(), "log");

        let no_chat = TelegramConfig {
            bot_token: Some("123:token".into()),
            operator_chat_id: None,
        };
        assert_eq!(build_notifier(&no_chat).name(), "log");

        let empty = TelegramConfig {
            bot_token: Some(String::new()),
            operator_chat_id: Some(5),
        };
        assert_eq!(build_notifier(&empty).name(), "log");
    }

    #[cfg(feature = "prometheus")]
    #[tokio::test]
    async fn exporter_installs_once_when_enabled() {
        assert!(!install_metrics(&MetricsConfig::default()));

        let enabled = MetricsConfig {
            enabled: true,
            listen_addr: "127.0.0.1:0".into(),
        };
        assert!(install_metrics(&enabled));
        assert!(!install_metrics(&enabled));
    }

    #[test]
    fn complete_telegram_section_uses_the_bot() {
        let config = TelegramConfig {
            bot_token: Some("123:token".into()),
            operator_chat_id: Some(5),
        };
        assert_eq!(build_notifier(&config).name(), "telegram-notifier");
    }
}
