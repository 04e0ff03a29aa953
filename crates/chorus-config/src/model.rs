// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Chorus relay engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use chorus_core::RelayMode;
use serde::{Deserialize, Serialize};

/// Top-level Chorus configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChorusConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Telegram operator bot settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Relay engine settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Grammatical gender adaptation.
    #[serde(default)]
    pub gender: GenderConfig,

    /// Prometheus metrics endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs and notifications.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "chorus".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "chorus.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Telegram operator bot configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token of the operator bot. `None` logs notifications instead.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat that receives operator notifications.
    #[serde(default)]
    pub operator_chat_id: Option<i64>,
}

/// Prometheus metrics exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Serve relay counters in Prometheus text format.
    #[serde(default)]
    pub enabled: bool,

    /// Address the scrape endpoint listens on.
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

fn default_metrics_listen_addr() -> String {
    "127.0.0.1:9464".to_string()
}

/// Relay engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Mode started by `chorus serve`.
    #[serde(default)]
    pub mode: RelayMode,

    /// Whether relaying is enabled at startup.
    #[serde(default = "default_true")]
    pub autostart: bool,

    /// Script replayed in Playback mode. Defaults to the first stored script.
    #[serde(default)]
    pub script_id: Option<String>,

    /// Pause after each message sent to a destination.
    #[serde(default = "default_inter_message_delay_secs")]
    pub inter_message_delay_secs: f64,

    /// Pause between Playback ticks.
    #[serde(default = "default_inter_account_delay_secs")]
    pub inter_account_delay_secs: f64,

    /// Factor applied to the wait a rate-limit error asks for.
    #[serde(default = "default_flood_multiplier")]
    pub flood_multiplier: f64,

    /// How many times Playback retries a send after sleeping out a rate limit.
    #[serde(default = "default_max_flood_retries")]
    pub max_flood_retries: u32,

    /// Upper bound on any single rate-limit wait.
    #[serde(default = "default_max_flood_wait_secs")]
    pub max_flood_wait_secs: u64,

    /// Lower bound of the simulated typing delay.
    #[serde(default = "default_typing_min_ms")]
    pub typing_min_ms: u64,

    /// Upper bound of the simulated typing delay.
    #[serde(default = "default_typing_max_ms")]
    pub typing_max_ms: u64,

    /// Capacity of each inbound message queue in Mirror mode.
    #[serde(default = "default_inbound_queue_capacity")]
    pub inbound_queue_capacity: usize,

    /// Messages remembered per destination for reply matching.
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Source messages remembered by the reply correlation store.
    #[serde(default = "default_correlation_capacity")]
    pub correlation_capacity: usize,

    /// Minimum normalized similarity for a history reply match (0.0 to 1.0).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Consecutive failures on one destination before the operator is told.
    #[serde(default = "default_failure_notify_threshold")]
    pub failure_notify_threshold: u32,

    /// How often Mirror mode re-reads accounts from storage.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Attempts to connect an account when the platform rate-limits logins.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Fallback used when joining by invite is rate-limited.
    #[serde(default)]
    pub join_fallback: JoinFallbackConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::default(),
            autostart: true,
            script_id: None,
            inter_message_delay_secs: default_inter_message_delay_secs(),
            inter_account_delay_secs: default_inter_account_delay_secs(),
            flood_multiplier: default_flood_multiplier(),
            max_flood_retries: default_max_flood_retries(),
            max_flood_wait_secs: default_max_flood_wait_secs(),
            typing_min_ms: default_typing_min_ms(),
            typing_max_ms: default_typing_max_ms(),
            inbound_queue_capacity: default_inbound_queue_capacity(),
            history_size: default_history_size(),
            correlation_capacity: default_correlation_capacity(),
            similarity_threshold: default_similarity_threshold(),
            failure_notify_threshold: default_failure_notify_threshold(),
            refresh_interval_secs: default_refresh_interval_secs(),
            connect_attempts: default_connect_attempts(),
            join_fallback: JoinFallbackConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn inter_message_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_message_delay_secs.max(0.0))
    }

    pub fn inter_account_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_account_delay_secs.max(0.0))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

fn default_true() -> bool {
    true
}

fn default_inter_message_delay_secs() -> f64 {
    7.0
}

fn default_inter_account_delay_secs() -> f64 {
    12.0
}

fn default_flood_multiplier() -> f64 {
    1.5
}

fn default_max_flood_retries() -> u32 {
    2
}

fn default_max_flood_wait_secs() -> u64 {
    3600
}

fn default_typing_min_ms() -> u64 {
    800
}

fn default_typing_max_ms() -> u64 {
    2500
}

fn default_inbound_queue_capacity() -> usize {
    256
}

fn default_history_size() -> usize {
    200
}

fn default_correlation_capacity() -> usize {
    20_000
}

fn default_similarity_threshold() -> f64 {
    0.8
}

fn default_failure_notify_threshold() -> u32 {
    3
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_connect_attempts() -> u32 {
    3
}

/// Title-keyword heuristic used when an invite join is rate-limited.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JoinFallbackConfig {
    /// Disable to make a rate-limited join fail outright.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Case-insensitive title fragments that identify destination groups.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// How many recent memberships the heuristic looks at.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

impl Default for JoinFallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: Vec::new(),
            scan_limit: default_scan_limit(),
        }
    }
}

fn default_scan_limit() -> usize {
    50
}

/// Grammatical gender adaptation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Word pairs as `[masculine, feminine]`.
    #[serde(default)]
    pub pairs: Vec<[String; 2]>,
}

impl Default for GenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pairs: Vec::new(),
        }
    }
}
