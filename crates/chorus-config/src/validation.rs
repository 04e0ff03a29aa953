// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as delay ranges, multipliers, and queue capacities.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::diagnostic::ConfigError;
use crate::model::ChorusConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &ChorusConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let relay = &config.relay;

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    for (key, value) in [
        ("relay.inter_message_delay_secs", relay.inter_message_delay_secs),
        ("relay.inter_account_delay_secs", relay.inter_account_delay_secs),
    ] {
        if !value.is_finite() || value < 0.0 {
            errors.push(ConfigError::validation(format!(
                "{key} must be a non-negative number of seconds, got {value}"
            )));
        }
    }

    if !relay.flood_multiplier.is_finite() || relay.flood_multiplier < 1.0 {
        errors.push(ConfigError::validation(format!(
            "relay.flood_multiplier must be at least 1.0, got {}",
            relay.flood_multiplier
        )));
    }

    if relay.typing_min_ms > relay.typing_max_ms {
        errors.push(ConfigError::validation(format!(
            "relay.typing_min_ms ({}) must not exceed relay.typing_max_ms ({})",
            relay.typing_min_ms, relay.typing_max_ms
        )));
    }

    if !(0.0..=1.0).contains(&relay.similarity_threshold) {
        errors.push(ConfigError::validation(format!(
            "relay.similarity_threshold must be between 0.0 and 1.0, got {}",
            relay.similarity_threshold
        )));
    }

    for (key, value) in [
        ("relay.inbound_queue_capacity", relay.inbound_queue_capacity),
        ("relay.history_size", relay.history_size),
        ("relay.correlation_capacity", relay.correlation_capacity),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be at least 1")));
        }
    }

    if relay.connect_attempts == 0 {
        errors.push(ConfigError::validation(
            "relay.connect_attempts must be at least 1",
        ));
    }

    if relay.failure_notify_threshold == 0 {
        errors.push(ConfigError::validation(
            "relay.failure_notify_threshold must be at least 1",
        ));
    }

    if relay.join_fallback.enabled && relay.join_fallback.scan_limit == 0 {
        errors.push(ConfigError::validation(
            "relay.join_fallback.scan_limit must be at least 1 when the fallback is enabled",
        ));
    }

    if config.telegram.bot_token.is_some() && config.telegram.operator_chat_id.is_none() {
        errors.push(ConfigError::validation(
            "telegram.operator_chat_id is required when telegram.bot_token is set",
        ));
    }

    if config.metrics.enabled && config.metrics.listen_addr.parse::<SocketAddr>().is_err() {
        errors.push(ConfigError::validation(format!(
            "metrics.listen_addr must be an ip:port address, got `{}`",
            config.metrics.listen_addr
        )));
    }

    let mut seen = HashSet::new();
    for (i, [masculine, feminine]) in config.gender.pairs.iter().enumerate() {
        if masculine.trim().is_empty() || feminine.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "gender.pairs[{i}] must not contain empty words"
            )));
        }
        if !seen.insert(masculine.to_lowercase()) {
            errors.push(ConfigError::validation(format!(
                "gender.pairs[{i}] repeats the word `{masculine}`"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ChorusConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_failure() {
        let mut config = ChorusConfig::default();
        config.relay.flood_multiplier = 0.5;
        config.relay.typing_min_ms = 5000;
        config.relay.typing_max_ms = 100;
        config.relay.history_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn operator_chat_required_with_bot_token() {
        let mut config = ChorusConfig::default();
        config.telegram.bot_token = Some("1:abc".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("operator_chat_id"));

        config.telegram.operator_chat_id = Some(42);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ChorusConfig::default();
        config.metrics.listen_addr = "localhost".into();
        assert!(validate_config(&config).is_ok());

        config.metrics.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("metrics.listen_addr"));

        config.metrics.listen_addr = "0.0.0.0:9464".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn negative_delay_rejected() {
        let mut config = ChorusConfig::default();
        config.relay.inter_account_delay_secs = -1.0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("inter_account_delay_secs"));
    }

    #[test]
    fn duplicate_gender_pair_rejected() {
        let mut config = ChorusConfig::default();
        config.gender.pairs = vec![
            ["ready".into(), "readya".into()],
            ["Ready".into(), "readyb".into()],
        ];
        assert_eq!(validate_config(&config).unwrap_err().len(), 1);
    }
}
