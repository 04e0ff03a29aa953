// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./chorus.toml` > `~/.config/chorus/chorus.toml` > `/etc/chorus/chorus.toml`
//! with environment variable overrides via `CHORUS_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ChorusConfig;

/// Sections addressable through `CHORUS_<SECTION>_<KEY>`. Longest first so
/// `relay_join_fallback_` wins over `relay_`.
const ENV_SECTIONS: [(&str, &str); 7] = [
    ("relay_join_fallback_", "relay.join_fallback."),
    ("service_", "service."),
    ("storage_", "storage."),
    ("telegram_", "telegram."),
    ("relay_", "relay."),
    ("gender_", "gender."),
    ("metrics_", "metrics."),
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/chorus/chorus.toml` (system-wide)
/// 3. `~/.config/chorus/chorus.toml` (user XDG config)
/// 4. `./chorus.toml` (local directory)
/// 5. `CHORUS_*` environment variables
pub fn load_config() -> Result<ChorusConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
pub fn load_config_from_str(toml_content: &str) -> Result<ChorusConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ChorusConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ChorusConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ChorusConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ChorusConfig::default()))
        .merge(Toml::file("/etc/chorus/chorus.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("chorus/chorus.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("chorus.toml"))
        .merge(env_provider())
}

/// Environment provider with an explicit section map.
///
/// `Env::split("_")` would turn `CHORUS_RELAY_FLOOD_MULTIPLIER` into
/// `relay.flood.multiplier`; only the section prefix may become a dot.
pub fn env_provider() -> Env {
    Env::prefixed("CHORUS_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a config path.
pub fn map_env_key(key: &str) -> String {
    for (prefix, section) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{section}{rest}");
        }
    }
    key.to_string()
}
