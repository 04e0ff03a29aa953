// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Chorus relay engine.
//!
//! This crate provides the trait definitions, error types, and common types
//! shared by the relay engine, the storage layer, and platform adapters.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ChorusError, FailureKind};
pub use types::{
    Account, AccountId, AdapterType, ChatId, ChatRef, Content, ContentKind, Gender, HealthStatus,
    HistoryEntry, InboundMessage, ManagedGroup, Media, Membership, MessageId, Notification, OutboundMessage,
    Proxy, ProxyScheme, RelayCursor, RelayMode, Script, SessionToken, ThreadId, UserId,
    normalize_chat_ref,
};

pub use traits::{ChatClient, Connection, Notifier, PluginAdapter, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;
        for t in [AdapterType::Client, AdapterType::Storage, AdapterType::Notifier] {
            assert_eq!(AdapterType::from_str(&t.to_string()).unwrap(), t);
        }
    }

    #[test]
    fn relay_mode_defaults_to_mirror() {
        assert_eq!(RelayMode::default(), RelayMode::Mirror);
        assert_eq!(RelayMode::Playback.to_string(), "playback");
    }

    #[test]
    fn notifications_render_for_operators() {
        let n = Notification::DestinationFailing {
            account: AccountId::new("+1"),
            chat: "@group".into(),
            failures: 3,
        };
        assert_eq!(
            n.to_string(),
            "Account +1 failed 3 times in a row posting to @group"
        );
    }
}
