// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Chorus relay engine.

use std::time::Duration;

use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across all Chorus adapter traits and relay operations.
#[derive(Debug, Error)]
pub enum ChorusError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The account's session was revoked or its credential is invalid.
    #[error("authentication failed for account {account}: {message}")]
    Auth { account: String, message: String },

    /// The platform asked us to wait before the next request.
    #[error("rate limited for {seconds}s")]
    RateLimited { seconds: u64 },

    /// The account is not allowed to post into (or read from) the chat.
    #[error("permission denied in {chat}: {message}")]
    PermissionDenied { chat: String, message: String },

    /// A chat reference could not be turned into a chat id.
    #[error("could not resolve chat {reference}: {message}")]
    ResolutionFailed { reference: String, message: String },

    /// The message carries content the relay does not forward.
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),

    /// Any other transport failure from the chat platform client.
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Another process already runs the relay against the same database.
    #[error("another chorus instance holds {lock_path}")]
    AlreadyRunning { lock_path: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a relay failure, used by the failure controller
/// to pick a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    PermissionDenied,
    AuthRevoked,
    ResolutionFailed,
    Unsupported,
    Transient,
}

impl ChorusError {
    /// Shorthand for a transport failure without an underlying source.
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
            source: None,
        }
    }

    /// Classifies this error for the failure controller.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::PermissionDenied { .. } => FailureKind::PermissionDenied,
            Self::Auth { .. } => FailureKind::AuthRevoked,
            Self::ResolutionFailed { .. } => FailureKind::ResolutionFailed,
            Self::UnsupportedContent(_) => FailureKind::Unsupported,
            Self::Config(_)
            | Self::Storage { .. }
            | Self::Channel { .. }
            | Self::Timeout { .. }
            | Self::AlreadyRunning { .. }
            | Self::Internal(_) => FailureKind::Transient,
        }
    }

    /// Seconds the platform asked us to wait, if this is a rate-limit error.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { seconds } => Some(*seconds),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_every_variant() {
        assert_eq!(
            ChorusError::RateLimited { seconds: 3 }.kind(),
            FailureKind::RateLimited
        );
        assert_eq!(
            ChorusError::PermissionDenied {
                chat: "c".into(),
                message: "m".into()
            }
            .kind(),
            FailureKind::PermissionDenied
        );
        assert_eq!(
            ChorusError::Auth {
                account: "a".into(),
                message: "revoked".into()
            }
            .kind(),
            FailureKind::AuthRevoked
        );
        assert_eq!(
            ChorusError::ResolutionFailed {
                reference: "r".into(),
                message: "m".into()
            }
            .kind(),
            FailureKind::ResolutionFailed
        );
        assert_eq!(
            ChorusError::UnsupportedContent("poll".into()).kind(),
            FailureKind::Unsupported
        );
        assert_eq!(ChorusError::channel("boom").kind(), FailureKind::Transient);
        assert_eq!(
            ChorusError::Timeout {
                duration: Duration::from_secs(1)
            }
            .kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        assert_eq!(ChorusError::RateLimited { seconds: 30 }.retry_after(), Some(30));
        assert_eq!(ChorusError::Internal("x".into()).retry_after(), None);
    }

    #[test]
    fn error_messages_are_readable() {
        let err = ChorusError::RateLimited { seconds: 12 };
        assert_eq!(err.to_string(), "rate limited for 12s");
        let err = ChorusError::Auth {
            account: "+100".into(),
            message: "session revoked".into(),
        };
        assert!(err.to_string().contains("+100"));
    }
}
