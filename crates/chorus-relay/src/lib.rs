// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-account relay engine.
//!
//! Keeps a pool of account connections, resolves and joins chats, and runs
//! one of two relay modes:
//!
//! - **Playback**: accounts take turns posting the lines of a stored script.
//! - **Mirror**: messages seen in source chats are re-posted into
//!   destination chats, rotating accounts and preserving reply chains.
//!
//! Platform throttling and permission failures are absorbed by the
//! [`FailureController`]; nothing a single destination does stops the relay.

pub mod context;
pub mod controller;
pub mod correlation;
pub mod dispatcher;
pub mod gender;
pub mod history;
pub mod mirror;
pub mod notify;
pub mod pacing;
pub mod playback;
pub mod pool;
pub mod resolver;
pub mod selector;
pub mod shutdown;
pub mod telemetry;

pub use context::{Eligible, RelayContext, Snapshot};
pub use controller::{
    FailureController, FloodWaitPolicy, Reaction, RetryContext, RetryPolicy, with_retry,
};
pub use correlation::{CorrelationEntry, CorrelationStore, SourceKey};
pub use dispatcher::{Dispatcher, DispatcherState};
pub use gender::GenderAdapter;
pub use history::{DestinationHistory, HistoryEntry};
pub use mirror::MirrorRunner;
pub use notify::LogNotifier;
pub use playback::PlaybackRunner;
pub use pool::ConnectionPool;
pub use resolver::ChatResolver;
pub use selector::AccountSelector;
