// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for Chorus relay tests.
//!
//! Provides a scriptable chat client, in-memory storage, a recording
//! notifier, and fixture builders.

pub mod fixtures;
pub mod mock_client;
pub mod mock_notifier;
pub mod mock_storage;

pub use mock_client::{MockClient, MockConnection, SentRecord};
pub use mock_notifier::RecordingNotifier;
pub use mock_storage::MemoryStorage;
