// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod client;
pub mod notifier;
pub mod storage;

pub use adapter::PluginAdapter;
pub use client::{ChatClient, Connection};
pub use notifier::Notifier;
pub use storage::StorageAdapter;
