// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Chorus relay engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed operations for accounts,
//! proxies, scripts, managed groups, and the Playback cursor, plus the single-instance lock on the
//! database file.

pub mod adapter;
pub mod database;
pub mod lock;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use lock::InstanceLock;
