// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table.

pub mod accounts;
pub mod cursor;
pub mod groups;
pub mod history;
pub mod proxies;
pub mod scripts;
