// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chorus status` command implementation.
//!
//! Reads the store directly and prints the configured pool, proxies,
//! scripts, and the playback cursor. Works whether or not the relay runs.

use std::fmt::Write as _;

use chorus_config::model::ChorusConfig;
use chorus_core::{Account, ChorusError, Proxy, RelayCursor, Script, StorageAdapter};
use chorus_storage::SqliteStorage;

/// Run the `chorus status` command.
pub async fn run_status(config: &ChorusConfig) -> Result<(), ChorusError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;

    let report = collect(&storage).await;
    storage.close().await?;

    print!("{}", report?);
    Ok(())
}

async fn collect(storage: &dyn StorageAdapter) -> Result<String, ChorusError> {
    let accounts = storage.load_accounts().await?;
    let proxies = storage.load_proxies().await?;
    let scripts = storage.load_scripts().await?;
    let cursor = storage.load_cursor().await?;
    Ok(render(&accounts, &proxies, &scripts, cursor))
}

fn render(accounts: &[Account], proxies: &[Proxy], scripts: &[Script], cursor: RelayCursor) -> String {
    let mut out = String::new();
    let enabled = accounts.iter().filter(|a| a.enabled).count();

    let _ = writeln!(out, "Accounts ({enabled}/{} enabled)", accounts.len());
    for account in accounts {
        let state = if account.enabled { "on " } else { "off" };
        let source = account.source_chat.as_deref().unwrap_or("-");
        let proxy = account
            .proxy_id
            .map(|id| format!("proxy #{id}"))
            .unwrap_or_else(|| "direct".to_string());
        let _ = writeln!(
            out,
            "  [{state}] {} ({}, {proxy}) source={source} destinations={}",
            account.id,
            account.gender,
            account.destinations.len()
        );
    }

    let _ = writeln!(out, "Proxies ({})", proxies.len());
    for proxy in proxies {
        let _ = writeln!(
            out,
            "  #{} {}://{}:{}",
            proxy.id, proxy.scheme, proxy.host, proxy.port
        );
    }

    let _ = writeln!(out, "Scripts ({})", scripts.len());
    for script in scripts {
        let _ = writeln!(out, "  {} ({} lines)", script.id, script.lines.len());
    }

    let _ = writeln!(
        out,
        "Playback cursor: line {}, account {}",
        cursor.line_index, cursor.account_index
    );
    out
}
