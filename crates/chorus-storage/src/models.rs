// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types mirroring the SQLite schema, and their conversion into core types.

use std::str::FromStr;

use chorus_core::{
    Account, AccountId, ChorusError, Gender, Proxy, ProxyScheme, Script, SessionToken,
};

/// Raw `accounts` row.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: String,
    pub session: String,
    pub proxy_id: Option<i64>,
    pub gender: String,
    pub enabled: bool,
    pub source_chat: Option<String>,
    pub destinations: String,
    pub script_cursor: i64,
}

impl AccountRow {
    pub fn from_account(account: &Account) -> Result<Self, ChorusError> {
        Ok(Self {
            id: account.id.0.clone(),
            session: account.session.expose().to_string(),
            proxy_id: account.proxy_id,
            gender: account.gender.to_string(),
            enabled: account.enabled,
            source_chat: account.source_chat.clone(),
            destinations: serde_json::to_string(&account.destinations).map_err(corrupt)?,
            script_cursor: i64::try_from(account.script_cursor).unwrap_or(i64::MAX),
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = ChorusError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let gender = Gender::from_str(&row.gender).map_err(corrupt)?;
        let destinations: Vec<String> = serde_json::from_str(&row.destinations).map_err(corrupt)?;
        Ok(Account {
            id: AccountId(row.id),
            session: SessionToken::new(row.session),
            proxy_id: row.proxy_id,
            gender,
            enabled: row.enabled,
            source_chat: row.source_chat,
            destinations,
            script_cursor: usize::try_from(row.script_cursor).unwrap_or(0),
        })
    }
}

/// Raw `proxies` row.
#[derive(Debug, Clone)]
pub struct ProxyRow {
    pub id: i64,
    pub scheme: String,
    pub host: String,
    pub port: i64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl TryFrom<ProxyRow> for Proxy {
    type Error = ChorusError;

    fn try_from(row: ProxyRow) -> Result<Self, Self::Error> {
        Ok(Proxy {
            id: row.id,
            scheme: ProxyScheme::from_str(&row.scheme).map_err(corrupt)?,
            host: row.host,
            port: u16::try_from(row.port).map_err(corrupt)?,
            username: row.username,
            password: row.password,
        })
    }
}

/// Raw `scripts` row.
#[derive(Debug, Clone)]
pub struct ScriptRow {
    pub id: String,
    pub lines: String,
}

impl TryFrom<ScriptRow> for Script {
    type Error = ChorusError;

    fn try_from(row: ScriptRow) -> Result<Self, Self::Error> {
        Ok(Script {
            id: row.id,
            lines: serde_json::from_str(&row.lines).map_err(corrupt)?,
        })
    }
}

fn corrupt(e: impl std::error::Error + Send + Sync + 'static) -> ChorusError {
    ChorusError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_row_round_trip_keeps_destination_order() {
        let mut account = Account::new("+100", SessionToken::new("s"));
        account.gender = Gender::Female;
        account.destinations = vec!["@b".into(), "@a".into()];
        account.script_cursor = 4;

        let back = Account::try_from(AccountRow::from_account(&account).unwrap()).unwrap();
        assert_eq!(back.destinations, vec!["@b", "@a"]);
        assert_eq!(back.gender, Gender::Female);
        assert_eq!(back.script_cursor, 4);
        assert_eq!(back.session.expose(), "s");
    }

    #[test]
    fn corrupt_gender_is_a_storage_error() {
        let row = AccountRow {
            id: "x".into(),
            session: "s".into(),
            proxy_id: None,
            gender: "robot".into(),
            enabled: true,
            source_chat: None,
            destinations: "[]".into(),
            script_cursor: 0,
        };
        assert!(matches!(
            Account::try_from(row),
            Err(ChorusError::Storage { .. })
        ));
    }
}
