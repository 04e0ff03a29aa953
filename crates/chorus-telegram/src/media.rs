// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media hand-over between bots.
//!
//! Bot API file ids only work for the bot that received them. Every media
//! file a connection observes is recorded with its receiving bot, so another
//! account's connection can download it through that bot and upload the
//! bytes itself.

use std::collections::{HashMap, VecDeque};

use chorus_core::{AccountId, ChorusError, Media};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Target, map_request_error};

/// Files remembered before the oldest is forgotten.
const DEFAULT_CAPACITY: usize = 4096;

#[derive(Default)]
struct Owners {
    by_file: HashMap<String, (AccountId, Bot)>,
    order: VecDeque<String>,
}

/// Which bot received each recently observed file.
pub(crate) struct FileOwners {
    capacity: usize,
    owners: Mutex<Owners>,
}

impl Default for FileOwners {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl FileOwners {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            owners: Mutex::new(Owners::default()),
        }
    }

    pub(crate) async fn record(&self, file_ref: &str, account: &AccountId, bot: &Bot) {
        let mut owners = self.owners.lock().await;
        if owners
            .by_file
            .insert(file_ref.to_string(), (account.clone(), bot.clone()))
            .is_none()
        {
            owners.order.push_back(file_ref.to_string());
        }
        while owners.order.len() > self.capacity {
            if let Some(oldest) = owners.order.pop_front() {
                owners.by_file.remove(&oldest);
            }
        }
    }

    pub(crate) async fn owner(&self, file_ref: &str) -> Option<(AccountId, Bot)> {
        self.owners.lock().await.by_file.get(file_ref).cloned()
    }

    /// The upload `sender` must use for `media`: `None` when its own file id
    /// works (it received the file, or the file is unknown), otherwise the
    /// bytes fetched through the bot that received it.
    pub(crate) async fn upload_for(
        &self,
        sender: &AccountId,
        media: &Media,
    ) -> Result<Option<InputFile>, ChorusError> {
        let Some((owner, bot)) = self.owner(&media.file_ref).await else {
            return Ok(None);
        };
        if &owner == sender {
            return Ok(None);
        }

        let file = bot
            .get_file(FileId(media.file_ref.clone()))
            .await
            .map_err(|e| map_request_error(e, &owner, Target::Account))?;
        let mut bytes: Vec<u8> = Vec::new();
        bot.download_file(&file.path, &mut bytes)
            .await
            .map_err(|e| ChorusError::channel(format!("could not fetch media through {owner}: {e}")))?;
        debug!(from = %owner, to = %sender, bytes = bytes.len(), "media handed over between bots");
        Ok(Some(InputFile::memory(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> Bot {
        Bot::new("123:token")
    }

    #[tokio::test]
    async fn records_the_receiving_account() {
        let owners = FileOwners::default();
        owners.record("file-a", &AccountId::new("bot-1"), &bot()).await;
        owners.record("file-a", &AccountId::new("bot-2"), &bot()).await;

        let (owner, _) = owners.owner("file-a").await.unwrap();
        assert_eq!(owner, AccountId::new("bot-2"));
        assert!(owners.owner("file-b").await.is_none());
    }

    #[tokio::test]
    async fn oldest_files_are_forgotten() {
        let owners = FileOwners::with_capacity(2);
        for file in ["f1", "f2", "f3"] {
            owners.record(file, &AccountId::new("bot-1"), &bot()).await;
        }
        assert!(owners.owner("f1").await.is_none());
        assert!(owners.owner("f2").await.is_some());
        assert!(owners.owner("f3").await.is_some());
    }

    #[tokio::test]
    async fn own_and_unknown_files_are_sent_by_id() {
        let owners = FileOwners::default();
        let receiver = AccountId::new("bot-1");
        owners.record("file-a", &receiver, &bot()).await;

        let own = owners.upload_for(&receiver, &Media::new("file-a")).await.unwrap();
        assert!(own.is_none());
        let unknown = owners
            .upload_for(&AccountId::new("bot-2"), &Media::new("file-z"))
            .await
            .unwrap();
        assert!(unknown.is_none());
    }
}
