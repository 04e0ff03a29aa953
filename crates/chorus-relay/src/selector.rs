// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Picks which account posts a mirrored message into a destination.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;
use tokio::sync::Mutex;

use chorus_core::{AccountId, ContentKind};

/// Chooses an account among `candidates`.
///
/// A sender that is itself a candidate always posts its own message. With a
/// single candidate it is chosen. Otherwise the account used last is
/// excluded and one of the rest is drawn at random.
pub fn select<R: Rng + ?Sized>(
    candidates: &[AccountId],
    sender: Option<&AccountId>,
    last_used: Option<&AccountId>,
    rng: &mut R,
) -> Option<AccountId> {
    if let Some(sender) = sender
        && candidates.contains(sender)
    {
        return Some(sender.clone());
    }
    match candidates {
        [] => None,
        [only] => Some(only.clone()),
        _ => {
            let pool: Vec<&AccountId> = candidates
                .iter()
                .filter(|c| Some(*c) != last_used)
                .collect();
            pool.choose(rng).map(|c| (*c).clone())
        }
    }
}

#[derive(Default)]
struct RotationMemory {
    last_by_destination: HashMap<String, AccountId>,
    last_by_kind: HashMap<(String, ContentKind), AccountId>,
}

/// Remembers the last account used per destination, so consecutive
/// messages rotate between accounts.
#[derive(Default)]
pub struct AccountSelector {
    memory: Mutex<RotationMemory>,
}

impl AccountSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks and records the account for one message into `destination`.
    ///
    /// With more than two candidates the account that last sent the same
    /// kind of content is avoided too, unless that leaves nobody.
    pub async fn pick(
        &self,
        destination: &str,
        kind: ContentKind,
        candidates: &[AccountId],
        sender: Option<&AccountId>,
    ) -> Option<AccountId> {
        let mut memory = self.memory.lock().await;
        let last = memory.last_by_destination.get(destination).cloned();
        let kind_key = (destination.to_string(), kind);

        let narrowed: Vec<AccountId> = match memory.last_by_kind.get(&kind_key) {
            Some(kind_last) if candidates.len() > 2 && last.as_ref() != Some(kind_last) => {
                candidates
                    .iter()
                    .filter(|c| *c != kind_last)
                    .cloned()
                    .collect()
            }
            _ => candidates.to_vec(),
        };

        let chosen = select(&narrowed, sender, last.as_ref(), &mut rand::thread_rng())
            .or_else(|| select(candidates, sender, last.as_ref(), &mut rand::thread_rng()))?;
        memory
            .last_by_destination
            .insert(destination.to_string(), chosen.clone());
        memory.last_by_kind.insert(kind_key, chosen.clone());
        Some(chosen)
    }

    /// Records an account chosen outside [`pick`](Self::pick).
    pub async fn record(&self, destination: &str, kind: ContentKind, account: &AccountId) {
        let mut memory = self.memory.lock().await;
        memory
            .last_by_destination
            .insert(destination.to_string(), account.clone());
        memory
            .last_by_kind
            .insert((destination.to_string(), kind), account.clone());
    }

    pub async fn last_used(&self, destination: &str) -> Option<AccountId> {
        self.memory
            .lock()
            .await
            .last_by_destination
            .get(destination)
            .cloned()
    }
}
