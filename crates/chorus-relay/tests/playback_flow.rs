// SPDX-FileCopyrightText: 2026 Chorus Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Playback mode tests: cursor arithmetic, persistence, and failure handling.

use std::sync::Arc;
use std::time::Duration;

use chorus_config::model::{GenderConfig, RelayConfig};
use chorus_core::{
    Account, ChorusError, Content, Gender, Notification, RelayCursor, StorageAdapter,
};
use chorus_relay::{PlaybackRunner, RelayContext};
use chorus_test_utils::{MemoryStorage, MockClient, RecordingNotifier, fixtures};
use tokio_util::sync::CancellationToken;

struct Setup {
    storage: Arc<MemoryStorage>,
    client: Arc<MockClient>,
    notifier: Arc<RecordingNotifier>,
}

impl Setup {
    async fn new(accounts: &[Account], lines: &[&str]) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        for account in accounts {
            storage.save_account(account).await.unwrap();
        }
        let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        storage.save_script("main", &lines).await.unwrap();
        Self {
            storage,
            client: Arc::new(MockClient::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    async fn runner(&self, config: RelayConfig, gender: GenderConfig) -> PlaybackRunner {
        let ctx = RelayContext::new(
            config,
            &gender,
            self.client.clone(),
            self.storage.clone(),
            self.notifier.clone(),
        )
        .unwrap();
        ctx.set_enabled(true);
        PlaybackRunner::load(Arc::new(ctx)).await
    }
}

fn quiet() -> RelayConfig {
    RelayConfig {
        inter_message_delay_secs: 0.0,
        inter_account_delay_secs: 0.0,
        typing_min_ms: 0,
        typing_max_ms: 0,
        ..RelayConfig::default()
    }
}

#[tokio::test]
async fn two_lines_two_accounts_walk_the_cursor() {
    let setup = Setup::new(
        &[fixtures::account("+1", &["@a"]), fixtures::account("+2", &["@b"])],
        &["hi", "bye"],
    )
    .await;
    let a = setup.client.connection("+1", 11).await;
    let b = setup.client.connection("+2", 12).await;
    a.with_chat("@a", 100).await;
    b.with_chat("@b", 200).await;

    let mut runner = setup.runner(quiet(), GenderConfig::default()).await;
    let cancel = CancellationToken::new();

    runner.tick(&cancel).await;
    runner.tick(&cancel).await;
    assert_eq!(
        runner.cursor(),
        RelayCursor {
            line_index: 1,
            account_index: 0
        }
    );

    runner.tick(&cancel).await;
    runner.tick(&cancel).await;
    assert_eq!(runner.cursor(), RelayCursor::default());
    assert_eq!(setup.storage.cursor().await, Some(RelayCursor::default()));

    let texts = |records: Vec<chorus_test_utils::SentRecord>| {
        records
            .into_iter()
            .map(|r| r.message.content)
            .collect::<Vec<_>>()
    };
    let expected = vec![Content::Text("hi".into()), Content::Text("bye".into())];
    assert_eq!(texts(a.sent_to(100).await), expected);
    assert_eq!(texts(b.sent_to(200).await), expected);

    assert_eq!(
        setup
            .notifier
            .count_matching(|n| matches!(n, Notification::ScriptRestarted { .. }))
            .await,
        1
    );
    assert_eq!(setup.storage.account("+2").await.unwrap().script_cursor, 1);
}

#[tokio::test]
async fn cursor_survives_restart() {
    let setup = Setup::new(
        &[fixtures::account("+1", &["@a"]), fixtures::account("+2", &["@b"])],
        &["one", "two", "three"],
    )
    .await;
    let cancel = CancellationToken::new();

    let mut first = setup.runner(quiet(), GenderConfig::default()).await;
    for _ in 0..3 {
        first.tick(&cancel).await;
    }
    let saved = first.cursor();
    assert_eq!(
        saved,
        RelayCursor {
            line_index: 1,
            account_index: 1
        }
    );

    let second = setup.runner(quiet(), GenderConfig::default()).await;
    assert_eq!(second.cursor(), saved);
}

#[tokio::test(start_paused = true)]
async fn operator_edits_during_a_tick_are_kept() {
    let setup = Setup::new(&[fixtures::account("+1", &["@a"])], &["hi", "bye"]).await;
    setup
        .storage
        .save_cursor(RelayCursor {
            line_index: 1,
            account_index: 0,
        })
        .await
        .unwrap();
    let conn = setup.client.connection("+1", 11).await;
    conn.with_chat("@a", 100).await;
    conn.with_chat("@b", 300).await;

    let config = RelayConfig {
        inter_message_delay_secs: 5.0,
        ..quiet()
    };
    let mut runner = setup.runner(config, GenderConfig::default()).await;
    let tick = tokio::spawn(async move {
        runner.tick(&CancellationToken::new()).await;
        runner
    });
    while conn.sent_to(100).await.is_empty() {
        tokio::task::yield_now().await;
    }

    // The line is out; the tick now waits out the inter-message delay.
    let mut edited = fixtures::account("+1", &["@a", "@b"]);
    edited.gender = Gender::Female;
    edited.source_chat = Some("@news".into());
    setup.storage.save_account(&edited).await.unwrap();
    tick.await.unwrap();

    let stored = setup.storage.account("+1").await.unwrap();
    assert_eq!(stored.destinations, vec!["@a", "@b"]);
    assert_eq!(stored.gender, Gender::Female);
    assert_eq!(stored.source_chat.as_deref(), Some("@news"));
    assert_eq!(stored.script_cursor, 1);
}

#[tokio::test]
async fn failing_destination_does_not_abort_the_others() {
    let setup = Setup::new(&[fixtures::account("+1", &["@gone", "@a"])], &["hi"]).await;
    let conn = setup.client.connection("+1", 11).await;
    conn.with_chat("@a", 100).await;

    let mut runner = setup.runner(quiet(), GenderConfig::default()).await;
    runner.tick(&CancellationToken::new()).await;

    assert_eq!(conn.sent_to(100).await.len(), 1);
    assert_eq!(conn.join_calls(), 1);
}

#[tokio::test]
async fn storage_outage_is_not_fatal() {
    let setup = Setup::new(&[fixtures::account("+1", &["@a"])], &["x", "y"]).await;
    let conn = setup.client.connection("+1", 11).await;
    conn.with_chat("@a", 100).await;
    let mut runner = setup.runner(quiet(), GenderConfig::default()).await;
    let cancel = CancellationToken::new();

    runner.tick(&cancel).await;
    assert_eq!(runner.cursor().line_index, 1);

    setup.storage.set_failing(true);
    runner.tick(&cancel).await;
    assert_eq!(runner.cursor().line_index, 1);

    setup.storage.set_failing(false);
    runner.tick(&cancel).await;
    assert_eq!(runner.cursor(), RelayCursor::default());
    assert_eq!(conn.sent_to(100).await.len(), 2);
}

#[tokio::test]
async fn revoked_account_leaves_the_rotation() {
    let setup = Setup::new(
        &[fixtures::account("+1", &["@a"]), fixtures::account("+2", &["@b"])],
        &["hi"],
    )
    .await;
    let a = setup.client.connection("+1", 11).await;
    let b = setup.client.connection("+2", 12).await;
    a.with_chat("@a", 100).await;
    b.with_chat("@b", 200).await;
    a.fail_next_send(
        100,
        ChorusError::Auth {
            account: "+1".into(),
            message: "revoked".into(),
        },
    )
    .await;

    let mut runner = setup.runner(quiet(), GenderConfig::default()).await;
    let cancel = CancellationToken::new();
    for _ in 0..3 {
        runner.tick(&cancel).await;
    }

    assert!(!setup.storage.account("+1").await.unwrap().enabled);
    assert!(a.sent_to(100).await.is_empty());
    assert_eq!(b.sent_to(200).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn typing_and_delays_pace_the_sends() {
    let setup = Setup::new(&[fixtures::account("+1", &["@a", "@b"])], &["hi"]).await;
    let conn = setup.client.connection("+1", 11).await;
    conn.with_chat("@a", 100).await;
    conn.with_chat("@b", 200).await;

    let config = RelayConfig {
        inter_message_delay_secs: 7.0,
        typing_min_ms: 800,
        typing_max_ms: 800,
        ..quiet()
    };
    let mut runner = setup.runner(config, GenderConfig::default()).await;
    runner.tick(&CancellationToken::new()).await;

    let first = conn.sent_to(100).await[0].at;
    let second = conn.sent_to(200).await[0].at;
    assert!(second - first >= Duration::from_millis(7_800));
    assert_eq!(conn.typing_events().await.len(), 2);
}

#[tokio::test]
async fn lines_are_adapted_to_account_gender() {
    let mut female = fixtures::account("+1", &["@a"]);
    female.gender = Gender::Female;
    let setup = Setup::new(&[female], &["I am ready"]).await;
    let conn = setup.client.connection("+1", 11).await;
    conn.with_chat("@a", 100).await;

    let gender = GenderConfig {
        enabled: true,
        pairs: vec![["ready".into(), "readyf".into()]],
    };
    let mut runner = setup.runner(quiet(), gender).await;
    runner.tick(&CancellationToken::new()).await;

    assert_eq!(
        conn.sent_to(100).await[0].message.content,
        Content::Text("I am readyf".into())
    );
}

#[tokio::test(start_paused = true)]
async fn run_stops_on_cancel() {
    let setup = Setup::new(&[fixtures::account("+1", &["@a"])], &["hi"]).await;
    setup.client.connection("+1", 11).await.with_chat("@a", 100).await;
    let config = RelayConfig {
        inter_account_delay_secs: 12.0,
        ..quiet()
    };
    let runner = setup.runner(config, GenderConfig::default()).await;
    let cancel = CancellationToken::new();
    let task = tokio::spawn(runner.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(30)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("runner should stop promptly")
        .unwrap();
    assert!(setup.storage.cursor_saves() >= 2);
}
