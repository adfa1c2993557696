// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end behavior of the direct queue against a fake session.

use std::sync::Arc;
use std::time::Duration;

use courier_bus::EventBus;
use courier_config::model::QueueConfig;
use courier_core::types::{DirectMessageJob, JobState, MessageContent, QueueKind};
use courier_core::Clock;
use courier_queue::{DirectMessageHandler, EnqueueOptions, JobEngine};
use courier_test_utils::{FakeSender, MemoryStore};

fn direct_job() -> DirectMessageJob {
    DirectMessageJob {
        to: "628111222333".into(),
        content: MessageContent::text("hello"),
        campaign_id: None,
    }
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

async fn start(sender: Arc<FakeSender>) -> (JobEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = QueueConfig {
        poll_interval_ms: 60_000,
        ..QueueConfig::default()
    };
    let engine = JobEngine::new(&config, store.clone(), Clock::new());
    engine
        .start(
            QueueKind::Direct,
            Arc::new(DirectMessageHandler::new(sender, EventBus::new())),
        )
        .await
        .unwrap();
    (engine, store)
}

#[tokio::test(start_paused = true)]
async fn open_session_completes_on_first_attempt() {
    let sender = Arc::new(FakeSender::connected());
    let (engine, _store) = start(sender.clone()).await;

    let job = engine
        .enqueue(QueueKind::Direct, &direct_job(), EnqueueOptions::default())
        .await
        .unwrap();
    settle().await;

    let done = engine.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.attempts_made, 1);

    let stats = engine.stats(QueueKind::Direct).await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.waiting, 0);
    assert_eq!(sender.sent().await.len(), 1);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn disconnected_session_backs_off_then_fails() {
    let sender = Arc::new(FakeSender::disconnected());
    let (engine, _store) = start(sender.clone()).await;
    let start = tokio::time::Instant::now();

    let job = engine
        .enqueue(QueueKind::Direct, &direct_job(), EnqueueOptions::default())
        .await
        .unwrap();
    settle().await;
    assert_eq!(sender.attempts().await, 1);
    assert_eq!(
        engine.get_job(job.id).await.unwrap().unwrap().state,
        JobState::Delayed
    );

    // Second attempt 2000 ms after the first.
    tokio::time::sleep_until(start + Duration::from_millis(1999)).await;
    settle().await;
    assert_eq!(sender.attempts().await, 1);
    tokio::time::sleep_until(start + Duration::from_millis(2001)).await;
    settle().await;
    assert_eq!(sender.attempts().await, 2);

    // Third attempt a further 4000 ms later.
    tokio::time::sleep_until(start + Duration::from_millis(5999)).await;
    settle().await;
    assert_eq!(sender.attempts().await, 2);
    tokio::time::sleep_until(start + Duration::from_millis(6001)).await;
    settle().await;
    assert_eq!(sender.attempts().await, 3);

    let failed = engine.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.attempts_made, 3);
    assert_eq!(failed.failure_reason.as_deref(), Some("session is not connected"));

    // No fourth attempt.
    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(sender.attempts().await, 3);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn higher_priority_is_sent_first() {
    let sender = Arc::new(FakeSender::connected());
    let store = Arc::new(MemoryStore::new());
    let engine = JobEngine::new(&QueueConfig::default(), store.clone(), Clock::new());

    let mut low = direct_job();
    low.to = "628111000001".into();
    let mut high = direct_job();
    high.to = "628111000002".into();
    engine
        .enqueue(QueueKind::Direct, &low, EnqueueOptions::default().priority(1))
        .await
        .unwrap();
    engine
        .enqueue(QueueKind::Direct, &high, EnqueueOptions::default().priority(15))
        .await
        .unwrap();

    engine
        .start(
            QueueKind::Direct,
            Arc::new(DirectMessageHandler::new(sender.clone(), EventBus::new())),
        )
        .await
        .unwrap();
    settle().await;

    let order: Vec<String> = sender.sent().await.into_iter().map(|(jid, _)| jid).collect();
    assert_eq!(
        order,
        vec![
            "628111000002@s.whatsapp.net".to_string(),
            "628111000001@s.whatsapp.net".to_string()
        ]
    );
    engine.shutdown().await;
}
