#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{Dispatcher, Tick};
use common::{FlakyStore, scripted_table};
use pipeline_core::{
    FailureKind, Job, JobFilter, JobStatus, JobStore, MemoryJobStore, PipelineError, StageResult,
};
use serde_json::json;

fn dispatcher<S: JobStore>(store: Arc<S>, calls: Arc<AtomicUsize>) -> Dispatcher<S> {
    Dispatcher::new("worker-test", store, Arc::new(scripted_table(calls)))
        .with_stage_timeout(Some(Duration::from_millis(100)))
}

#[tokio::test]
async fn empty_store_is_idle() {
    let store = Arc::new(MemoryJobStore::new());
    let tick = dispatcher(store, Arc::default()).tick().await;
    assert_eq!(tick, Tick::Idle);
    assert!(tick.should_back_off());
}

#[tokio::test]
async fn completed_job_carries_its_result() {
    let store = Arc::new(MemoryJobStore::new());
    let id = store
        .enqueue("L0_harvest", json!({ "query": "CRISPR" }), 0)
        .await
        .unwrap();

    let tick = dispatcher(store.clone(), Arc::default()).tick().await;
    assert_eq!(tick, Tick::Completed(id));

    let job = store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.worker_id.as_deref(), Some("worker-test"));
    assert!(job.error.is_none());
    assert_eq!(
        job.result,
        Some(StageResult::Harvest {
            papers_found: 3,
            query: "CRISPR".into(),
            candidates: vec![],
        })
    );
}

#[tokio::test]
async fn invalid_params_fail_without_running_the_handler() {
    let store = Arc::new(MemoryJobStore::new());
    let calls = Arc::new(AtomicUsize::new(0));
    // Inserted directly, bypassing enqueue-time validation.
    let job = store
        .insert(Job::new("L2_extract", json!({ "wrong": 1 })))
        .await
        .unwrap();

    let tick = dispatcher(store.clone(), calls.clone()).tick().await;
    assert_eq!(tick, Tick::Failed(job.id, FailureKind::InvalidParams));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let failed = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    let error = failed.error.unwrap();
    assert_eq!(error.kind, FailureKind::InvalidParams);
    assert!(error.message.contains("article_id"));
    assert!(failed.result.is_none());
}

#[tokio::test]
async fn unknown_job_type_does_not_block_the_queue() {
    let store = Arc::new(MemoryJobStore::new());
    let bogus = store.enqueue("L9_bogus", json!({}), 10).await.unwrap();
    let harvest = store
        .enqueue("L0_harvest", json!({ "query": "liver" }), 0)
        .await
        .unwrap();
    let dispatcher = dispatcher(store.clone(), Arc::default());

    assert_eq!(
        dispatcher.tick().await,
        Tick::Failed(bogus, FailureKind::UnknownJobType)
    );
    assert_eq!(dispatcher.tick().await, Tick::Completed(harvest));
    assert_eq!(dispatcher.tick().await, Tick::Idle);

    let failed = store.get(bogus).await.unwrap().unwrap();
    assert!(failed.error.unwrap().message.contains("L9_bogus"));
}

#[tokio::test]
async fn handler_errors_panics_and_timeouts_fail_the_job() {
    let store = Arc::new(MemoryJobStore::new());
    let errored = store
        .enqueue("L2_extract", json!({ "article_id": "a1" }), 3)
        .await
        .unwrap();
    let panicked = store
        .enqueue("L3_synthesize", json!({ "cluster_id": "corrupt" }), 2)
        .await
        .unwrap();
    let hung = store
        .enqueue("L4_expand", json!({ "seed_articles": ["a1"] }), 1)
        .await
        .unwrap();
    let dispatcher = dispatcher(store.clone(), Arc::default());

    for expected in [errored, panicked, hung] {
        assert_eq!(
            dispatcher.tick().await,
            Tick::Failed(expected, FailureKind::HandlerExecution)
        );
    }

    let message = |id| {
        let store = store.clone();
        async move { store.get(id).await.unwrap().unwrap().error.unwrap().message }
    };
    assert!(message(errored).await.contains("no stored full text for article a1"));
    assert!(message(panicked).await.contains("findings table corrupted"));
    assert!(message(hung).await.contains("timed out"));
}

#[tokio::test]
async fn store_outage_is_never_recorded_as_a_job_failure() {
    let store = Arc::new(FlakyStore::new());
    let id = store
        .enqueue("L1_cluster", json!({ "article_ids": ["a1", 2] }), 0)
        .await
        .unwrap();
    store.fail_next_claims(2);
    let dispatcher = dispatcher(store.clone(), Arc::default());

    for _ in 0..2 {
        let tick = dispatcher.tick().await;
        assert!(matches!(tick, Tick::StoreError(PipelineError::StoreUnavailable(_))));
        assert!(tick.should_back_off());
    }
    assert_eq!(
        store.get(id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );

    assert_eq!(dispatcher.tick().await, Tick::Completed(id));
    let failed = store
        .list(JobFilter::default().with_status(JobStatus::Failed))
        .await
        .unwrap();
    assert!(failed.is_empty());
}
