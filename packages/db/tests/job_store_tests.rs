#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;

use pipeline_core::{
    ArticleId, ClusterParams, CredentialStore, FailureKind, HarvestParams, Job, JobFailure,
    JobFilter, JobStatus, JobStore, JobType, PipelineError, StageParams, StageResult,
};
use serde_json::json;

use db::repositories::{JobRepository, ResultRepository};
use db::{CredentialVault, SurrealCredentialStore, SurrealJobStore};

fn harvest(query: &str) -> serde_json::Value {
    json!({ "query": query })
}

#[tokio::test]
async fn test_job_store() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    claim_order().await?;
    common::reset_db().await?;
    claim_order_follows_creation_time().await?;
    common::reset_db().await?;
    concurrent_claims_are_exclusive().await?;
    common::reset_db().await?;
    terminal_transitions().await?;
    common::reset_db().await?;
    failure_is_recorded().await?;
    common::reset_db().await?;
    invalid_params_rejected_at_enqueue().await?;
    common::reset_db().await?;
    typed_enqueue_validates_before_insert().await?;
    common::reset_db().await?;
    orphans_fail_without_requeue().await?;
    common::reset_db().await?;
    credentials_are_encrypted_at_rest().await?;

    Ok(())
}

async fn claim_order() -> Result<(), Box<dyn Error>> {
    let store = SurrealJobStore::new();

    let p1 = store.enqueue("L0_harvest", harvest("one"), 1).await?;
    let p5 = store.enqueue("L0_harvest", harvest("five"), 5).await?;
    let p3 = store.enqueue("L0_harvest", harvest("three"), 3).await?;
    let p3_later = store.enqueue("L0_harvest", harvest("three again"), 3).await?;

    let mut claimed = Vec::new();
    while let Some(job) = store.claim_next("worker-1").await? {
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert_eq!(job.worker_id.as_deref(), Some("worker-1"));
        claimed.push(job.id);
    }
    assert_eq!(claimed, vec![p5, p3, p3_later, p1]);

    Ok(())
}

// Jobs written by separate producers can carry ids that disagree with
// their creation time; the claim follows `created_at`.
async fn claim_order_follows_creation_time() -> Result<(), Box<dyn Error>> {
    let store = SurrealJobStore::new();

    let later = Job::new("L0_harvest", harvest("later"));
    let mut earlier = Job::new("L0_harvest", harvest("earlier"));
    earlier.created_at = later.created_at - chrono::Duration::seconds(1);
    assert!(earlier.id > later.id);

    store.insert(later.clone()).await?;
    store.insert(earlier.clone()).await?;

    let listed: Vec<_> = store
        .list(JobFilter::default())
        .await?
        .into_iter()
        .map(|job| job.id)
        .collect();
    assert_eq!(listed, vec![earlier.id, later.id]);

    let first = store.claim_next("worker-1").await?.expect("pending job");
    assert_eq!(first.id, earlier.id);
    let second = store.claim_next("worker-1").await?.expect("pending job");
    assert_eq!(second.id, later.id);

    Ok(())
}

async fn concurrent_claims_are_exclusive() -> Result<(), Box<dyn Error>> {
    let store = SurrealJobStore::new();
    let only = store.enqueue("L0_harvest", harvest("solo"), 0).await?;

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim_next(&format!("worker-{n}")).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(job) = handle.await?? {
            winners.push(job.id);
        }
    }
    assert_eq!(winners, vec![only]);

    Ok(())
}

async fn terminal_transitions() -> Result<(), Box<dyn Error>> {
    let store = SurrealJobStore::new();

    let id = store.enqueue("L0_harvest", harvest("CRISPR"), 0).await?;
    let pending_err = store
        .complete(
            id,
            StageResult::Harvest {
                papers_found: 0,
                query: "CRISPR".into(),
                candidates: vec![],
            },
        )
        .await
        .unwrap_err();
    assert_eq!(pending_err, PipelineError::DoubleTransition(id));

    store.claim_next("worker-1").await?;
    let result = StageResult::Harvest {
        papers_found: 10,
        query: "CRISPR".into(),
        candidates: vec![],
    };
    let done = store.complete(id, result.clone()).await?;
    assert_eq!(done.status, JobStatus::Complete);
    assert_eq!(done.result.as_ref(), Some(&result));
    assert!(done.completed_at.is_some());

    let again = store.complete(id, result.clone()).await.unwrap_err();
    assert_eq!(again, PipelineError::DoubleTransition(id));
    let late_fail = store
        .fail(id, JobFailure::new(FailureKind::HandlerExecution, "late"))
        .await
        .unwrap_err();
    assert_eq!(late_fail, PipelineError::DoubleTransition(id));

    let stored = ResultRepository::get(id).await?.expect("result row");
    assert_eq!(stored.job_type, JobType::Harvest);
    assert_eq!(stored.result, result);

    let loaded = store.get(id).await?.expect("job row");
    assert_eq!(loaded.status, JobStatus::Complete);
    assert_eq!(loaded.params, harvest("CRISPR"));

    Ok(())
}

async fn failure_is_recorded() -> Result<(), Box<dyn Error>> {
    let store = SurrealJobStore::new();

    let id = store.enqueue("L9_bogus", json!({}), 0).await?;
    store.claim_next("worker-1").await?;
    let failed = store
        .fail(id, JobFailure::new(FailureKind::UnknownJobType, "unknown job type: L9_bogus"))
        .await?;

    assert_eq!(failed.status, JobStatus::Failed);
    let error = failed.error.expect("error recorded");
    assert_eq!(error.kind, FailureKind::UnknownJobType);

    let failed_jobs = store
        .list(JobFilter::default().with_status(JobStatus::Failed))
        .await?;
    assert_eq!(failed_jobs.len(), 1);

    let counts = JobRepository::count_by_status().await?;
    assert_eq!(counts.get("failed"), Some(&1));

    Ok(())
}

async fn invalid_params_rejected_at_enqueue() -> Result<(), Box<dyn Error>> {
    let store = SurrealJobStore::new();

    let err = store
        .enqueue("L1_cluster", json!({ "article_ids": [] }), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidParams { .. }));
    assert!(store.list(JobFilter::default()).await?.is_empty());

    Ok(())
}

async fn typed_enqueue_validates_before_insert() -> Result<(), Box<dyn Error>> {
    let store = SurrealJobStore::new();

    let err = store
        .enqueue_stage(StageParams::Cluster(ClusterParams::default()), 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidParams {
            job_type: JobType::Cluster,
            ..
        }
    ));
    assert!(store.list(JobFilter::default()).await?.is_empty());

    let params = StageParams::Cluster(ClusterParams {
        article_ids: vec![ArticleId::new("a1"), ArticleId::new("a2")],
        query_terms: vec![],
    });
    let id = store.enqueue_stage(params.clone(), 2).await?;
    let job = store.claim_next("worker-1").await?.expect("pending job");
    assert_eq!(job.id, id);
    assert_eq!(job.priority, 2);
    assert_eq!(job.job_type, "L1_cluster");
    assert_eq!(job.stage_params()?, params);

    let harvest = StageParams::Harvest(HarvestParams {
        query: "sleep".into(),
        ..Default::default()
    });
    let id = store.enqueue_stage(harvest, 0).await?;
    assert_eq!(store.get(id).await?.map(|j| j.params), Some(json!({ "query": "sleep" })));

    Ok(())
}

async fn orphans_fail_without_requeue() -> Result<(), Box<dyn Error>> {
    let store = SurrealJobStore::new();

    let stuck = store.enqueue("L2_extract", json!({ "article_id": "a1" }), 0).await?;
    store.claim_next("worker-dead").await?;
    let waiting = store.enqueue("L2_extract", json!({ "article_id": "a2" }), 0).await?;

    assert!(store.fail_orphans(chrono::Duration::hours(1)).await?.is_empty());

    let reconciled = store.fail_orphans(chrono::Duration::zero()).await?;
    assert_eq!(reconciled, vec![stuck]);

    let job = store.get(stuck).await?.expect("job row");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.map(|e| e.kind), Some(FailureKind::Orphaned));
    assert_eq!(
        store.get(waiting).await?.map(|j| j.status),
        Some(JobStatus::Pending)
    );

    Ok(())
}

async fn credentials_are_encrypted_at_rest() -> Result<(), Box<dyn Error>> {
    let vault = CredentialVault::new([9u8; 32]);
    let credentials = Arc::new(SurrealCredentialStore::new(vault));

    credentials
        .store_credential("u1", "semantic_scholar", "s2-key-0123456789")
        .await?;

    let raw = db::repositories::CredentialRepository::get("u1", "semantic_scholar")
        .await?
        .expect("credential row");
    assert!(!raw.contains("s2-key"));

    let secret = credentials
        .get_credential("u1", "semantic_scholar")
        .await?
        .expect("secret");
    assert_eq!(secret.expose(), "s2-key-0123456789");
    assert!(credentials.get_credential("u2", "semantic_scholar").await?.is_none());

    Ok(())
}
