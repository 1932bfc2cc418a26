#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::FnStage;
use pipeline_core::{
    ClusterParams, ExpandParams, ExtractParams, HarvestParams, Job, JobFailure, JobFilter, JobId,
    JobStore, MemoryJobStore, PipelineError, StageResult, StageTable, SynthesizeParams,
};

/// Stage table whose handlers count invocations and return canned results.
///
/// Extraction fails, synthesis of cluster `corrupt` panics and expansion
/// hangs, so every failure path of the dispatcher can be driven from a
/// single table.
pub fn scripted_table(calls: Arc<AtomicUsize>) -> StageTable {
    let harvest_calls = calls.clone();
    let cluster_calls = calls.clone();
    let extract_calls = calls.clone();
    let synthesize_calls = calls.clone();
    let expand_calls = calls;

    StageTable {
        harvest: Arc::new(FnStage::<HarvestParams, _>::new(
            move |_id: JobId, params: HarvestParams| {
                harvest_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(StageResult::Harvest {
                        papers_found: 3,
                        query: params.query,
                        candidates: vec![],
                    })
                }
            },
        )),
        cluster: Arc::new(FnStage::<ClusterParams, _>::new(
            move |_id: JobId, params: ClusterParams| {
                cluster_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let total = params.article_ids.len() as u64;
                    Ok(StageResult::Cluster {
                        total,
                        kept: total,
                        dropped: 0,
                        recall_estimate: 1.0,
                        decisions: vec![],
                    })
                }
            },
        )),
        extract: Arc::new(FnStage::<ExtractParams, _>::new(
            move |_id: JobId, params: ExtractParams| {
                extract_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(PipelineError::execution(format!(
                        "no stored full text for article {}",
                        params.article_id
                    )))
                }
            },
        )),
        synthesize: Arc::new(FnStage::<SynthesizeParams, _>::new(
            move |_id: JobId, params: SynthesizeParams| {
                synthesize_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if params.cluster_id.as_str() == "corrupt" {
                        panic!("findings table corrupted");
                    }
                    Ok(StageResult::Synthesize {
                        cluster_id: params.cluster_id,
                        rule_generated: false,
                        confidence: 0.0,
                        triangulation_score: 0.0,
                    })
                }
            },
        )),
        expand: Arc::new(FnStage::<ExpandParams, _>::new(move |_id: JobId, _params: ExpandParams| {
            expand_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(StageResult::Expand {
                    new_candidates: 0,
                    candidates: vec![],
                })
            }
        })),
    }
}

/// Memory store whose next `claim_next` calls fail as if the backend were down.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryJobStore,
    outages: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` claims with `StoreUnavailable`.
    pub fn fail_next_claims(&self, count: usize) {
        self.outages.store(count, Ordering::SeqCst);
    }
}

impl JobStore for FlakyStore {
    async fn insert(&self, job: Job) -> Result<Job, PipelineError> {
        self.inner.insert(job).await
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, PipelineError> {
        let down = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if down {
            return Err(PipelineError::StoreUnavailable("injected outage".into()));
        }
        self.inner.claim_next(worker_id).await
    }

    async fn complete(&self, id: JobId, result: StageResult) -> Result<Job, PipelineError> {
        self.inner.complete(id, result).await
    }

    async fn fail(&self, id: JobId, failure: JobFailure) -> Result<Job, PipelineError> {
        self.inner.fail(id, failure).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, PipelineError> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, PipelineError> {
        self.inner.list(filter).await
    }

    async fn fail_orphans(
        &self,
        stale_after: chrono::Duration,
    ) -> Result<Vec<JobId>, PipelineError> {
        self.inner.fail_orphans(stale_after).await
    }
}

/// Poll `store` until `id` reaches a terminal state.
pub async fn wait_terminal<S: JobStore>(store: &S, id: JobId) -> Job {
    for _ in 0..200 {
        if let Some(job) = store.get(id).await.unwrap()
            && job.status.is_terminal()
        {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never finished", id);
}
