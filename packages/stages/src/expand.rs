use std::collections::HashSet;
use std::sync::Arc;

use pipeline_core::{
    ArticleId, ArticleLibrary, ExpandParams, JobId, StageFuture, StageHandler, StageResult,
};

/// L4: related-article expansion from seed articles.
///
/// Candidates come back in discovery order, de-duplicated, without the
/// seeds themselves.
pub struct ExpandStage {
    library: Arc<dyn ArticleLibrary>,
}

impl ExpandStage {
    pub fn new(library: Arc<dyn ArticleLibrary>) -> Self {
        Self { library }
    }
}

impl StageHandler for ExpandStage {
    type Params = ExpandParams;

    fn handle<'a>(&'a self, job_id: JobId, params: &'a ExpandParams) -> StageFuture<'a> {
        Box::pin(async move {
            let seeds: HashSet<&ArticleId> = params.seed_articles.iter().collect();
            let mut seen: HashSet<ArticleId> = HashSet::new();
            let mut candidates = Vec::new();

            for seed in &params.seed_articles {
                for related in self.library.related(seed).await? {
                    if seeds.contains(&related) || !seen.insert(related.clone()) {
                        continue;
                    }
                    candidates.push(related);
                }
            }
            if let Some(limit) = params.limit {
                candidates.truncate(limit);
            }

            tracing::info!(
                "Job {}: {} seeds expanded to {} new candidates",
                job_id,
                params.seed_articles.len(),
                candidates.len()
            );

            Ok(StageResult::Expand {
                new_candidates: candidates.len() as u64,
                candidates,
            })
        })
    }
}
