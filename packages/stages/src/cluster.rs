use std::sync::Arc;

use pipeline_core::{
    ArticleLibrary, ClusterParams, JobId, StageFuture, StageHandler, StageResult, TriageConfig,
    TriageDecision, TriageScorer,
};

/// L1: recall-biased triage of candidate abstracts.
///
/// Every article gets a recorded decision with its score and rationale,
/// including the ones that are dropped.
pub struct ClusterStage {
    library: Arc<dyn ArticleLibrary>,
    scorer: Arc<dyn TriageScorer>,
    config: TriageConfig,
}

impl ClusterStage {
    pub fn new(
        library: Arc<dyn ArticleLibrary>,
        scorer: Arc<dyn TriageScorer>,
        config: TriageConfig,
    ) -> Self {
        Self {
            library,
            scorer,
            config,
        }
    }
}

impl StageHandler for ClusterStage {
    type Params = ClusterParams;

    fn handle<'a>(&'a self, job_id: JobId, params: &'a ClusterParams) -> StageFuture<'a> {
        Box::pin(async move {
            let terms: Vec<String> = params
                .query_terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if terms.is_empty() {
                tracing::warn!("Job {}: no query terms, keeping every article", job_id);
            }

            let mut decisions = Vec::with_capacity(params.article_ids.len());
            for article_id in &params.article_ids {
                let abstract_text = self
                    .library
                    .abstract_text(article_id)
                    .await?
                    .unwrap_or_default();

                let decision = if terms.is_empty() {
                    TriageDecision {
                        article_id: article_id.clone(),
                        score: 0.0,
                        keep: true,
                        rationale: "no query terms; kept for recall".to_string(),
                    }
                } else {
                    let score = self.scorer.score(&abstract_text, &terms);
                    self.config.decide(article_id.clone(), &abstract_text, score)
                };
                tracing::debug!(
                    "L1 {}: score={:.4} keep={} ({})",
                    decision.article_id,
                    decision.score,
                    decision.keep,
                    decision.rationale
                );
                decisions.push(decision);
            }

            let total = decisions.len() as u64;
            let kept = decisions.iter().filter(|d| d.keep).count() as u64;
            let recall_estimate = if total == 0 {
                0.0
            } else {
                kept as f64 / total as f64
            };

            tracing::info!("L1 triage: {} of {} articles kept", kept, total);

            Ok(StageResult::Cluster {
                total,
                kept,
                dropped: total - kept,
                recall_estimate,
                decisions,
            })
        })
    }
}
