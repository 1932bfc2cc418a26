use std::sync::Arc;

use pipeline_core::{
    ArticleLibrary, CredentialStore, HarvestParams, JobId, StageFuture, StageHandler, StageResult,
};

/// Provider name of the metadata API credential.
pub const SEMANTIC_SCHOLAR: &str = "semantic_scholar";

/// Candidates collected when a job sets no limit.
pub const DEFAULT_HARVEST_LIMIT: usize = 100;

/// L0: metadata harvest for a query.
pub struct HarvestStage {
    library: Arc<dyn ArticleLibrary>,
    credentials: Option<Arc<dyn CredentialStore>>,
}

impl HarvestStage {
    pub fn new(library: Arc<dyn ArticleLibrary>) -> Self {
        Self {
            library,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

impl StageHandler for HarvestStage {
    type Params = HarvestParams;

    fn handle<'a>(&'a self, job_id: JobId, params: &'a HarvestParams) -> StageFuture<'a> {
        Box::pin(async move {
            if let (Some(user_id), Some(credentials)) = (&params.user_id, &self.credentials) {
                match credentials.get_credential(user_id, SEMANTIC_SCHOLAR).await? {
                    Some(key) => tracing::debug!(
                        "Job {}: using {} key {} of user {}",
                        job_id,
                        SEMANTIC_SCHOLAR,
                        key.mask(),
                        user_id
                    ),
                    None => tracing::debug!(
                        "Job {}: no {} key for user {}, harvesting anonymously",
                        job_id,
                        SEMANTIC_SCHOLAR,
                        user_id
                    ),
                }
            }

            let limit = params.limit.unwrap_or(DEFAULT_HARVEST_LIMIT);
            let candidates = self.library.search(&params.query, limit).await?;

            tracing::info!(
                "L0 harvest '{}': {} candidates (limit {})",
                params.query,
                candidates.len(),
                limit
            );

            Ok(StageResult::Harvest {
                papers_found: candidates.len() as u64,
                query: params.query.clone(),
                candidates,
            })
        })
    }
}
