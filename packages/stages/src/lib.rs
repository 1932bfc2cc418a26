//! Stage handlers for the literature pipeline.
//!
//! - `L0_harvest`: [`HarvestStage`] collects candidate articles for a query
//! - `L1_cluster`: [`ClusterStage`] triages abstracts, recall first
//! - `L2_extract`: [`ExtractStage`] pulls findings out of stored full text
//! - `L3_synthesize`: [`SynthesizeStage`] turns a cluster of findings into a rule
//! - `L4_expand`: [`ExpandStage`] proposes related articles for the next harvest

mod cluster;
mod expand;
mod extract;
mod harvest;
mod sections;
mod synthesize;
mod triage;

use std::sync::Arc;

use pipeline_core::{ArticleLibrary, CredentialStore, StageTable, TriageConfig};

pub use cluster::ClusterStage;
pub use expand::ExpandStage;
pub use extract::ExtractStage;
pub use harvest::{DEFAULT_HARVEST_LIMIT, HarvestStage, SEMANTIC_SCHOLAR};
pub use sections::{Sections, split_sections};
pub use synthesize::SynthesizeStage;
pub use triage::RecallFirstScorer;

/// Collaborators shared by the stage handlers.
#[derive(Clone)]
pub struct StageDeps {
    pub library: Arc<dyn ArticleLibrary>,
    pub credentials: Option<Arc<dyn CredentialStore>>,
    pub triage: TriageConfig,
}

impl StageDeps {
    pub fn new(library: Arc<dyn ArticleLibrary>) -> Self {
        Self {
            library,
            credentials: None,
            triage: TriageConfig::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_triage(mut self, triage: TriageConfig) -> Self {
        self.triage = triage;
        self
    }
}

/// Build the dispatch table with the default handler for every stage.
pub fn stage_table(deps: StageDeps) -> StageTable {
    let mut harvest = HarvestStage::new(deps.library.clone());
    if let Some(credentials) = deps.credentials {
        harvest = harvest.with_credentials(credentials);
    }

    StageTable {
        harvest: Arc::new(harvest),
        cluster: Arc::new(ClusterStage::new(
            deps.library.clone(),
            Arc::new(RecallFirstScorer),
            deps.triage,
        )),
        extract: Arc::new(ExtractStage::new(deps.library.clone())),
        synthesize: Arc::new(SynthesizeStage::new(deps.library.clone())),
        expand: Arc::new(ExpandStage::new(deps.library)),
    }
}
