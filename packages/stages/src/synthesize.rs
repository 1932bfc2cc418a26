use std::collections::BTreeMap;
use std::sync::Arc;

use pipeline_core::{
    ArticleId, ArticleLibrary, EffectDirection, Finding, JobId, StageFuture, StageHandler,
    StageResult, SynthesizeParams,
};

/// Distinct source articles needed before a rule is proposed.
const MIN_SOURCES: usize = 2;
/// Mean finding confidence needed before a rule is proposed.
const MIN_CONFIDENCE: f64 = 0.5;

const DIRECTIONS: [EffectDirection; 3] = [
    EffectDirection::Positive,
    EffectDirection::Negative,
    EffectDirection::Null,
];

/// L3: cross-document rule synthesis over a cluster of L2 findings.
pub struct SynthesizeStage {
    library: Arc<dyn ArticleLibrary>,
}

impl SynthesizeStage {
    pub fn new(library: Arc<dyn ArticleLibrary>) -> Self {
        Self { library }
    }
}

/// Most frequent direction; ties resolve in `DIRECTIONS` order.
fn dominant<'a>(directions: impl Iterator<Item = &'a EffectDirection>) -> Option<EffectDirection> {
    let mut counts = [0usize; 3];
    for direction in directions {
        if let Some(i) = DIRECTIONS.iter().position(|d| d == direction) {
            counts[i] += 1;
        }
    }
    let mut best: Option<(usize, EffectDirection)> = None;
    for (i, count) in counts.into_iter().enumerate() {
        if count > 0 && best.is_none_or(|(n, _)| count > n) {
            best = Some((count, DIRECTIONS[i]));
        }
    }
    best.map(|(_, d)| d)
}

/// Synthesis certainty: mean confidence of the findings.
pub(crate) fn confidence(findings: &[Finding]) -> f64 {
    if findings.is_empty() {
        return 0.0;
    }
    let sum: f64 = findings.iter().map(|f| f.confidence.clamp(0.0, 1.0)).sum();
    sum / findings.len() as f64
}

/// Cross-source agreement: share of articles whose own dominant direction
/// matches the majority across articles. Returns the score and the number
/// of distinct articles.
pub(crate) fn triangulation(findings: &[Finding]) -> (f64, usize) {
    let mut by_article: BTreeMap<&ArticleId, Vec<EffectDirection>> = BTreeMap::new();
    for finding in findings {
        by_article
            .entry(&finding.article_id)
            .or_default()
            .push(finding.direction);
    }

    let per_article: Vec<EffectDirection> = by_article
        .values()
        .filter_map(|dirs| dominant(dirs.iter()))
        .collect();
    let sources = per_article.len();
    let Some(majority) = dominant(per_article.iter()) else {
        return (0.0, 0);
    };

    let agreeing = per_article.iter().filter(|d| **d == majority).count();
    (agreeing as f64 / sources as f64, sources)
}

impl StageHandler for SynthesizeStage {
    type Params = SynthesizeParams;

    fn handle<'a>(&'a self, job_id: JobId, params: &'a SynthesizeParams) -> StageFuture<'a> {
        Box::pin(async move {
            let findings = self.library.cluster_findings(&params.cluster_id).await?;

            let confidence = confidence(&findings);
            let (triangulation_score, sources) = triangulation(&findings);
            let rule_generated = sources >= MIN_SOURCES
                && triangulation_score > 0.5
                && confidence >= MIN_CONFIDENCE;

            tracing::info!(
                "Job {}: cluster {} has {} findings from {} articles, rule={}",
                job_id,
                params.cluster_id,
                findings.len(),
                sources,
                rule_generated
            );

            Ok(StageResult::Synthesize {
                cluster_id: params.cluster_id.clone(),
                rule_generated,
                confidence,
                triangulation_score,
            })
        })
    }
}
