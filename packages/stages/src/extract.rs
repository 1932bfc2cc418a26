use std::sync::{Arc, LazyLock};

use pipeline_core::{
    ArticleLibrary, ExtractParams, JobId, PipelineError, StageFuture, StageHandler, StageResult,
};
use regex::Regex;

use crate::sections::split_sections;

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+|\n{2,}").expect("sentence pattern is valid"));

static FINDING_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(increase[sd]?|decrease[sd]?|reduce[sd]?|improve[sd]?|elevated|lowered|higher|associated with|correlat\w*|predict\w*|significant(?:ly)?|no (?:significant )?(?:effect|difference))\b",
    )
    .expect("finding pattern is valid")
});

static MECHANISM_CUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(mediat\w*|via|mechanisms?|pathways?|by (?:activating|inhibiting|modulating)|through (?:activation|inhibition))\b")
        .expect("mechanism pattern is valid")
});

/// L2: finding extraction from stored full text.
pub struct ExtractStage {
    library: Arc<dyn ArticleLibrary>,
}

impl ExtractStage {
    pub fn new(library: Arc<dyn ArticleLibrary>) -> Self {
        Self { library }
    }
}

/// Count finding and mechanism sentences in a paper.
pub(crate) fn count_cues(text: &str) -> (u64, u64) {
    let sections = split_sections(text);
    let body = match sections.findings_text() {
        findings if !findings.is_empty() => findings,
        _ => text.to_string(),
    };

    let mut findings = 0;
    let mut mechanisms = 0;
    for sentence in SENTENCE_BREAK.split(&body).map(str::trim) {
        if sentence.is_empty() {
            continue;
        }
        if FINDING_CUE.is_match(sentence) {
            findings += 1;
        }
        if MECHANISM_CUE.is_match(sentence) {
            mechanisms += 1;
        }
    }
    (findings, mechanisms)
}

impl StageHandler for ExtractStage {
    type Params = ExtractParams;

    fn handle<'a>(&'a self, job_id: JobId, params: &'a ExtractParams) -> StageFuture<'a> {
        Box::pin(async move {
            let text = self
                .library
                .full_text(&params.article_id)
                .await?
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| {
                    PipelineError::execution(format!(
                        "no stored full text for article {}",
                        params.article_id
                    ))
                })?;

            let (findings_extracted, mechanisms_identified) = count_cues(&text);
            tracing::info!(
                "Job {}: article {} yielded {} findings, {} mechanisms",
                job_id,
                params.article_id,
                findings_extracted,
                mechanisms_identified
            );

            Ok(StageResult::Extract {
                article_id: params.article_id.clone(),
                findings_extracted,
                mechanisms_identified,
            })
        })
    }
}
