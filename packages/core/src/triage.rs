//! Recall-biased triage of candidate articles.

use serde::{Deserialize, Serialize};

use crate::ArticleId;

/// Scored keep/drop decision for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageDecision {
    pub article_id: ArticleId,
    pub score: f64,
    pub keep: bool,
    pub rationale: String,
}

/// Tunables for L1 triage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Minimum score for an article to be kept.
    pub threshold: f64,
    /// Kept articles scoring below this are reported as borderline.
    pub borderline: f64,
    /// Abstracts shorter than this are always kept.
    pub short_abstract_chars: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            threshold: 0.22,
            borderline: 0.30,
            short_abstract_chars: 60,
        }
    }
}

impl TriageConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Turn a relevance score into a recorded decision.
    ///
    /// Articles with too little abstract to judge are kept.
    pub fn decide(&self, article_id: ArticleId, abstract_text: &str, score: f64) -> TriageDecision {
        let short = abstract_text.trim().chars().count() < self.short_abstract_chars;
        let keep = score >= self.threshold || short;
        let rationale = if keep && score < self.borderline {
            format!("recall-first; threshold={}; borderline kept", self.threshold)
        } else if keep {
            "similarity-based triage".to_string()
        } else {
            format!("below threshold={}", self.threshold)
        };
        TriageDecision {
            article_id,
            score,
            keep,
            rationale,
        }
    }
}

/// Pluggable relevance scoring of an abstract against query terms.
pub trait TriageScorer: Send + Sync + 'static {
    /// Score in `[0, 1]`.
    fn score(&self, abstract_text: &str, query_terms: &[String]) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "A randomized trial of gene editing in hepatocytes with long-term follow up.";

    #[test]
    fn borderline_scores_are_kept_with_rationale() {
        let config = TriageConfig::default();
        let decision = config.decide(ArticleId::new("a1"), LONG, 0.25);
        assert!(decision.keep);
        assert_eq!(decision.rationale, "recall-first; threshold=0.22; borderline kept");
    }

    #[test]
    fn low_scores_are_dropped_but_recorded() {
        let decision = TriageConfig::default().decide(ArticleId::new("a1"), LONG, 0.1);
        assert!(!decision.keep);
        assert_eq!(decision.score, 0.1);
        assert!(decision.rationale.contains("below threshold"));
    }

    #[test]
    fn short_abstracts_are_always_kept() {
        let decision = TriageConfig::default().decide(ArticleId::new("a1"), "n/a", 0.0);
        assert!(decision.keep);
    }

    #[test]
    fn threshold_is_configurable() {
        let config = TriageConfig::default().with_threshold(0.5);
        assert!(!config.decide(ArticleId::new("a1"), LONG, 0.4).keep);
        assert_eq!(
            config.decide(ArticleId::new("a1"), LONG, 0.9).rationale,
            "similarity-based triage"
        );
    }
}
