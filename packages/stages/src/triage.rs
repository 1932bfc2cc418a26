//! Default relevance scorer for L1 triage.

use std::collections::HashSet;
use std::sync::LazyLock;

use pipeline_core::TriageScorer;
use regex::Regex;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]{3,}").expect("word pattern is valid"));

/// Weight of query-term overlap; the rest goes to text similarity.
const OVERLAP_WEIGHT: f64 = 0.7;

/// Scores an abstract by query-term overlap blended with bigram similarity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecallFirstScorer;

fn tokens(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Dice coefficient over character bigrams.
fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (bigrams(a), bigrams(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    2.0 * shared as f64 / (a.len() + b.len()) as f64
}

impl TriageScorer for RecallFirstScorer {
    fn score(&self, abstract_text: &str, query_terms: &[String]) -> f64 {
        let query: HashSet<String> = query_terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let words = tokens(abstract_text);
        let present: HashSet<&str> = words.iter().map(String::as_str).collect();

        let overlap = query.iter().filter(|t| present.contains(t.as_str())).count() as f64
            / query.len().max(1) as f64;

        let mut sorted: Vec<&str> = query.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        let sim = similarity(&words.join(" "), &sorted.join(" "));

        let score = OVERLAP_WEIGHT * overlap + (1.0 - OVERLAP_WEIGHT) * sim;
        (score.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn full_overlap_scores_high() {
        let score = RecallFirstScorer.score(
            "CRISPR editing of liver cells restores enzyme activity.",
            &terms(&["crispr", "liver"]),
        );
        assert!(score >= 0.7, "score {score}");
    }

    #[test]
    fn unrelated_abstract_scores_low() {
        let score = RecallFirstScorer.score(
            "Urban heat islands alter migratory timing of songbirds.",
            &terms(&["crispr", "liver"]),
        );
        assert!(score < 0.22, "score {score}");
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(RecallFirstScorer.score("", &terms(&["crispr"])), 0.0);
        assert_eq!(RecallFirstScorer.score("some abstract text", &[]), 0.0);
    }
}
