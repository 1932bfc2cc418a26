//! Article library consumed by the stage handlers.
//!
//! The library is the indirect data path between stages: harvested
//! metadata, abstracts, stored full text and L2 findings grouped by cluster.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ArticleId, BoxFuture, ClusterId, PipelineError};

/// Errors raised by article library backends.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("library unavailable: {0}")]
    Unavailable(String),
    #[error("malformed entry {key}: {reason}")]
    Malformed { key: String, reason: String },
}

impl From<LibraryError> for PipelineError {
    fn from(err: LibraryError) -> Self {
        PipelineError::HandlerExecution(err.to_string())
    }
}

/// Direction of an effect reported by a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectDirection {
    Positive,
    Negative,
    Null,
}

/// A structured finding extracted from one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub article_id: ArticleId,
    pub claim: String,
    pub direction: EffectDirection,
    pub confidence: f64,
}

/// Stored metadata and text for one article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: ArticleId,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<ArticleId>,
}

impl ArticleRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: ArticleId::new(id),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = text.into();
        self
    }

    pub fn with_full_text(mut self, text: impl Into<String>) -> Self {
        self.full_text = Some(text.into());
        self
    }

    pub fn with_related(mut self, related: impl IntoIterator<Item = &'static str>) -> Self {
        self.related = related.into_iter().map(ArticleId::new).collect();
        self
    }

    /// Whether every query term occurs in the title or abstract.
    pub fn matches(&self, terms: &[String]) -> bool {
        let haystack = format!("{} {}", self.title, self.abstract_text).to_lowercase();
        !terms.is_empty() && terms.iter().all(|term| haystack.contains(term.as_str()))
    }
}

/// Lower-cased alphabetic tokens of at least three letters.
pub fn query_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|token| token.len() >= 3)
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Read access to harvested articles and extracted findings.
pub trait ArticleLibrary: Send + Sync + 'static {
    /// Articles matching a free-text query, best first.
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ArticleId>, LibraryError>>;

    fn abstract_text<'a>(
        &'a self,
        id: &'a ArticleId,
    ) -> BoxFuture<'a, Result<Option<String>, LibraryError>>;

    fn full_text<'a>(
        &'a self,
        id: &'a ArticleId,
    ) -> BoxFuture<'a, Result<Option<String>, LibraryError>>;

    fn cluster_findings<'a>(
        &'a self,
        cluster_id: &'a ClusterId,
    ) -> BoxFuture<'a, Result<Vec<Finding>, LibraryError>>;

    /// Articles cited by or citing `id`.
    fn related<'a>(
        &'a self,
        id: &'a ArticleId,
    ) -> BoxFuture<'a, Result<Vec<ArticleId>, LibraryError>>;
}

/// Library held in process memory.
#[derive(Clone, Default)]
pub struct InMemoryLibrary {
    articles: Arc<RwLock<HashMap<ArticleId, ArticleRecord>>>,
    clusters: Arc<RwLock<HashMap<ClusterId, Vec<Finding>>>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_article(&self, record: ArticleRecord) -> Result<(), LibraryError> {
        let mut articles = self
            .articles
            .write()
            .map_err(|_| LibraryError::Unavailable("article map poisoned".into()))?;
        articles.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn add_findings(
        &self,
        cluster_id: ClusterId,
        findings: Vec<Finding>,
    ) -> Result<(), LibraryError> {
        let mut clusters = self
            .clusters
            .write()
            .map_err(|_| LibraryError::Unavailable("cluster map poisoned".into()))?;
        clusters.entry(cluster_id).or_default().extend(findings);
        Ok(())
    }

    fn with_article<T>(
        &self,
        id: &ArticleId,
        f: impl FnOnce(&ArticleRecord) -> T,
    ) -> Result<Option<T>, LibraryError> {
        let articles = self
            .articles
            .read()
            .map_err(|_| LibraryError::Unavailable("article map poisoned".into()))?;
        Ok(articles.get(id).map(f))
    }

    fn search_sync(&self, query: &str, limit: usize) -> Result<Vec<ArticleId>, LibraryError> {
        let terms = query_terms(query);
        let articles = self
            .articles
            .read()
            .map_err(|_| LibraryError::Unavailable("article map poisoned".into()))?;
        let mut hits: Vec<ArticleId> = articles
            .values()
            .filter(|record| record.matches(&terms))
            .map(|record| record.id.clone())
            .collect();
        hits.sort();
        hits.truncate(limit);
        Ok(hits)
    }
}

impl ArticleLibrary for InMemoryLibrary {
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ArticleId>, LibraryError>> {
        Box::pin(async move { self.search_sync(query, limit) })
    }

    fn abstract_text<'a>(
        &'a self,
        id: &'a ArticleId,
    ) -> BoxFuture<'a, Result<Option<String>, LibraryError>> {
        Box::pin(async move { self.with_article(id, |r| r.abstract_text.clone()) })
    }

    fn full_text<'a>(
        &'a self,
        id: &'a ArticleId,
    ) -> BoxFuture<'a, Result<Option<String>, LibraryError>> {
        Box::pin(async move { Ok(self.with_article(id, |r| r.full_text.clone())?.flatten()) })
    }

    fn cluster_findings<'a>(
        &'a self,
        cluster_id: &'a ClusterId,
    ) -> BoxFuture<'a, Result<Vec<Finding>, LibraryError>> {
        Box::pin(async move {
            let clusters = self
                .clusters
                .read()
                .map_err(|_| LibraryError::Unavailable("cluster map poisoned".into()))?;
            Ok(clusters.get(cluster_id).cloned().unwrap_or_default())
        })
    }

    fn related<'a>(
        &'a self,
        id: &'a ArticleId,
    ) -> BoxFuture<'a, Result<Vec<ArticleId>, LibraryError>> {
        Box::pin(async move {
            let related = self.with_article(id, |r| r.related.clone())?;
            Ok(related.unwrap_or_default())
        })
    }
}
