//! Article library stored as objects.
//!
//! Layout:
//! - `library/catalog.json`: every [`ArticleRecord`] without its full text
//! - `library/texts/{article_id}.txt`: extracted full text
//! - `library/clusters/{cluster_id}.json`: L2 findings of a cluster

use std::sync::Arc;

use pipeline_core::{
    ArticleId, ArticleLibrary, ArticleRecord, BoxFuture, ClusterId, Finding, LibraryError,
    query_terms,
};
use tokio::sync::Mutex;

use crate::{Storage, StorageError};

const CATALOG_KEY: &str = "library/catalog.json";

fn text_key(id: &ArticleId) -> String {
    format!("library/texts/{}.txt", id)
}

fn cluster_key(id: &ClusterId) -> String {
    format!("library/clusters/{}.json", id)
}

/// Article library on top of [`Storage`].
///
/// Catalog updates are read-modify-write; writers in one process are
/// serialized, concurrent writer processes are not supported.
#[derive(Clone)]
pub struct ObjectLibrary {
    storage: Storage,
    write_lock: Arc<Mutex<()>>,
}

impl ObjectLibrary {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn catalog(&self) -> Result<Vec<ArticleRecord>, StorageError> {
        Ok(self
            .storage
            .get_json::<Vec<ArticleRecord>>(CATALOG_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn lookup(&self, id: &ArticleId) -> Result<Option<ArticleRecord>, StorageError> {
        Ok(self.catalog().await?.into_iter().find(|r| &r.id == id))
    }

    /// Add or replace an article. Full text goes to its own object.
    pub async fn put_article(&self, mut record: ArticleRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        if let Some(text) = record.full_text.take() {
            self.storage.put_text(&text_key(&record.id), &text).await?;
        }

        let mut catalog = self.catalog().await?;
        catalog.retain(|r| r.id != record.id);
        catalog.push(record);
        catalog.sort_by(|a, b| a.id.cmp(&b.id));
        self.storage.put_json(CATALOG_KEY, &catalog).await
    }

    /// Append findings to a cluster.
    pub async fn put_findings(
        &self,
        cluster_id: &ClusterId,
        findings: Vec<Finding>,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let key = cluster_key(cluster_id);
        let mut existing: Vec<Finding> = self.storage.get_json(&key).await?.unwrap_or_default();
        existing.extend(findings);
        self.storage.put_json(&key, &existing).await
    }
}

impl ArticleLibrary for ObjectLibrary {
    fn search<'a>(
        &'a self,
        query: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ArticleId>, LibraryError>> {
        Box::pin(async move {
            let terms = query_terms(query);
            let hits = self
                .catalog()
                .await?
                .into_iter()
                .filter(|record| record.matches(&terms))
                .map(|record| record.id)
                .take(limit)
                .collect();
            Ok(hits)
        })
    }

    fn abstract_text<'a>(
        &'a self,
        id: &'a ArticleId,
    ) -> BoxFuture<'a, Result<Option<String>, LibraryError>> {
        Box::pin(async move { Ok(self.lookup(id).await?.map(|r| r.abstract_text)) })
    }

    fn full_text<'a>(
        &'a self,
        id: &'a ArticleId,
    ) -> BoxFuture<'a, Result<Option<String>, LibraryError>> {
        Box::pin(async move { Ok(self.storage.get_text(&text_key(id)).await?) })
    }

    fn cluster_findings<'a>(
        &'a self,
        cluster_id: &'a ClusterId,
    ) -> BoxFuture<'a, Result<Vec<Finding>, LibraryError>> {
        Box::pin(async move {
            Ok(self
                .storage
                .get_json(&cluster_key(cluster_id))
                .await?
                .unwrap_or_default())
        })
    }

    fn related<'a>(
        &'a self,
        id: &'a ArticleId,
    ) -> BoxFuture<'a, Result<Vec<ArticleId>, LibraryError>> {
        Box::pin(async move {
            Ok(self
                .lookup(id)
                .await?
                .map(|r| r.related)
                .unwrap_or_default())
        })
    }
}
