//! Pipeline stages: tags, typed parameters, results and the handler contract.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::job::JobId;
use crate::triage::TriageDecision;

/// Boxed future used by object-safe collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future returned by stage handlers.
pub type StageFuture<'a> = BoxFuture<'a, Result<StageResult, PipelineError>>;

/// The five pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobType {
    /// L0: metadata harvest for a query.
    #[serde(rename = "L0_harvest")]
    Harvest,
    /// L1: abstract triage and clustering.
    #[serde(rename = "L1_cluster")]
    Cluster,
    /// L2: finding extraction from full text.
    #[serde(rename = "L2_extract")]
    Extract,
    /// L3: cross-document rule synthesis.
    #[serde(rename = "L3_synthesize")]
    Synthesize,
    /// L4: related article expansion.
    #[serde(rename = "L4_expand")]
    Expand,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::Harvest,
        JobType::Cluster,
        JobType::Extract,
        JobType::Synthesize,
        JobType::Expand,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Harvest => "L0_harvest",
            JobType::Cluster => "L1_cluster",
            JobType::Extract => "L2_extract",
            JobType::Synthesize => "L3_synthesize",
            JobType::Expand => "L4_expand",
        }
    }
}

impl FromStr for JobType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownJobType(s.to_string()))
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts ids given either as strings or as integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Identifier of an article in the library.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawId")]
pub struct ArticleId(pub String);

impl From<RawId> for ArticleId {
    fn from(raw: RawId) -> Self {
        Self(raw.into())
    }
}

impl ArticleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a cluster of L2 findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawId")]
pub struct ClusterId(pub String);

impl From<RawId> for ClusterId {
    fn from(raw: RawId) -> Self {
        Self(raw.into())
    }
}

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters for `L0_harvest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestParams {
    #[serde(default)]
    pub query: String,
    /// User whose provider credential should be used, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Maximum number of candidates to collect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Parameters for `L1_cluster`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    #[serde(default)]
    pub article_ids: Vec<ArticleId>,
    /// Terms abstracts are scored against.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_terms: Vec<String>,
}

/// Parameters for `L2_extract`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractParams {
    #[serde(default)]
    pub article_id: ArticleId,
}

/// Parameters for `L3_synthesize`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeParams {
    #[serde(default)]
    pub cluster_id: ClusterId,
}

/// Parameters for `L4_expand`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpandParams {
    #[serde(default)]
    pub seed_articles: Vec<ArticleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Validated parameters, one variant per stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageParams {
    Harvest(HarvestParams),
    Cluster(ClusterParams),
    Extract(ExtractParams),
    Synthesize(SynthesizeParams),
    Expand(ExpandParams),
}

fn decode<T: DeserializeOwned>(
    job_type: JobType,
    params: &serde_json::Value,
) -> Result<T, PipelineError> {
    let value = if params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| PipelineError::invalid_params(job_type, e.to_string()))
}

impl StageParams {
    /// Decode and validate raw parameters for a stage.
    pub fn parse(job_type: JobType, params: &serde_json::Value) -> Result<Self, PipelineError> {
        let parsed = match job_type {
            JobType::Harvest => StageParams::Harvest(decode(job_type, params)?),
            JobType::Cluster => StageParams::Cluster(decode(job_type, params)?),
            JobType::Extract => StageParams::Extract(decode(job_type, params)?),
            JobType::Synthesize => StageParams::Synthesize(decode(job_type, params)?),
            JobType::Expand => StageParams::Expand(decode(job_type, params)?),
        };
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn job_type(&self) -> JobType {
        match self {
            StageParams::Harvest(_) => JobType::Harvest,
            StageParams::Cluster(_) => JobType::Cluster,
            StageParams::Extract(_) => JobType::Extract,
            StageParams::Synthesize(_) => JobType::Synthesize,
            StageParams::Expand(_) => JobType::Expand,
        }
    }

    /// Check the required fields of the stage contract.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let job_type = self.job_type();
        let missing = match self {
            StageParams::Harvest(p) if p.query.trim().is_empty() => Some("'query' is required"),
            StageParams::Cluster(p) if p.article_ids.is_empty() => {
                Some("'article_ids' must not be empty")
            }
            StageParams::Cluster(p) if p.article_ids.iter().any(ArticleId::is_empty) => {
                Some("'article_ids' contains an empty id")
            }
            StageParams::Extract(p) if p.article_id.is_empty() => Some("'article_id' is required"),
            StageParams::Synthesize(p) if p.cluster_id.0.is_empty() => {
                Some("'cluster_id' is required")
            }
            StageParams::Expand(p) if p.seed_articles.is_empty() => {
                Some("'seed_articles' must not be empty")
            }
            _ => None,
        };
        match missing {
            Some(reason) => Err(PipelineError::invalid_params(job_type, reason)),
            None => Ok(()),
        }
    }

    /// Serialize the parameters back to the stored representation.
    pub fn to_value(&self) -> serde_json::Value {
        let encoded = match self {
            StageParams::Harvest(p) => serde_json::to_value(p),
            StageParams::Cluster(p) => serde_json::to_value(p),
            StageParams::Extract(p) => serde_json::to_value(p),
            StageParams::Synthesize(p) => serde_json::to_value(p),
            StageParams::Expand(p) => serde_json::to_value(p),
        };
        encoded.unwrap_or(serde_json::Value::Null)
    }
}

/// Output of a stage, keyed by job when persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageResult {
    Harvest {
        papers_found: u64,
        query: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        candidates: Vec<ArticleId>,
    },
    Cluster {
        total: u64,
        kept: u64,
        dropped: u64,
        recall_estimate: f64,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        decisions: Vec<TriageDecision>,
    },
    Extract {
        article_id: ArticleId,
        findings_extracted: u64,
        mechanisms_identified: u64,
    },
    Synthesize {
        cluster_id: ClusterId,
        rule_generated: bool,
        confidence: f64,
        triangulation_score: f64,
    },
    Expand {
        new_candidates: u64,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        candidates: Vec<ArticleId>,
    },
}

impl StageResult {
    pub fn job_type(&self) -> JobType {
        match self {
            StageResult::Harvest { .. } => JobType::Harvest,
            StageResult::Cluster { .. } => JobType::Cluster,
            StageResult::Extract { .. } => JobType::Extract,
            StageResult::Synthesize { .. } => JobType::Synthesize,
            StageResult::Expand { .. } => JobType::Expand,
        }
    }

    /// Short human-readable summary for logs.
    pub fn summary(&self) -> String {
        match self {
            StageResult::Harvest {
                papers_found,
                query,
                ..
            } => format!("{} papers found for '{}'", papers_found, query),
            StageResult::Cluster {
                total,
                kept,
                dropped,
                ..
            } => format!("{} articles triaged: {} kept, {} dropped", total, kept, dropped),
            StageResult::Extract {
                article_id,
                findings_extracted,
                mechanisms_identified,
            } => format!(
                "article {}: {} findings, {} mechanisms",
                article_id, findings_extracted, mechanisms_identified
            ),
            StageResult::Synthesize {
                cluster_id,
                rule_generated,
                confidence,
                triangulation_score,
            } => format!(
                "cluster {}: rule={} confidence={:.2} triangulation={:.2}",
                cluster_id, rule_generated, confidence, triangulation_score
            ),
            StageResult::Expand { new_candidates, .. } => {
                format!("{} new candidates", new_candidates)
            }
        }
    }
}

/// Trait for stage handlers.
///
/// Implement this trait to provide the logic of one stage. Handlers receive
/// parameters that already passed validation.
pub trait StageHandler: Send + Sync + 'static {
    /// Typed parameters this handler consumes.
    type Params: Send + Sync;

    /// Execute the stage for one job.
    fn handle<'a>(&'a self, job_id: JobId, params: &'a Self::Params) -> StageFuture<'a>;
}

/// Dispatch table with exactly one handler per stage.
///
/// Every stage is a named field, so a table missing a stage does not build.
#[derive(Clone)]
pub struct StageTable {
    pub harvest: Arc<dyn StageHandler<Params = HarvestParams>>,
    pub cluster: Arc<dyn StageHandler<Params = ClusterParams>>,
    pub extract: Arc<dyn StageHandler<Params = ExtractParams>>,
    pub synthesize: Arc<dyn StageHandler<Params = SynthesizeParams>>,
    pub expand: Arc<dyn StageHandler<Params = ExpandParams>>,
}

impl StageTable {
    /// Route validated parameters to the matching handler.
    pub fn dispatch<'a>(&'a self, job_id: JobId, params: &'a StageParams) -> StageFuture<'a> {
        match params {
            StageParams::Harvest(p) => self.harvest.handle(job_id, p),
            StageParams::Cluster(p) => self.cluster.handle(job_id, p),
            StageParams::Extract(p) => self.extract.handle(job_id, p),
            StageParams::Synthesize(p) => self.synthesize.handle(job_id, p),
            StageParams::Expand(p) => self.expand.handle(job_id, p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_type_tags_round_trip() {
        for job_type in JobType::ALL {
            assert_eq!(job_type.as_str().parse::<JobType>().unwrap(), job_type);
            let encoded = serde_json::to_value(job_type).unwrap();
            assert_eq!(encoded, json!(job_type.as_str()));
        }
        assert!(matches!(
            "L9_bogus".parse::<JobType>(),
            Err(PipelineError::UnknownJobType(_))
        ));
    }

    #[test]
    fn missing_required_fields_are_invalid() {
        let cases = [
            (JobType::Harvest, json!({})),
            (JobType::Harvest, json!({ "query": "   " })),
            (JobType::Cluster, json!({ "article_ids": [] })),
            (JobType::Extract, json!({})),
            (JobType::Synthesize, json!(null)),
            (JobType::Expand, json!({ "seed_articles": [] })),
        ];
        for (job_type, params) in cases {
            let err = StageParams::parse(job_type, &params).unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidParams { job_type: t, .. } if t == job_type),
                "{job_type} accepted {params}"
            );
        }
    }

    #[test]
    fn wrong_shape_is_invalid() {
        let err =
            StageParams::parse(JobType::Cluster, &json!({ "article_ids": "a1" })).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParams { .. }));
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let parsed =
            StageParams::parse(JobType::Cluster, &json!({ "article_ids": [12, "a7"] })).unwrap();
        let StageParams::Cluster(p) = parsed else {
            panic!("expected cluster params");
        };
        assert_eq!(p.article_ids, vec![ArticleId::new("12"), ArticleId::new("a7")]);
    }

    #[test]
    fn result_shape_carries_stage_tag() {
        let result = StageResult::Harvest {
            papers_found: 3,
            query: "CRISPR".into(),
            candidates: vec![],
        };
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(encoded, json!({ "stage": "harvest", "papers_found": 3, "query": "CRISPR" }));
        assert_eq!(result.job_type(), JobType::Harvest);
    }
}
