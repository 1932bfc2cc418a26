#![allow(clippy::disallowed_methods)]

use std::sync::Arc;

use pipeline_core::{
    ArticleId, ArticleRecord, ClusterId, EffectDirection, Finding, InMemoryLibrary, JobId,
    PipelineError, StageParams, StageResult, StaticCredentials, TriageConfig,
};
use serde_json::json;
use stages::{StageDeps, stage_table};

fn library() -> InMemoryLibrary {
    let library = InMemoryLibrary::new();
    let articles = [
        ArticleRecord::new("a1", "CRISPR base editing in liver")
            .with_abstract("CRISPR base editing of liver hepatocytes lowered cholesterol in primates over twelve months.")
            .with_full_text("Results\nEditing significantly reduced LDL cholesterol. The reduction was mediated by PCSK9 knockdown.\n")
            .with_related(["a2", "a3", "a4"]),
        ArticleRecord::new("a2", "Songbird migration")
            .with_abstract("Urban heat islands alter the migratory timing of songbirds across northern Europe.")
            .with_related(["a1", "a4"]),
        ArticleRecord::new("a3", "Short note").with_abstract("Brief."),
        ArticleRecord::new("a4", "CRISPR delivery to liver")
            .with_abstract("Lipid nanoparticles deliver CRISPR editors to the liver with high efficiency in mice."),
    ];
    for article in articles {
        library.add_article(article).unwrap();
    }
    library
}

fn deps(library: InMemoryLibrary) -> StageDeps {
    StageDeps::new(Arc::new(library)).with_credentials(Arc::new(
        StaticCredentials::new().with("u1", "semantic_scholar", "s2-0123456789abcdef"),
    ))
}

async fn run(
    table: &pipeline_core::StageTable,
    job_type: &str,
    params: serde_json::Value,
) -> Result<StageResult, PipelineError> {
    let params = StageParams::parse(job_type.parse()?, &params)?;
    table.dispatch(JobId::new(), &params).await
}

#[tokio::test]
async fn harvest_echoes_query_and_counts_papers() {
    let table = stage_table(deps(library()));

    let result = run(&table, "L0_harvest", json!({ "query": "CRISPR", "user_id": "u1" }))
        .await
        .unwrap();
    let StageResult::Harvest { papers_found, query, candidates } = result else {
        panic!("expected harvest result");
    };
    assert_eq!(query, "CRISPR");
    assert_eq!(papers_found, 2);
    assert_eq!(candidates, vec![ArticleId::new("a1"), ArticleId::new("a4")]);

    let value = serde_json::to_value(StageResult::Harvest {
        papers_found,
        query,
        candidates: vec![],
    })
    .unwrap();
    assert!(value["papers_found"].as_u64().is_some());
    assert_eq!(value["query"], "CRISPR");
}

#[tokio::test]
async fn triage_records_every_decision() {
    let table = stage_table(deps(library()));

    let result = run(
        &table,
        "L1_cluster",
        json!({ "article_ids": ["a1", "a2", "a3", "missing"], "query_terms": ["crispr", "liver"] }),
    )
    .await
    .unwrap();
    let StageResult::Cluster { total, kept, dropped, recall_estimate, decisions } = result else {
        panic!("expected cluster result");
    };

    assert_eq!(total, 4);
    assert_eq!(decisions.len(), 4);
    assert_eq!(kept + dropped, total);
    assert!(decisions.iter().all(|d| !d.rationale.is_empty()));

    let by_id = |id: &str| decisions.iter().find(|d| d.article_id.as_str() == id).unwrap();
    assert!(by_id("a1").keep);
    assert!(!by_id("a2").keep);
    // Too short to judge, so kept.
    assert!(by_id("a3").keep);
    assert!(by_id("missing").keep);
    assert_eq!(dropped, 1);
    assert!((recall_estimate - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn triage_threshold_comes_from_config() {
    let strict = deps(library()).with_triage(TriageConfig::default().with_threshold(0.99));
    let table = stage_table(strict);

    let params = json!({ "article_ids": ["a1"], "query_terms": ["crispr", "liver"] });
    let result = run(&table, "L1_cluster", params).await.unwrap();
    let StageResult::Cluster { kept, .. } = result else {
        panic!("expected cluster result");
    };
    assert_eq!(kept, 0);
}

#[tokio::test]
async fn extraction_needs_stored_text() {
    let table = stage_table(deps(library()));

    let result = run(&table, "L2_extract", json!({ "article_id": "a1" })).await.unwrap();
    assert_eq!(
        result,
        StageResult::Extract {
            article_id: ArticleId::new("a1"),
            findings_extracted: 1,
            mechanisms_identified: 1,
        }
    );

    let err = run(&table, "L2_extract", json!({ "article_id": "a2" })).await.unwrap_err();
    assert!(matches!(err, PipelineError::HandlerExecution(msg) if msg.contains("a2")));
}

#[tokio::test]
async fn synthesis_requires_agreeing_sources() {
    let library = library();
    let agree = ClusterId::new("c-agree");
    let single = ClusterId::new("c-single");
    let finding = |article: &str, direction| Finding {
        article_id: ArticleId::new(article),
        claim: "lowers LDL".into(),
        direction,
        confidence: 0.8,
    };
    library
        .add_findings(
            agree.clone(),
            vec![
                finding("a1", EffectDirection::Negative),
                finding("a4", EffectDirection::Negative),
            ],
        )
        .unwrap();
    library
        .add_findings(
            single.clone(),
            vec![
                finding("a1", EffectDirection::Negative),
                finding("a1", EffectDirection::Negative),
            ],
        )
        .unwrap();
    let table = stage_table(deps(library));

    let result = run(&table, "L3_synthesize", json!({ "cluster_id": "c-agree" })).await.unwrap();
    let StageResult::Synthesize {
        rule_generated,
        confidence,
        triangulation_score,
        ..
    } = result
    else {
        panic!("expected synthesize result");
    };
    assert!(rule_generated);
    assert!((confidence - 0.8).abs() < 1e-9);
    assert!((triangulation_score - 1.0).abs() < 1e-9);

    let result = run(&table, "L3_synthesize", json!({ "cluster_id": "c-single" })).await.unwrap();
    assert!(matches!(result, StageResult::Synthesize { rule_generated: false, .. }));
}

#[tokio::test]
async fn expansion_excludes_seeds_and_duplicates() {
    let table = stage_table(deps(library()));

    let result = run(&table, "L4_expand", json!({ "seed_articles": ["a1", "a2"] })).await.unwrap();
    assert_eq!(
        result,
        StageResult::Expand {
            new_candidates: 2,
            candidates: vec![ArticleId::new("a3"), ArticleId::new("a4")],
        }
    );
}
