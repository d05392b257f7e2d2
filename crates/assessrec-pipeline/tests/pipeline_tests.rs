use std::sync::Arc;

use assessrec_core::error::Error;
use assessrec_core::traits::TextGenerator;
use assessrec_core::types::{AssessmentRecord, CategoryCode, EmbedderSpec};
use assessrec_embed::TextEmbedder;
use assessrec_index::{EmbedderLoader, VectorIndex};
use assessrec_pipeline::evaluate::{compare, evaluate, LabeledQuery};
use assessrec_pipeline::predict::{predict, write_csv, PredictionQuery};
use assessrec_pipeline::RecommendationPipeline;
use assessrec_rerank::{GenerativeScorer, LexicalOverlapModel, PairwiseScorer, RerankOutcome};

fn record(id: &str, name: &str, desc: &str, code: CategoryCode, minutes: u32) -> AssessmentRecord {
    AssessmentRecord::new(format!("https://catalog.example/{id}"), name, desc).with_categories([code]).with_duration(minutes)
}

fn mixed_catalog() -> Vec<AssessmentRecord> {
    vec![
        record("opq", "Occupational Personality Questionnaire", "Personality at work", CategoryCode::Behavioral, 25),
        record("java", "Java Developer Coding", "Hands on Java coding simulation", CategoryCode::Performance, 40),
        record("motivation", "Motivation Questionnaire", "What drives the candidate", CategoryCode::Behavioral, 20),
        record("spring", "Spring Boot Project", "Build a Java web service", CategoryCode::Performance, 45),
        record("debug", "Java Debugging Exercise", "Find and fix defects", CategoryCode::Performance, 30),
    ]
}

fn index_over(records: Vec<AssessmentRecord>) -> Arc<VectorIndex> {
    Arc::new(VectorIndex::build(records, Arc::new(TextEmbedder::hashed(256))).unwrap())
}

fn ids(recs: &[AssessmentRecord]) -> Vec<&str> { recs.iter().map(|r| r.id.as_str()).collect() }

struct Unhelpful;

impl TextGenerator for Unhelpful {
    fn generate(&self, _prompt: &str) -> anyhow::Result<String> { Ok("These all look relevant to me.".to_string()) }
}

#[test]
fn balanced_output_puts_technical_first() {
    let pipeline = RecommendationPipeline::retrieval_only(index_over(mixed_catalog()));
    let recs = pipeline.retrieve("Java developer, 40 minutes", Some(5), Some(5)).unwrap();
    assert_eq!(recs.len(), 5);
    assert!(recs[..3].iter().all(AssessmentRecord::has_technical));
    assert!(recs[3..].iter().all(AssessmentRecord::has_behavioral));
}

#[test]
fn empty_catalog_returns_nothing() {
    let pipeline = RecommendationPipeline::retrieval_only(index_over(Vec::new()));
    assert!(pipeline.is_ready());
    assert!(pipeline.retrieve("anything", None, None).unwrap().is_empty());
}

#[test]
fn single_record_with_large_top_k() {
    let one = vec![record("only", "Only Test", "The only one", CategoryCode::Knowledge, 10)];
    let pipeline = RecommendationPipeline::retrieval_only(index_over(one));
    assert_eq!(pipeline.retrieve("query", Some(20), None).unwrap().len(), 1);
}

#[test]
fn unbuilt_index_reports_not_ready() {
    let pipeline = RecommendationPipeline::retrieval_only(Arc::new(VectorIndex::new()));
    assert!(!pipeline.health().ready);
    let err = pipeline.retrieve("java", None, None).unwrap_err();
    assert!(matches!(err, Error::IndexNotBuilt));
    assert!(err.to_string().contains("not ready"));
}

#[test]
fn blank_query_is_invalid_not_unready() {
    let pipeline = RecommendationPipeline::retrieval_only(index_over(mixed_catalog()));
    assert!(matches!(pipeline.retrieve("   ", None, None), Err(Error::InvalidQuery(_))));
}

#[test]
fn top_n_bounds_the_output() {
    let pipeline = RecommendationPipeline::retrieval_only(index_over(mixed_catalog())).with_defaults(5, 2);
    assert_eq!(pipeline.retrieve("java", None, None).unwrap().len(), 2);
    assert_eq!(pipeline.retrieve("java", None, Some(3)).unwrap().len(), 3);
}

#[test]
fn pairwise_rerank_reports_scored_outcome() {
    let scorer = Box::new(PairwiseScorer::with_model(LexicalOverlapModel));
    let pipeline = RecommendationPipeline::new(index_over(mixed_catalog()), scorer);
    let rec = pipeline.retrieve_scored("spring boot", Some(5), Some(3)).unwrap();
    assert_eq!(rec.outcome, RerankOutcome::Scored);
    assert_eq!(rec.candidates.len(), 3);
    assert_eq!(rec.records()[0].id, "https://catalog.example/spring");
}

#[test]
fn generative_fallback_is_visible_but_not_an_error() {
    let pipeline = RecommendationPipeline::new(index_over(mixed_catalog()), Box::new(GenerativeScorer::new(Unhelpful)));
    let rec = pipeline.retrieve_scored("java", Some(5), Some(5)).unwrap();
    assert!(matches!(rec.outcome, RerankOutcome::FellBack(_)));
    assert_eq!(rec.candidates.len(), 5);
    assert!(rec.scores().iter().all(|s| *s == 1.0));
}

#[test]
fn evaluation_and_predictions_run_end_to_end() {
    let index = index_over(mixed_catalog());
    let dataset = vec![
        LabeledQuery { query: "java coding".into(), relevant_assessments: vec!["https://catalog.example/java".into()] },
        LabeledQuery { query: "personality".into(), relevant_assessments: Vec::new() },
    ];
    let baseline = evaluate(&RecommendationPipeline::retrieval_only(index.clone()), &dataset, 10).unwrap();
    assert_eq!(baseline.num_queries, 2);
    // Whole catalog fits in k=10, so the labeled query is fully recalled.
    assert_eq!(baseline.individual_recalls(), vec![1.0, 0.0]);
    let reranked = RecommendationPipeline::new(index.clone(), Box::new(PairwiseScorer::with_model(LexicalOverlapModel)));
    let cmp = compare(baseline, evaluate(&reranked, &dataset, 10).unwrap());
    assert_eq!(cmp.improvement_percent, 0.0);

    let queries = vec![PredictionQuery { id: None, query: "java".into() }];
    let rows = predict(&RecommendationPipeline::retrieval_only(index), &queries, 2).unwrap();
    assert_eq!(rows.len(), 2);
    let mut buf = Vec::new();
    write_csv(&mut buf, &rows).unwrap();
    assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 3);
}

#[tokio::test]
async fn loaded_bundle_answers_like_the_built_index() {
    let tmp = tempfile::tempdir().unwrap();
    let built = index_over(mixed_catalog());
    built.save(tmp.path()).await.unwrap();
    let loaded = Arc::new(VectorIndex::load(tmp.path(), true).await.unwrap());

    let a = RecommendationPipeline::retrieval_only(built).retrieve("java web service", Some(5), Some(5)).unwrap();
    let b = RecommendationPipeline::retrieval_only(loaded).retrieve("java web service", Some(5), Some(5)).unwrap();
    assert_eq!(ids(&a), ids(&b));
}

#[tokio::test]
async fn missing_query_model_gives_an_empty_answer() {
    let tmp = tempfile::tempdir().unwrap();
    index_over(mixed_catalog()).save(tmp.path()).await.unwrap();
    let failing: EmbedderLoader = Arc::new(|_: &EmbedderSpec| Err(anyhow::anyhow!("model weights not found")));
    let lazy = Arc::new(VectorIndex::load_with_loader(tmp.path(), true, failing).await.unwrap());

    let pipeline = RecommendationPipeline::new(lazy, Box::new(PairwiseScorer::with_model(LexicalOverlapModel)));
    assert!(pipeline.health().ready);
    let rec = pipeline.retrieve_scored("java developer", None, None).unwrap();
    assert!(rec.candidates.is_empty());
    assert_eq!(rec.outcome, RerankOutcome::Skipped);
    assert!(!pipeline.health().embedder_loaded);
}
