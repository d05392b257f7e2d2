use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assessrec_core::error::Error;
use assessrec_core::types::{AssessmentRecord, CategoryCode, EmbedderSpec, EmbeddingVector, TriState};
use assessrec_embed::TextEmbedder;
use assessrec_index::bundle::{MANIFEST_FILE, LANCE_DIR};
use assessrec_index::{EmbedderLoader, IndexSnapshot, VectorIndex};
use tempfile::TempDir;

fn catalog() -> Vec<AssessmentRecord> {
    let mut remote_java = AssessmentRecord::new("https://x/java", "Java 8 (New)", "Multiple choice test of core Java")
        .with_categories([CategoryCode::Knowledge])
        .with_duration(18);
    remote_java.remote = TriState::Yes;
    vec![
        remote_java,
        AssessmentRecord::new("https://x/sql", "SQL Server", "Relational queries, joins and indexing").with_categories([CategoryCode::Knowledge]),
        AssessmentRecord::new("https://x/opq", "Occupational Personality Questionnaire", "Workplace behavioural styles")
            .with_categories([CategoryCode::Behavioral, CategoryCode::Situational]),
        AssessmentRecord::new("https://x/typing", "Data Entry", "Typing speed and accuracy").with_categories([CategoryCode::Performance]),
    ]
}

fn counting_loader(counter: Arc<AtomicUsize>) -> EmbedderLoader {
    Arc::new(move |spec: &EmbedderSpec| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(TextEmbedder::hashed(spec.dim))
    })
}

#[tokio::test]
async fn build_save_load_round_trip() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let built = VectorIndex::build(catalog(), Arc::new(TextEmbedder::hashed(128)))?;
    let manifest = built.save(tmp.path()).await?;
    assert_eq!(manifest.record_count, 4);
    assert!(tmp.path().join(MANIFEST_FILE).exists());

    let loaded = VectorIndex::load(tmp.path(), false).await?;
    assert_eq!(loaded.snapshot().map(|s| s.records().to_vec()), built.snapshot().map(|s| s.records().to_vec()));

    let before = built.search("java developer", 4)?;
    let after = loaded.search("java developer", 4)?;
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.record.id, b.record.id);
        assert!((a.score - b.score).abs() < 1e-5);
    }
    Ok(())
}

#[tokio::test]
async fn empty_catalog_round_trips() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let built = VectorIndex::build(Vec::new(), Arc::new(TextEmbedder::hashed(16)))?;
    built.save(tmp.path()).await?;
    let loaded = VectorIndex::load(tmp.path(), true).await?;
    assert!(loaded.is_ready());
    assert!(loaded.search("anything", 20)?.is_empty());
    Ok(())
}

#[tokio::test]
async fn lazy_embedder_is_created_once_under_concurrency() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    VectorIndex::build(catalog(), Arc::new(TextEmbedder::hashed(64)))?.save(tmp.path()).await?;

    let counter = Arc::new(AtomicUsize::new(0));
    let loaded = Arc::new(VectorIndex::load_with_loader(tmp.path(), true, counting_loader(counter.clone())).await?);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(!loaded.stats().embedder_loaded);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let idx = loaded.clone();
            std::thread::spawn(move || idx.search(if i % 2 == 0 { "java" } else { "personality" }, 3).map(|h| h.len()))
        })
        .collect();
    for h in handles {
        let n = h.join().map_err(|_| anyhow::anyhow!("search thread panicked"))??;
        assert_eq!(n, 3);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn eager_load_builds_embedder_up_front() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    VectorIndex::build(catalog(), Arc::new(TextEmbedder::hashed(32)))?.save(tmp.path()).await?;
    let counter = Arc::new(AtomicUsize::new(0));
    let loaded = VectorIndex::load_with_loader(tmp.path(), false, counting_loader(counter.clone())).await?;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    loaded.search("sql", 2)?;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn missing_manifest_is_a_format_mismatch() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    VectorIndex::build(catalog(), Arc::new(TextEmbedder::hashed(32)))?.save(tmp.path()).await?;
    std::fs::remove_file(tmp.path().join(MANIFEST_FILE))?;
    let err = VectorIndex::load(tmp.path(), true).await.unwrap_err();
    assert!(matches!(err, Error::PersistenceFormatMismatch(_)));
    assert!(err.is_setup_error());
    Ok(())
}

#[tokio::test]
async fn missing_dataset_is_a_format_mismatch() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    VectorIndex::build(catalog(), Arc::new(TextEmbedder::hashed(32)))?.save(tmp.path()).await?;
    std::fs::remove_dir_all(tmp.path().join(LANCE_DIR))?;
    let err = VectorIndex::load(tmp.path(), true).await.unwrap_err();
    assert!(matches!(err, Error::PersistenceFormatMismatch(_)));
    Ok(())
}

#[tokio::test]
async fn tampered_manifest_is_rejected() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    VectorIndex::build(catalog(), Arc::new(TextEmbedder::hashed(32)))?.save(tmp.path()).await?;
    let path = tmp.path().join(MANIFEST_FILE);
    let mut manifest: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    manifest["catalog_fingerprint"] = serde_json::Value::String("0".repeat(64));
    std::fs::write(&path, serde_json::to_vec(&manifest)?)?;
    let err = VectorIndex::load(tmp.path(), true).await.unwrap_err();
    assert!(matches!(err, Error::PersistenceFormatMismatch(_)));

    std::fs::write(&path, b"{not json")?;
    let err = VectorIndex::load(tmp.path(), true).await.unwrap_err();
    assert!(matches!(err, Error::PersistenceFormatMismatch(_)));
    Ok(())
}

#[tokio::test]
async fn non_finite_stored_vectors_are_rejected() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let spec = TextEmbedder::hashed(2).spec().clone();
    let records = vec![AssessmentRecord::new("https://x/a", "A", ""), AssessmentRecord::new("https://x/b", "B", "")];
    let vectors = vec![EmbeddingVector::from_normalized(vec![1.0, 0.0]), EmbeddingVector::from_normalized(vec![f32::NAN, 0.0])];
    let snap = IndexSnapshot::new(records, vectors, spec, chrono::Utc::now())?;
    VectorIndex::from_snapshot(snap, counting_loader(Arc::new(AtomicUsize::new(0)))).save(tmp.path()).await?;
    let err = VectorIndex::load(tmp.path(), true).await.unwrap_err();
    assert!(matches!(err, Error::PersistenceFormatMismatch(msg) if msg.contains("non-finite")));
    Ok(())
}

#[tokio::test]
async fn lazy_embedder_failure_degrades_to_no_matches() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    VectorIndex::build(catalog(), Arc::new(TextEmbedder::hashed(32)))?.save(tmp.path()).await?;
    let failing: EmbedderLoader = Arc::new(|_: &EmbedderSpec| Err(anyhow::anyhow!("no API key configured")));
    let loaded = VectorIndex::load_with_loader(tmp.path(), true, failing.clone()).await?;
    assert!(loaded.is_ready());
    assert!(loaded.search("java", 4)?.is_empty());

    let err = VectorIndex::load_with_loader(tmp.path(), false, failing).await.unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    Ok(())
}

#[test]
fn single_record_with_large_top_k() -> anyhow::Result<()> {
    let one = vec![AssessmentRecord::new("https://x/only", "Only", "The only assessment")];
    let idx = VectorIndex::build(one, Arc::new(TextEmbedder::hashed(32)))?;
    assert_eq!(idx.search("anything at all", 20)?.len(), 1);
    Ok(())
}

#[test]
fn search_never_returns_duplicates() -> anyhow::Result<()> {
    let idx = VectorIndex::build(catalog(), Arc::new(TextEmbedder::hashed(64)))?;
    let hits = idx.search("java sql personality typing", 10)?;
    let mut ids: Vec<_> = hits.iter().map(|h| h.record.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), hits.len());
    Ok(())
}
