//! On-disk index bundle.
//!
//! A bundle directory holds:
//! - `manifest.json`: format version, embedder spec, dimension, record count,
//!   blake3 fingerprint of the records, build timestamp
//! - `lance/`: a LanceDB dataset with one `assessments` row per record
//!   (metadata columns + fixed-size `vector`)
//!
//! The manifest is written last, so an interrupted save never looks loadable.

use anyhow::{Context, anyhow};
use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assessrec_core::error::{Error, Result};
use assessrec_core::types::{AssessmentRecord, CategoryCode, EmbedderSpec, EmbeddingVector, TriState};

use crate::schema::*;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const LANCE_DIR: &str = "lance";
pub const RECORDS_TABLE: &str = "assessments";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: u32,
    pub embedder: EmbedderSpec,
    pub dim: usize,
    pub record_count: usize,
    pub catalog_fingerprint: String,
    pub built_at: DateTime<Utc>,
}

/// Records and vectors read back from a bundle, in catalog order.
pub struct BundleContents {
    pub manifest: BundleManifest,
    pub records: Vec<AssessmentRecord>,
    pub vectors: Vec<EmbeddingVector>,
}

/// blake3 over the serialized records; detects metadata that does not belong
/// to the stored vectors.
pub fn catalog_fingerprint(records: &[AssessmentRecord]) -> String {
    let mut hasher = blake3::Hasher::new();
    for rec in records {
        // AssessmentRecord serialization cannot fail: plain strings, ints and enums.
        let bytes = serde_json::to_vec(rec).unwrap_or_default();
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    hasher.finalize().to_hex().to_string()
}

fn lance_uri(dir: &Path) -> PathBuf { dir.join(LANCE_DIR) }

fn mismatch(msg: impl Into<String>) -> Error { Error::PersistenceFormatMismatch(msg.into()) }

pub async fn write_bundle(
    dir: &Path,
    records: &[AssessmentRecord],
    vectors: &[EmbeddingVector],
    spec: &EmbedderSpec,
    built_at: DateTime<Utc>,
) -> Result<BundleManifest> {
    if records.len() != vectors.len() {
        return Err(anyhow!("{} records but {} vectors", records.len(), vectors.len()).into());
    }
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    // Never leave a manifest that describes the previous contents.
    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.exists() { std::fs::remove_file(&manifest_path).context("removing stale manifest")?; }
    let lance_dir = lance_uri(dir);
    if lance_dir.exists() { std::fs::remove_dir_all(&lance_dir).context("removing stale lance dataset")?; }

    let db = connect(lance_dir.to_string_lossy().as_ref()).execute().await.context("opening lance dataset")?;
    write_records_table(&db, records, vectors, spec.dim).await?;

    let manifest = BundleManifest {
        format_version: FORMAT_VERSION,
        embedder: spec.clone(),
        dim: spec.dim,
        record_count: records.len(),
        catalog_fingerprint: catalog_fingerprint(records),
        built_at,
    };
    let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
    std::fs::write(&tmp, serde_json::to_vec_pretty(&manifest).context("serializing manifest")?).context("writing manifest")?;
    std::fs::rename(&tmp, &manifest_path).context("publishing manifest")?;
    tracing::info!(dir = %dir.display(), records = records.len(), embedder = %spec.id(), "index bundle saved");
    Ok(manifest)
}

async fn write_records_table(db: &Connection, records: &[AssessmentRecord], vectors: &[EmbeddingVector], dim: usize) -> Result<()> {
    let dim = i32::try_from(dim).map_err(|_| anyhow!("embedding dim {} does not fit the vector column", dim))?;
    let schema = build_assessment_schema(dim);
    if records.is_empty() {
        let empty: Vec<std::result::Result<RecordBatch, arrow_schema::ArrowError>> = Vec::new();
        let iter = RecordBatchIterator::new(empty.into_iter(), schema.clone());
        db.create_table(RECORDS_TABLE, Box::new(iter)).execute().await.context("creating empty table")?;
        return Ok(());
    }
    let batch = records_to_batch(records, vectors, dim, schema.clone())?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    db.create_table(RECORDS_TABLE, reader).execute().await.context("creating assessments table")?;
    Ok(())
}

fn records_to_batch(records: &[AssessmentRecord], vectors: &[EmbeddingVector], dim: i32, schema: Arc<arrow_schema::Schema>) -> Result<RecordBatch> {
    let mut ids = Vec::new(); let mut names = Vec::new(); let mut descriptions = Vec::new(); let mut test_types = Vec::new();
    let mut durations: Vec<Option<i32>> = Vec::new(); let mut adaptive = Vec::new(); let mut remote = Vec::new(); let mut positions = Vec::new();
    let mut vector_rows: Vec<Option<Vec<Option<f32>>>> = Vec::new();
    for (i, (rec, vec)) in records.iter().zip(vectors).enumerate() {
        ids.push(rec.id.clone()); names.push(rec.name.clone()); descriptions.push(rec.description.clone());
        test_types.push(rec.codes_joined(","));
        durations.push(rec.duration_minutes.and_then(|d| i32::try_from(d).ok()));
        adaptive.push(rec.adaptive.as_str().to_string()); remote.push(rec.remote.as_str().to_string());
        positions.push(i32::try_from(i).map_err(|_| anyhow!("catalog too large"))?);
        vector_rows.push(Some(vec.as_slice().iter().copied().map(Some).collect()));
    }
    let batch = RecordBatch::try_new(schema, vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(names)),
        Arc::new(StringArray::from(descriptions)),
        Arc::new(StringArray::from(test_types)),
        Arc::new(Int32Array::from(durations)),
        Arc::new(StringArray::from(adaptive)),
        Arc::new(StringArray::from(remote)),
        Arc::new(Int32Array::from(positions)),
        Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vector_rows.into_iter(), dim)),
    ]).context("building record batch")?;
    Ok(batch)
}

pub fn read_manifest(dir: &Path) -> Result<BundleManifest> {
    let path = dir.join(MANIFEST_FILE);
    let raw = std::fs::read(&path).map_err(|_| mismatch(format!("{} is missing", path.display())))?;
    let manifest: BundleManifest = serde_json::from_slice(&raw).map_err(|e| mismatch(format!("unreadable manifest: {e}")))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(mismatch(format!("bundle format {} (expected {})", manifest.format_version, FORMAT_VERSION)));
    }
    if manifest.dim != manifest.embedder.dim {
        return Err(mismatch(format!("manifest dim {} disagrees with embedder dim {}", manifest.dim, manifest.embedder.dim)));
    }
    Ok(manifest)
}

pub async fn read_bundle(dir: &Path) -> Result<BundleContents> {
    let manifest = read_manifest(dir)?;
    let lance_dir = lance_uri(dir);
    if !lance_dir.exists() { return Err(mismatch(format!("{} is missing", lance_dir.display()))); }
    let db = connect(lance_dir.to_string_lossy().as_ref()).execute().await.context("opening lance dataset")?;
    let names = db.table_names().execute().await.context("listing tables")?;
    if !names.iter().any(|n| n == RECORDS_TABLE) { return Err(mismatch(format!("table '{RECORDS_TABLE}' is missing"))); }

    let table = db.open_table(RECORDS_TABLE).execute().await.context("opening assessments table")?;
    let mut stream = table.query().limit(manifest.record_count.max(1)).execute().await.context("scanning assessments")?;
    let mut rows: Vec<(i32, AssessmentRecord, EmbeddingVector)> = Vec::with_capacity(manifest.record_count);
    while let Some(batch) = stream.try_next().await.context("reading assessments")? {
        read_batch(&batch, manifest.dim, &mut rows)?;
    }

    if rows.len() != manifest.record_count {
        return Err(mismatch(format!("manifest lists {} records, table holds {}", manifest.record_count, rows.len())));
    }
    rows.sort_by_key(|(pos, _, _)| *pos);
    if rows.iter().enumerate().any(|(i, (pos, _, _))| usize::try_from(*pos).ok() != Some(i)) {
        return Err(mismatch("record positions are not a contiguous catalog order"));
    }
    let (records, vectors): (Vec<_>, Vec<_>) = rows.into_iter().map(|(_, r, v)| (r, v)).unzip();
    if catalog_fingerprint(&records) != manifest.catalog_fingerprint {
        return Err(mismatch("record metadata does not match the manifest fingerprint"));
    }
    Ok(BundleContents { manifest, records, vectors })
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| mismatch(format!("column '{name}' missing or mistyped")))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Int32Array>()).ok_or_else(|| mismatch(format!("column '{name}' missing or mistyped")))
}

fn read_batch(batch: &RecordBatch, dim: usize, out: &mut Vec<(i32, AssessmentRecord, EmbeddingVector)>) -> Result<()> {
    let ids = string_col(batch, COL_ID)?;
    let names = string_col(batch, COL_NAME)?;
    let descriptions = string_col(batch, COL_DESCRIPTION)?;
    let test_types = string_col(batch, COL_TEST_TYPE)?;
    let durations = int_col(batch, COL_DURATION)?;
    let adaptive = string_col(batch, COL_ADAPTIVE)?;
    let remote = string_col(batch, COL_REMOTE)?;
    let positions = int_col(batch, COL_POSITION)?;
    let vecs = batch
        .column_by_name(COL_VECTOR)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| mismatch("column 'vector' missing or mistyped"))?;
    if usize::try_from(vecs.value_length()).ok() != Some(dim) {
        return Err(mismatch(format!("stored vectors have dim {}, manifest says {}", vecs.value_length(), dim)));
    }
    for i in 0..batch.num_rows() {
        if vecs.is_null(i) { return Err(mismatch(format!("row {} has no vector", ids.value(i)))); }
        let list = vecs.value(i);
        let values = list.as_primitive::<arrow_array::types::Float32Type>().values().to_vec();
        if values.iter().any(|x| !x.is_finite()) {
            return Err(mismatch(format!("row {} has non-finite vector values", ids.value(i))));
        }
        let category_codes = test_types
            .value(i)
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<CategoryCode>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(mismatch)?;
        let record = AssessmentRecord {
            id: ids.value(i).to_string(),
            name: names.value(i).to_string(),
            description: descriptions.value(i).to_string(),
            category_codes,
            duration_minutes: if durations.is_null(i) { None } else { u32::try_from(durations.value(i)).ok() },
            adaptive: TriState::parse_lenient(adaptive.value(i)),
            remote: TriState::parse_lenient(remote.value(i)),
        };
        out.push((positions.value(i), record, EmbeddingVector::from_normalized(values)));
    }
    Ok(())
}
