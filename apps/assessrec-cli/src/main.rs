//! assessrec - build, query and evaluate the assessment recommender.

mod cli;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use assessrec_core::catalog::load_catalog;
use assessrec_core::config::{expand_path, Config, Settings};
use assessrec_embed::{get_default_embedder, EmbedderFactory};
use assessrec_index::VectorIndex;
use assessrec_pipeline::evaluate::{compare, evaluate, load_labeled_queries};
use assessrec_pipeline::predict::{load_prediction_queries, predict, write_csv};
use assessrec_pipeline::RecommendationPipeline;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Config::load().and_then(|c| c.settings()).map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let index_dir = cli.index.clone().unwrap_or_else(|| expand_path(&settings.data.index_dir));

    match cli.command {
        Commands::Build { catalog } => build(&settings, catalog, &index_dir),
        Commands::Recommend { query, top_k, top_n, no_rerank } => {
            let index = open_index(&settings, &index_dir, true)?;
            let pipeline = if no_rerank {
                RecommendationPipeline::retrieval_only(index).with_defaults(settings.retrieval.top_k_retrieval, settings.retrieval.top_n_final)
            } else {
                RecommendationPipeline::from_settings(index, &settings)?
            };
            let rec = pipeline.retrieve_scored(&query, top_k, top_n)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&rec.records())?);
                return Ok(());
            }
            println!("🔍 {} recommendations for: \"{}\" (rerank: {:?})", rec.candidates.len(), query, rec.outcome);
            for (i, c) in rec.candidates.iter().enumerate() {
                let duration = c.record.duration_minutes.map_or_else(|| "N/A".to_string(), |d| format!("{d} min"));
                println!("\n  {}. {}  score={:.4}", i + 1, c.record.name, c.score);
                println!("     Type: {}  Duration: {}  Remote: {}  Adaptive: {}", c.record.codes_joined(", "), duration, c.record.remote.as_str(), c.record.adaptive.as_str());
                println!("     🔗 {}", c.record.id);
            }
            Ok(())
        }
        Commands::Evaluate { train, k, out } => {
            let index = open_index(&settings, &index_dir, true)?;
            let path = train.unwrap_or_else(|| expand_path(&settings.data.train_path));
            let dataset = load_labeled_queries(&path)?;
            let baseline = evaluate(&RecommendationPipeline::retrieval_only(index.clone()), &dataset, k)?;
            let improved = evaluate(&RecommendationPipeline::from_settings(index, &settings)?, &dataset, k)?;
            let cmp = compare(baseline, improved);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&cmp)?);
            } else {
                println!("📊 Evaluated {} queries", cmp.baseline.num_queries);
                println!("Baseline Recall@{}:  {:.4}", k, cmp.baseline.mean_recall);
                println!("Improved Recall@{}:  {:.4}", k, cmp.improved.mean_recall);
                println!("Improvement:         {:+.2}%", cmp.improvement_percent);
            }
            if let Some(out) = out {
                std::fs::write(&out, serde_json::to_vec_pretty(&cmp)?)?;
                println!("✅ Results saved to {}", out.display());
            }
            Ok(())
        }
        Commands::Stats => {
            let index = open_index(&settings, &index_dir, false)?;
            let stats = index.stats();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("📊 Index: {}", index_dir.display());
                println!("  ready: {}", stats.ready);
                println!("  total assessments: {}", stats.total_assessments);
                println!("  embedding dim: {}", stats.dim);
                if let Some(spec) = &stats.embedder { println!("  embedder: {}", spec.id()); }
                if let Some(at) = stats.built_at { println!("  built at: {}", at.to_rfc3339()); }
            }
            Ok(())
        }
        Commands::Predict { queries, out, top_n } => {
            let index = open_index(&settings, &index_dir, true)?;
            let pipeline = RecommendationPipeline::from_settings(index, &settings)?;
            let queries = load_prediction_queries(&queries)?;
            let rows = predict(&pipeline, &queries, top_n)?;
            write_csv(std::io::BufWriter::new(std::fs::File::create(&out)?), &rows)?;
            println!("✅ Saved {} predictions for {} queries to {}", rows.len(), queries.len(), out.display());
            Ok(())
        }
    }
}

fn build(settings: &Settings, catalog: Option<PathBuf>, index_dir: &Path) -> Result<()> {
    let catalog_path = catalog.unwrap_or_else(|| expand_path(&settings.data.catalog_path));
    println!("Assessment Index Builder\n========================");
    println!("Catalog: {}", catalog_path.display());
    let records = load_catalog(&catalog_path)?;
    let embedder = Arc::new(get_default_embedder(settings)?);
    println!("Embedder: {}", embedder.spec().id());

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} assessments ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let count = records.len();
    let index = VectorIndex::build_with_progress(records, embedder, &pb)?;
    let manifest = tokio::runtime::Runtime::new()?.block_on(index.save(index_dir))?;
    println!("\n✅ Indexed {} assessments into {}", count, index_dir.display());
    println!("📊 Fingerprint: {}", manifest.catalog_fingerprint);
    Ok(())
}

/// Load the bundle inside a short-lived runtime, then create the query
/// embedder outside it: the remote backend uses a blocking HTTP client.
fn open_index(settings: &Settings, index_dir: &Path, with_embedder: bool) -> Result<Arc<VectorIndex>> {
    let factory = EmbedderFactory::from_settings(settings);
    let index = tokio::runtime::Runtime::new()?.block_on(VectorIndex::load_with_factory(index_dir, true, factory))?;
    if with_embedder { index.embedder()?; }
    Ok(Arc::new(index))
}
