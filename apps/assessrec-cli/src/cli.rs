use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// assessrec - recommend assessments for a job description
#[derive(Parser, Debug)]
#[command(name = "assessrec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Index bundle directory (defaults to `data.index_dir`)
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed a catalog and write an index bundle
    Build {
        /// Catalog JSON (defaults to `data.catalog_path`)
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },

    /// Recommend assessments for a query
    Recommend {
        /// Job description or free-text requirement
        query: String,

        /// Candidates retrieved before reranking
        #[arg(long)]
        top_k: Option<usize>,

        /// Recommendations returned
        #[arg(long)]
        top_n: Option<usize>,

        /// Skip reranking regardless of configuration
        #[arg(long)]
        no_rerank: bool,
    },

    /// Recall@K of retrieval-only vs the configured reranker
    Evaluate {
        /// Labeled queries (defaults to `data.train_path`)
        #[arg(short, long)]
        train: Option<PathBuf>,

        #[arg(short, default_value_t = 10)]
        k: usize,

        /// Write the comparison as JSON here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Index size and embedder identity
    Stats,

    /// Write `query,assessment_url` predictions for a list of queries
    Predict {
        /// JSON array of queries (`{"query": ...}` or strings)
        #[arg(short, long)]
        queries: PathBuf,

        /// CSV output file
        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, default_value_t = 10)]
        top_n: usize,
    },
}
