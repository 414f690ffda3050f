use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rtsearch::query::MatchOperator;
use rtsearch::{Document, EngineConfig, IndexRegistry, SearchRequest};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rtsearch")]
#[command(about = "Real-time full-text search index", long_about = None)]
struct Args {
    /// Root directory holding one subdirectory per index
    #[arg(long, env = "RTSEARCH_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Index to operate on
    #[arg(long, env = "RTSEARCH_INDEX", default_value = "default")]
    index: String,

    /// JSON engine configuration applied to the index
    #[arg(long, env = "RTSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Field searched by unqualified query terms
    #[arg(long, env = "RTSEARCH_DEFAULT_FIELD")]
    default_field: Option<String>,

    /// Operator between query clauses (and, or)
    #[arg(long, env = "RTSEARCH_DEFAULT_OPERATOR")]
    default_operator: Option<MatchOperator>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index documents from a JSON lines file (or stdin)
    Index {
        /// One JSON document per line; reads stdin when omitted
        file: Option<PathBuf>,
    },
    /// Remove documents by key
    Remove {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Run a query and print the page as JSON
    Search {
        query: String,
        /// Sort by this sortable field instead of relevance
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value = "0")]
        offset: usize,
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Include stored payloads in the output
        #[arg(long)]
        payload: bool,
    },
    /// Rewrite the index, expunging deleted documents
    Optimize,
    /// Print engine statistics as JSON
    Stats,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut template = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(field) = &args.default_field {
        template = template.with_default_field(field.clone());
    }
    if let Some(operator) = args.default_operator {
        template = template.with_default_operator(operator);
    }

    info!("Starting rtsearch v{}", rtsearch::VERSION);
    let registry = IndexRegistry::with_template(&args.data_dir, template);
    let engine = registry
        .get_or_open(&args.index)
        .with_context(|| format!("opening index '{}'", args.index))?;

    match args.command {
        Command::Index { file } => {
            let reader: Box<dyn BufRead> = match &file {
                Some(path) => Box::new(BufReader::new(
                    File::open(path).with_context(|| format!("opening {}", path.display()))?,
                )),
                None => Box::new(BufReader::new(io::stdin())),
            };

            let mut docs = Vec::new();
            for (n, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let doc: Document = serde_json::from_str(&line)
                    .with_context(|| format!("parsing document on line {}", n + 1))?;
                docs.push(doc);
            }

            let result = engine.put_batch(docs);
            for (key, error) in &result.failed {
                warn!("Rejected document '{}': {}", key, error);
            }
            info!("Indexed {} documents, {} rejected", result.succeeded, result.failed.len());
        }
        Command::Remove { keys } => {
            let result = engine.remove_batch(&keys);
            for (key, error) in &result.failed {
                warn!("Failed to remove '{}': {}", key, error);
            }
            info!("Removed {} keys", result.succeeded);
        }
        Command::Search {
            query,
            sort,
            desc,
            offset,
            limit,
            payload,
        } => {
            let mut request = SearchRequest::new(query).with_offset(offset).with_limit(limit);
            if let Some(field) = sort {
                request = request.with_sort(field, desc);
            }
            if payload {
                request = request.with_payload();
            }
            let response = engine.search(&request)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Optimize => {
            engine.optimize()?;
            info!("Optimize requested for '{}'", args.index);
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats())?);
        }
    }

    // Compacts pending writes so they survive the process
    registry.shutdown_all()?;
    Ok(())
}
