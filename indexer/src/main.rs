use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_core::collection::{VectorDb, DEFAULT_COLLECTION};
use rag_core::persist::DEFAULT_CORPUS_FILE;
use rag_core::refresh::{earliest, parse_marker, DEFAULT_MARKER_FILE};
use rag_core::report::{render_results, render_statistics};
use rag_core::{filter, rank, summarize, AppendMode, Corpus, CorpusStore, DateRange, FilterSpec, OfferMetadata, RankedResult, Record, RefreshMarker, Statistics, WhereFilter};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One embedded chunk as produced upstream.
#[derive(Debug, Deserialize)]
struct InputChunk {
    embedding: Vec<f32>,
    metadata: serde_json::Value,
    content: String,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Ingest embedded job-offer chunks and query them with structured filters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append new chunks from JSON/JSONL files or a directory to the corpus
    Ingest {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Corpus file
        #[arg(long, default_value = DEFAULT_CORPUS_FILE)]
        corpus: String,
        /// Refresh marker file
        #[arg(long, default_value = DEFAULT_MARKER_FILE)]
        marker: String,
        /// Ignore the refresh marker and ingest every chunk
        #[arg(long, default_value_t = false)]
        full: bool,
        /// Fail instead of creating the corpus when it does not exist
        #[arg(long, default_value_t = false)]
        require_existing: bool,
        /// Also add the new chunks to a collection in this vector database directory
        #[arg(long)]
        collection_dir: Option<String>,
        #[arg(long, default_value = DEFAULT_COLLECTION)]
        collection: String,
    },
    /// Rank corpus records against a query embedding
    Query {
        #[arg(long, default_value = DEFAULT_CORPUS_FILE)]
        corpus: String,
        /// JSON file holding the query embedding as an array of numbers
        #[arg(long)]
        vector: String,
        /// JSON file holding a filter specification
        #[arg(long, conflicts_with = "collection_dir")]
        filters: Option<String>,
        /// Parsed start date lower bound (YYYY-MM-DD)
        #[arg(long, conflicts_with = "collection_dir")]
        start_date_min: Option<String>,
        /// Parsed start date upper bound (YYYY-MM-DD)
        #[arg(long, conflicts_with = "collection_dir")]
        start_date_max: Option<String>,
        #[arg(long, default_value_t = 10)]
        top_n: usize,
        /// Query a vector database collection instead of the corpus file
        #[arg(long)]
        collection_dir: Option<String>,
        #[arg(long, default_value = DEFAULT_COLLECTION)]
        collection: String,
        /// JSON file holding a collection where clause
        #[arg(long, requires = "collection_dir")]
        where_file: Option<String>,
        /// Show chunk type and id for each result
        #[arg(long, default_value_t = false)]
        detailed: bool,
        /// Print results and statistics as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print corpus size and dimension
    Stats {
        #[arg(long, default_value = DEFAULT_CORPUS_FILE)]
        corpus: String,
    },
    /// Inspect or update the refresh marker
    Refresh {
        #[command(subcommand)]
        action: RefreshAction,
        #[arg(long, default_value = DEFAULT_MARKER_FILE, global = true)]
        marker: String,
    },
}

#[derive(Subcommand)]
enum RefreshAction {
    Show,
    Touch,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { input, corpus, marker, full, require_existing, collection_dir, collection } => {
            let mode = if require_existing { AppendMode::RequireExisting } else { AppendMode::CreateIfMissing };
            ingest(&input, &corpus, &marker, full, mode, collection_dir.as_deref().map(|dir| (dir, collection.as_str())))
        }
        Commands::Query { corpus, vector, filters, start_date_min, start_date_max, top_n, collection_dir, collection, where_file, detailed, json } => {
            let query: Vec<f32> = read_json(&vector)?;
            let results = match collection_dir {
                Some(dir) => {
                    let db = VectorDb::open(&dir)?;
                    let col = db.existing_collection(&collection)?;
                    let clause = where_file.map(|p| read_json::<serde_json::Value>(&p).and_then(|v| Ok(WhereFilter::from_json(&v)?))).transpose()?;
                    col.query(&query, top_n, clause.as_ref())?
                }
                None => {
                    let spec = match filters {
                        Some(p) => FilterSpec::from_json(&read_json::<serde_json::Value>(&p)?)?,
                        None => FilterSpec::default(),
                    };
                    let range = DateRange::parse(start_date_min.as_deref(), start_date_max.as_deref())?;
                    let corpus = CorpusStore::new(&corpus).load_or_empty()?;
                    let view = filter(&corpus, &spec).within_dates(&range);
                    println!("Candidates after filtering: {}/{}", view.len(), corpus.len());
                    rank(&query, &view, top_n)?
                }
            };
            let stats = summarize(&results);
            if json {
                println!("{}", query_json(&results, stats.as_ref())?);
            } else if results.is_empty() {
                println!("No results. Try less restrictive criteria.");
            } else {
                print!("{}", render_results(&results, detailed));
                if let Some(stats) = stats {
                    print!("{}", render_statistics(&stats));
                }
            }
            Ok(())
        }
        Commands::Stats { corpus } => {
            let corpus = CorpusStore::new(&corpus).load()?;
            println!("records: {}", corpus.len());
            println!("dimension: {}", corpus.dimension().map_or_else(|| "-".to_string(), |d| d.to_string()));
            Ok(())
        }
        Commands::Refresh { action, marker } => {
            let marker = RefreshMarker::new(&marker);
            match action {
                RefreshAction::Show => println!("{}", rag_core::refresh::format_marker(marker.last_refresh())),
                RefreshAction::Touch => println!("{}", rag_core::refresh::format_marker(marker.mark_refreshed()?)),
            }
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    results: &'a [RankedResult],
    statistics: Option<&'a Statistics>,
}

// frequency tables must keep ranking order; a serde_json::Value would re-sort them by key
fn query_json(results: &[RankedResult], statistics: Option<&Statistics>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&QueryOutput { results, statistics })?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let f = File::open(path).with_context(|| format!("opening {path}"))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {path}"))
}

fn ingest(input: &str, corpus: &str, marker: &str, full: bool, mode: AppendMode, collection: Option<(&str, &str)>) -> Result<()> {
    let marker = RefreshMarker::new(marker);
    let since = if full { earliest() } else { marker.last_refresh() };

    let mut chunks: Vec<InputChunk> = Vec::new();
    for file in input_files(Path::new(input)) {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut chunks)?;
        } else {
            read_json_file(&file, &mut chunks)?;
        }
    }
    let total = chunks.len();
    let records = select_new(chunks, since)?;
    tracing::info!(total, new = records.len(), "read input chunks");

    if records.is_empty() {
        tracing::info!("no new chunks since last refresh");
    } else {
        let new = Corpus::from_records(records.clone())?;
        // the collection is opened and checked first so a failure leaves the corpus untouched
        let target = match collection {
            Some((dir, name)) => {
                let db = VectorDb::open(dir)?;
                let col = db.collection(name)?;
                col.check_compatible(&new)?;
                Some((db, col))
            }
            None => None,
        };
        let grown = CorpusStore::new(corpus).append(records, mode)?;
        tracing::info!(corpus, records = grown.len(), "corpus updated");
        if let Some((db, col)) = target {
            col.add(&new)?;
            db.flush()?;
        }
    }
    marker.mark_refreshed()?;
    Ok(())
}

fn input_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn read_jsonl(file: &Path, out: &mut Vec<InputChunk>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let chunk = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?;
        out.push(chunk);
    }
    Ok(())
}

fn read_json_file(file: &Path, out: &mut Vec<InputChunk>) -> Result<()> {
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(file)?)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                out.push(serde_json::from_value(v).with_context(|| format!("{}", file.display()))?);
            }
        }
        serde_json::Value::Object(_) => out.push(serde_json::from_value(json)?),
        _ => tracing::warn!(file = %file.display(), "skipping file that is neither an object nor an array"),
    }
    Ok(())
}

/// Keeps chunks updated after `since`. Chunks without a usable timestamp are treated as new.
fn select_new(chunks: Vec<InputChunk>, since: PrimitiveDateTime) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for chunk in chunks {
        let is_new = match chunk.updated_at.as_deref() {
            None => true,
            Some(raw) => match parse_updated_at(raw) {
                Some(ts) => ts > since,
                None => {
                    tracing::warn!(updated_at = raw, "unparsable updated_at, ingesting chunk");
                    true
                }
            },
        };
        if is_new {
            records.push(Record { embedding: chunk.embedding, metadata: OfferMetadata::from_json(&chunk.metadata)?, content: chunk.content });
        }
    }
    Ok(records)
}

// Offsets are normalized to UTC to compare with the marker.
fn parse_updated_at(raw: &str) -> Option<PrimitiveDateTime> {
    parse_marker(raw).or_else(|| {
        OffsetDateTime::parse(raw, &Rfc3339).ok().map(|t| {
            let utc = t.to_offset(UtcOffset::UTC);
            PrimitiveDateTime::new(utc.date(), utc.time())
        })
    })
}
