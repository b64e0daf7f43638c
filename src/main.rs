//! # deals — hybrid deal search CLI
//!
//! Thin command-line front end over the dealfinder engine:
//!
//! - `deals search <query>` — rank deals for a free-text query
//! - `deals search --term milk --term juice` — merge externally expanded terms
//! - `deals embed` — force embedding cache recomputation
//! - `deals stats` — catalog and cache status

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use dealfinder::config::{load_config, Config};
use dealfinder::models::DealResult;
use dealfinder::search::SearchEngine;
use dealfinder::{cache, embedder, index::SearchIndex, loader};

#[derive(Parser)]
#[command(
    name = "deals",
    about = "Dealfinder — hybrid keyword + fuzzy + semantic search over grocery deals",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/deals.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the deal catalog
    Search {
        /// Search query
        query: Option<String>,

        /// Externally expanded query terms; repeat for multi-query mode
        #[arg(long = "term")]
        terms: Vec<String>,

        /// Maximum number of deals to return
        #[arg(long)]
        top_k: Option<usize>,

        /// Emit results in batches as the transport layer would
        #[arg(long)]
        stream: bool,

        /// Print results as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Recompute the embedding cache
    Embed,

    /// Show catalog and cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            terms,
            top_k,
            stream,
            json,
        } => run_search(&config, query, terms, top_k, stream, json).await,
        Commands::Embed => run_embed(&config).await,
        Commands::Stats => run_stats(&config),
    }
}

async fn run_search(
    config: &Config,
    query: Option<String>,
    terms: Vec<String>,
    top_k: Option<usize>,
    stream: bool,
    json: bool,
) -> Result<()> {
    if query.is_none() && terms.is_empty() {
        anyhow::bail!("Provide a query or at least one --term");
    }

    let engine = SearchEngine::from_config(config).await?;
    let top_k = top_k.unwrap_or_else(|| engine.top_k());

    if !terms.is_empty() {
        let results = engine.search_expanded(&terms, top_k).await;
        return print_results(&results, json);
    }

    let query = query.unwrap_or_default();

    if stream {
        let batches = engine.search_stream(&query, top_k).await;
        tokio::pin!(batches);
        let mut rank = 0usize;
        while let Some(batch) = batches.next().await {
            for result in &batch {
                rank += 1;
                print_result(rank, result);
            }
        }
        if rank == 0 {
            println!("No results.");
        }
        return Ok(());
    }

    let results = engine.search(&query, top_k).await;
    print_results(&results, json)
}

fn print_results(results: &[DealResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result);
    }
    Ok(())
}

fn print_result(rank: usize, result: &DealResult) {
    let offer = &result.offer;
    println!("{}. [{:.3}] {}", rank, result.score, offer.name);
    if !offer.offer_price.is_empty() {
        println!("    price: {}", offer.offer_price);
    }
    if let Some(ref program) = offer.program {
        println!("    program: {}", program.as_str());
    }
    if let (Some(start), Some(end)) = (offer.start_date, offer.end_date) {
        println!("    valid: {} to {}", format_date(start), format_date(end));
    }
    println!(
        "    scores: keyword {:.2} / fuzzy {:.2} / semantic {:.2}",
        result.components.keyword, result.components.fuzzy, result.components.semantic
    );
    for matched in result.matching_products.iter().take(3) {
        println!(
            "    - {} [{:.3}]",
            matched.product.name, matched.components.composite
        );
    }
    let remaining = result.matching_products.len().saturating_sub(3);
    if remaining > 0 {
        println!("    ... and {} more matching products", remaining);
    }
    println!("    id: {}", offer.offer_id);
    println!();
}

fn format_date(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

async fn run_embed(config: &Config) -> Result<()> {
    // Drop the existing cache so the build recomputes and rewrites it.
    match std::fs::remove_file(&config.embedding.cache_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let backend = embedder::from_config(&config.embedding)?;
    let index = SearchIndex::build(config, backend.as_ref()).await?;
    println!(
        "Embedded {} records ({} dims) into {}",
        index.record_count(),
        index.embeddings.dim(),
        config.embedding.cache_path.display()
    );
    Ok(())
}

fn run_stats(config: &Config) -> Result<()> {
    let catalog = loader::load_catalog(&config.data.deals_path, &config.data.products_path)?;

    let texts: Vec<String> = catalog
        .records
        .iter()
        .map(|r| r.embed_text.clone())
        .collect();
    let fp = cache::fingerprint(&texts);
    let cache_status = match cache::load(
        &config.embedding.cache_path,
        catalog.records.len(),
        config.embedding.dims,
        &fp,
    ) {
        Ok(_) => "fresh".to_string(),
        Err(err) => format!("unusable ({err})"),
    };

    let productless = catalog
        .records
        .iter()
        .filter(|r| r.product.is_none())
        .count();

    println!("offers:            {}", catalog.offers.len());
    println!("products:          {}", catalog.product_count());
    println!("records:           {}", catalog.records.len());
    println!("offer-only:        {}", productless);
    println!("cache:             {}", cache_status);
    println!("cache fingerprint: {}", hex::encode(&fp[..8]));
    Ok(())
}
