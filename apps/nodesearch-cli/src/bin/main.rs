use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nodesearch_core::config::{Config, Settings};
use nodesearch_core::link::UriPathSegmentResolver;
use nodesearch_core::search::MatchingStrategy;
use nodesearch_core::traits::TreeAccessor;
use nodesearch_core::tree::ContentGraph;
use nodesearch_core::types::{document_id, DimensionSpacePoint, Node, NodeAggregateId};
use nodesearch_indexer::{NodeIndexer, QueryBuilder};
use nodesearch_text::TantivyIndex;

#[derive(Parser)]
#[command(name = "nodesearch")]
#[command(about = "Keep a fulltext index in sync with a content tree", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file; defaults to config.toml and config.<RUST_ENV>.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Content snapshot file or directory (overrides content.path)
    #[arg(long, global = true)]
    content: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index if it does not exist yet
    CreateIndex,
    /// Recreate the index and index every fulltext root
    Build,
    /// Remove all documents from the index
    Flush,
    /// Reindex the fulltext root of a node
    IndexNode {
        aggregate: String,
        /// Dimension value as name=value, repeatable
        #[arg(short, long = "dimension", value_parser = parse_dimension)]
        dimensions: Vec<(String, String)>,
        /// Only reindex the variant in the given dimensions
        #[arg(long)]
        single: bool,
    },
    /// Delete the document of a node in the given dimensions; the node may
    /// already be gone from the content
    RemoveNode {
        aggregate: String,
        #[arg(short, long = "dimension", value_parser = parse_dimension)]
        dimensions: Vec<(String, String)>,
    },
    /// Query the index and print matching hits as JSON lines
    Search {
        #[arg(default_value = "")]
        query: String,
        /// Restrict results to this node and its descendants
        #[arg(long)]
        context: Option<String>,
        #[arg(short, long = "dimension", value_parser = parse_dimension)]
        dimensions: Vec<(String, String)>,
        /// Raw filter expression, repeatable
        #[arg(short, long)]
        filter: Vec<String>,
        #[arg(long)]
        node_type: Option<String>,
        /// Sort clause such as title:asc, repeatable
        #[arg(long)]
        sort: Vec<String>,
        #[arg(long)]
        highlight: Vec<String>,
        /// Require every query word to match
        #[arg(long)]
        all: bool,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_dimension(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{raw}'")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_file(path),
        None => Config::load(),
    }
    .context("loading configuration")?;
    let settings = config.settings()?;

    let needs_content = !matches!(cli.command, Commands::CreateIndex | Commands::Flush | Commands::RemoveNode { .. });
    let graph = if needs_content {
        let path = cli.content.clone().unwrap_or_else(|| {
            let dir: String = config.get("content.path").unwrap_or_else(|_| "data/content".to_string());
            nodesearch_core::config::expand_path(dir)
        });
        Arc::new(ContentGraph::load(&path).with_context(|| format!("loading content from {}", path.display()))?)
    } else {
        Arc::new(ContentGraph::new())
    };

    let index = Arc::new(TantivyIndex::new(&settings.index.name, settings.index.resolved_path()));
    let indexer = build_indexer(&settings, index.clone(), graph.clone())?;

    match cli.command {
        Commands::CreateIndex => {
            indexer.create_index()?;
            println!("Index '{}' ready at {}", settings.index.name, index.dir().display());
        }
        Commands::Build => {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} roots {msg}")?);
            spinner.enable_steady_tick(Duration::from_millis(120));
            let report = indexer.build_with_progress(|node| {
                spinner.inc(1);
                spinner.set_message(node.aggregate_id.to_string());
            })?;
            spinner.finish_and_clear();
            println!("Indexed {} roots ({} documents)", report.aggregates, report.documents);
        }
        Commands::Flush => {
            indexer.flush()?;
            println!("Index '{}' flushed", settings.index.name);
        }
        Commands::IndexNode { aggregate, dimensions, single } => {
            let node = find_node(graph.as_ref(), &settings, &aggregate, dimensions)?;
            let written = if single { indexer.index_single_node(&node)? } else { indexer.index_node(&node)? };
            match written {
                Some(count) => println!("Indexed {count} documents for {aggregate}"),
                None => println!("{aggregate} has no fulltext root; nothing indexed"),
            }
        }
        Commands::RemoveNode { aggregate, dimensions } => {
            let aggregate_id = NodeAggregateId::new(aggregate);
            let point = DimensionSpacePoint::from_pairs(dimensions);
            indexer.remove_document(&aggregate_id, &point)?;
            println!("Removed {}", document_id(&aggregate_id, &point));
        }
        Commands::Search { query, context, dimensions, filter, node_type, sort, highlight, all, limit } => {
            let mut builder = QueryBuilder::new(index.as_ref(), graph.as_ref()).fulltext(query).limit(limit);
            if let Some(context) = context {
                let node = find_node(graph.as_ref(), &settings, &context, dimensions)?;
                builder = builder.query(&node)?;
            }
            for expression in filter {
                builder = builder.filter(expression);
            }
            if let Some(node_type) = node_type {
                builder = builder.node_type(&node_type);
            }
            for clause in sort {
                builder = match clause.strip_suffix(":desc") {
                    Some(property) => builder.sort_desc(property),
                    None => builder.sort_asc(clause.strip_suffix(":asc").unwrap_or(&clause)),
                };
            }
            if !highlight.is_empty() {
                let attributes: Vec<&str> = highlight.iter().map(String::as_str).collect();
                builder = builder.highlight(&attributes, None);
            }
            if all {
                builder = builder.matching_strategy(MatchingStrategy::All);
            }

            let hits = builder.execute_raw()?;
            for resolved in &hits {
                println!("{}", serde_json::to_string(&resolved.hit)?);
            }
            info!(hits = hits.len(), total = builder.count()?, "search finished");
        }
    }
    Ok(())
}

fn build_indexer(settings: &Settings, index: Arc<TantivyIndex>, graph: Arc<ContentGraph>) -> Result<NodeIndexer> {
    let tree: Arc<dyn TreeAccessor> = graph;
    let links = Arc::new(UriPathSegmentResolver::new(tree.clone(), settings.links.clone()));
    let indexer = NodeIndexer::new(
        index,
        tree,
        Arc::new(settings.node_type_registry()?),
        links,
        Arc::new(settings.dimensions.clone()),
        settings.indexing.clone(),
    )?;
    Ok(indexer)
}

fn find_node(graph: &ContentGraph, settings: &Settings, aggregate: &str, dimensions: Vec<(String, String)>) -> Result<Node> {
    let point = DimensionSpacePoint::from_pairs(dimensions);
    graph
        .find_by_aggregate_id_in_dimension(&settings.indexing.workspace, &NodeAggregateId::new(aggregate), &point)?
        .with_context(|| format!("node {aggregate} not found in {point}"))
}
