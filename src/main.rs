// GraphRAG CLI - ingestion, community detection, serving, and querying over
// a graph-augmented retrieval pipeline.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

macro_rules! qprintln {
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            println!($($arg)*);
        }
    };
}

use graphrag_core::community::{run_community_engine, LeidenConfig};
use graphrag_core::{
    build_router, init_logging, AppState, Config, GraphStore, InMemoryGraphStore, InMemoryRendezvousStore,
    InProcessMessageBus, RendezvousStore,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "graphrag", version, about = "A graph-augmented retrieval pipeline", long_about = None)]
struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Suppress non-essential output")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest an extractor tuple stream (file or stdin) into a graph store snapshot directory.
    Ingest {
        #[arg(long, help = "Path to the graph store snapshot directory")]
        store_dir: PathBuf,
        #[arg(long, help = "Path to the extractor stream file; reads stdin if omitted")]
        input: Option<PathBuf>,
        #[arg(long, help = "Source document id recorded on ingested nodes/edges")]
        document_id: Option<String>,
    },
    /// Run stabilization, hierarchical Leiden clustering, and summarization over a store.
    Cluster {
        #[arg(long, help = "Path to the graph store snapshot directory")]
        store_dir: PathBuf,
        #[arg(long, default_value_t = 10, help = "Maximum nodes per community")]
        max_cluster_size: usize,
        #[arg(long, help = "HTTP Completion endpoint used for community summarization")]
        completion_endpoint: String,
    },
    /// Serve the stateless Map Worker HTTP surface.
    Serve {
        #[arg(long, help = "Path to the graph store snapshot directory")]
        store_dir: PathBuf,
        #[arg(long, default_value = "0.0.0.0:8080", help = "Address to bind the HTTP server to")]
        bind: String,
        #[arg(long, help = "HTTP Completion endpoint used to score map requests")]
        completion_endpoint: String,
    },
    /// Answer a query against a store's communities, dispatching map work to an
    /// in-process bus rather than requiring a running worker pool.
    Query {
        #[arg(long, help = "Path to the graph store snapshot directory")]
        store_dir: PathBuf,
        #[arg(long, help = "HTTP Completion endpoint used for both map scoring and the final reduce")]
        completion_endpoint: String,
        #[arg(help = "The natural-language question to answer")]
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging().ok();

    match cli.command {
        Commands::Ingest { store_dir, input, document_id } => {
            let stream = match input {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading extractor stream from {}", path.display()))?,
                None => std::io::read_to_string(std::io::stdin()).context("reading extractor stream from stdin")?,
            };
            let store = InMemoryGraphStore::open(&store_dir).await?;
            let delims = Config::default().delimiters;
            let stats = graphrag_core::ingest_stream(&store, &stream, &delims, document_id.as_deref()).await?;
            store.flush().await?;
            qprintln!(
                cli.quiet,
                "ingested: {} entities created, {} merged, {} relationships created, {} merged, {} tuples skipped",
                stats.entities_created,
                stats.entities_merged,
                stats.relationships_created,
                stats.relationships_merged,
                stats.skipped_tuples
            );
        }
        Commands::Cluster { store_dir, max_cluster_size, completion_endpoint } => {
            let store = InMemoryGraphStore::open(&store_dir).await?;
            #[cfg(feature = "http-client")]
            let completion = graphrag_core::HttpCompletion::new(completion_endpoint);
            #[cfg(not(feature = "http-client"))]
            {
                let _ = completion_endpoint;
                anyhow::bail!("the `http-client` feature is required to run community summarization");
            }
            #[cfg(feature = "http-client")]
            {
                let config = LeidenConfig { max_cluster_size, seed: Config::default().leiden_seed };
                let stats = run_community_engine(&store, &completion, &config).await?;
                store.flush().await?;
                qprintln!(
                    cli.quiet,
                    "clustered into {} level(s), {} communities written ({} degraded)",
                    stats.levels,
                    stats.communities_written,
                    stats.degraded_communities
                );
            }
        }
        Commands::Query { store_dir, completion_endpoint, question } => {
            let store = InMemoryGraphStore::open(&store_dir).await?;
            #[cfg(not(feature = "http-client"))]
            {
                let _ = (completion_endpoint, question);
                anyhow::bail!("the `http-client` feature is required to run queries");
            }
            #[cfg(feature = "http-client")]
            {
                let completion = Arc::new(graphrag_core::HttpCompletion::new(completion_endpoint));
                let rendezvous = Arc::new(InMemoryRendezvousStore::new());
                let config = Config::default();

                // Dispatch each work item to the same in-process completion the
                // reducer uses, so a standalone query needs no running worker pool
                // (SPEC_FULL S4.D expansion).
                let map_completion = completion.clone();
                let map_rendezvous = rendezvous.clone();
                let bus = InProcessMessageBus::new(move |_topic: String, payload: Vec<u8>| {
                    let completion = map_completion.clone();
                    let rendezvous = map_rendezvous.clone();
                    Box::pin(async move {
                        let item: graphrag_core::query::WorkItem = serde_json::from_slice(&payload)
                            .map_err(|e| graphrag_core::GraphRagError::MalformedRecord(e.to_string()))?;
                        let answer =
                            graphrag_core::score_community(completion.as_ref(), &item.community_report, &item.user_query)
                                .await?;
                        rendezvous.put(&item.user_query, item.community_report.community_uid.as_str(), answer).await
                    })
                });

                let trace = graphrag_core::answer_with_trace(
                    &store,
                    &bus,
                    rendezvous.as_ref(),
                    completion.as_ref(),
                    &config,
                    &question,
                )
                .await?;
                qprintln!(cli.quiet, "{}", trace.response);
            }
        }
        Commands::Serve { store_dir, bind, completion_endpoint } => {
            let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::open(&store_dir).await?);
            #[cfg(feature = "http-client")]
            let completion: Arc<dyn graphrag_core::Completion> =
                Arc::new(graphrag_core::HttpCompletion::new(completion_endpoint));
            #[cfg(not(feature = "http-client"))]
            let completion: Arc<dyn graphrag_core::Completion> = {
                let _ = completion_endpoint;
                anyhow::bail!("the `http-client` feature is required to serve the map worker");
            };

            let state = AppState {
                store,
                rendezvous: Arc::new(graphrag_core::InMemoryRendezvousStore::new()),
                completion,
            };
            let router = build_router(state);
            let listener = tokio::net::TcpListener::bind(&bind).await.with_context(|| format!("binding {bind}"))?;
            qprintln!(cli.quiet, "graphrag map worker listening on {bind}");
            axum::serve(listener, router).await.context("serving http")?;
        }
    }

    Ok(())
}
