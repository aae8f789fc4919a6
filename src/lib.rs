//! A distributed, graph-augmented retrieval pipeline: a typed knowledge graph
//! store, hierarchical community detection over that graph, and a
//! map-reduce query engine that fans a user query out to one stateless
//! worker per community and reduces the survivors into a single answer.

pub mod community;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod graph;
pub mod http_server;
pub mod observability;
pub mod query;
pub mod types;

pub use config::{Config, ConfigBuilder, Delimiters};
pub use contracts::{BlobStore, Completion, CompletionParams, Embedding, InProcessMessageBus, MessageBus};
#[cfg(feature = "http-client")]
pub use contracts::HttpCompletion;
pub use errors::{GraphRagError, Result, ValidationContext};
pub use graph::{
    ingest_stream, merge_description, parse_extractor_stream, CommunityData, EdgeData, ExtractorRecord,
    GraphStore, GraphView, IngestStats, InMemoryGraphStore, NodeData, ParseOutcome, SharedGraphStore,
};
pub use http_server::{build_router, AppState};
pub use observability::{init_logging, log_operation, Operation, OperationContext};
pub use query::{
    answer, answer_with_trace, score_community, AnswerTrace, InMemoryRendezvousStore, PartialAnswer, RendezvousStore,
};
pub use types::{canonicalize, clean_str, CommunityUid, EdgeUid, NodeUid};
