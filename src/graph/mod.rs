pub mod builder;
pub mod model;
pub mod store;

pub use builder::{ingest_stream, parse_extractor_stream, ExtractorRecord, IngestStats, ParseOutcome};
pub use model::{description_fragments, merge_description, CommunityData, EdgeData, Finding, NodeData};
pub use store::{GraphStore, GraphView, InMemoryGraphStore, SharedGraphStore};
