// Configuration (SPEC_FULL S2a): the flat map of spec.md S6 plus the
// operational tunables the S4 operations need. Loaded from env/file via the
// `config` crate the way the teacher lineage's API-key configuration does,
// with a fluent builder for programmatic construction (tests, embedding).

use crate::errors::{GraphRagError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Extractor tuple delimiters (spec.md S4.B / S6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    pub tuple: String,
    pub record: String,
    pub completion: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self { tuple: "<|>".to_string(), record: "##".to_string(), completion: "<|COMPLETE|>".to_string() }
    }
}

/// The flat configuration map named in spec.md S6, plus the tunables S4's
/// operations require but S6 leaves unnamed (delimiters live on `Delimiters`
/// above; everything else lives here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // spec.md S6 contract fields.
    pub project_id: String,
    pub credential_path: Option<String>,
    pub graph_store_db_id: String,
    pub nodes_coll: String,
    pub edges_coll: String,
    pub comm_coll: String,
    pub query_db_id: String,
    pub intermediate_coll: String,
    pub bus_topic_id: String,
    pub completion_model_name: String,
    pub embedding_model_name: String,
    pub telemetry_endpoint: Option<String>,

    // Community Engine tunables (spec.md S4.C).
    pub max_cluster_size: usize,
    pub leiden_seed: u64,

    // Orchestrator tunables (spec.md S4.D).
    pub poll_interval: Duration,
    pub warmup_sleep: Duration,
    pub max_poll_attempts: u32,
    /// Fraction of communities that must have reported before a poll succeeds.
    pub completion_threshold_fraction: f64,
    pub relevance_threshold: i32,
    pub max_responses: usize,
    pub reduce_temperature: f32,
    pub map_temperature: f32,

    pub delimiters: Delimiters,
    /// Entity types recognized by the extractor; empty type is always permitted.
    pub entity_types: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: "graphrag-local".to_string(),
            credential_path: None,
            graph_store_db_id: "graph-store".to_string(),
            nodes_coll: "nodes".to_string(),
            edges_coll: "edges".to_string(),
            comm_coll: "communities".to_string(),
            query_db_id: "query-store".to_string(),
            intermediate_coll: "intermediate_answers".to_string(),
            bus_topic_id: "graphrag-work-items".to_string(),
            completion_model_name: "default-completion-model".to_string(),
            embedding_model_name: "default-embedding-model".to_string(),
            telemetry_endpoint: None,

            max_cluster_size: 10,
            leiden_seed: 0xDEAD_BEEF,

            poll_interval: Duration::from_secs(10),
            warmup_sleep: Duration::from_secs(5),
            max_poll_attempts: 6,
            completion_threshold_fraction: 0.9,
            relevance_threshold: 0,
            max_responses: 10,
            reduce_temperature: 0.2,
            map_temperature: 0.0,

            delimiters: Delimiters::default(),
            entity_types: vec![
                "organization".to_string(),
                "person".to_string(),
                "geo".to_string(),
                "event".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load configuration from environment variables prefixed `GRAPHRAG_`,
    /// falling back to `Config::default()` for anything unset. Field names
    /// are matched case-insensitively (e.g. `GRAPHRAG_PROJECT_ID`).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let built = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).map_err(|e| GraphRagError::Other(e.into()))?)
            .add_source(config::Environment::with_prefix("GRAPHRAG").separator("_"))
            .build()
            .map_err(|e| GraphRagError::Other(e.into()))?;
        built.try_deserialize().map_err(|e| GraphRagError::Other(e.into()))
    }

    /// The minimum number of reporting communities a rendezvous poll needs to
    /// succeed (spec.md S4.D step 3): `ceil(threshold_fraction * total)`.
    pub fn completion_threshold(&self, total_communities: usize) -> usize {
        (self.completion_threshold_fraction * total_communities as f64).ceil() as usize
    }
}

/// Fluent builder mirroring the teacher lineage's builder pattern, for tests
/// and for callers assembling configuration programmatically rather than from
/// the environment.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self { config: Config::default() }
    }

    pub fn project_id(mut self, value: impl Into<String>) -> Self {
        self.config.project_id = value.into();
        self
    }

    pub fn max_cluster_size(mut self, value: usize) -> Self {
        self.config.max_cluster_size = value;
        self
    }

    pub fn leiden_seed(mut self, value: u64) -> Self {
        self.config.leiden_seed = value;
        self
    }

    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value;
        self
    }

    pub fn warmup_sleep(mut self, value: Duration) -> Self {
        self.config.warmup_sleep = value;
        self
    }

    pub fn max_poll_attempts(mut self, value: u32) -> Self {
        self.config.max_poll_attempts = value;
        self
    }

    pub fn completion_threshold_fraction(mut self, value: f64) -> Self {
        self.config.completion_threshold_fraction = value;
        self
    }

    pub fn max_responses(mut self, value: usize) -> Self {
        self.config.max_responses = value;
        self
    }

    pub fn relevance_threshold(mut self, value: i32) -> Self {
        self.config.relevance_threshold = value;
        self
    }

    pub fn delimiters(mut self, value: Delimiters) -> Self {
        self.config.delimiters = value;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_threshold_rounds_up() {
        let config = Config::default();
        // 0.9 * 3 = 2.7 -> ceil 3, matching scenario 5 (3 communities, all must poll in).
        assert_eq!(config.completion_threshold(3), 3);
        // 0.9 * 10 = 9.
        assert_eq!(config.completion_threshold(10), 9);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = ConfigBuilder::new().max_cluster_size(5).max_responses(3).build();
        assert_eq!(config.max_cluster_size, 5);
        assert_eq!(config.max_responses, 3);
        assert_eq!(config.leiden_seed, 0xDEAD_BEEF);
    }
}
