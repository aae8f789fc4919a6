// Centralized observability infrastructure: structured logging, metrics, tracing.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);
static QUERY_COUNTER: AtomicU64 = AtomicU64::new(0);
static WORKER_SCORE_COUNTER: AtomicU64 = AtomicU64::new(0);
static POLL_ATTEMPT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize logging and tracing. Call once at process startup.
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("graphrag_core=debug,info")
    } else {
        EnvFilter::new("graphrag_core=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("graphrag-core observability initialized");
            }
            Ok(())
        }
        Err(_) => Ok(()), // already initialized — fine in tests
    }
}

/// Structured description of what happened, for `log_operation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    // Graph store
    GraphNodeWrite { node_uid: String },
    GraphNodeRead { node_uid: String },
    GraphNodeDelete { node_uid: String },
    GraphEdgeWrite { edge_uid: String },
    GraphEdgeDelete { edge_uid: String },
    AdjacencyRepair { nodes_scanned: usize },

    // Graph builder
    TupleParsed { record_count: usize },
    TupleParseFailed { reason: String },

    // Community engine
    Stabilize { node_count: usize, edge_count: usize },
    LeidenCluster { level: usize, community_count: usize },
    CommunitySummarize { community_uid: String, degraded: bool },

    // Query orchestrator / workers
    QueryFanOut { community_count: usize, user_query: String },
    RendezvousPoll { attempt: u32, observed: usize, required: usize },
    QueryReduce { context_size: usize },
    MapScore { community_uid: String, score: u8 },

    // System
    Startup { version: String },
    Shutdown { reason: String },
}

impl Operation {
    /// Validate operation parameters before logging.
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::MapScore { score, .. } => {
                anyhow::ensure!(*score <= 10, "map worker score out of range: {score}");
            }
            Operation::RendezvousPoll { required, .. } => {
                anyhow::ensure!(*required > 0, "rendezvous poll requires a positive threshold");
            }
            _ => {}
        }
        Ok(())
    }
}

/// Metric types for performance monitoring.
#[derive(Debug, Clone)]
pub enum MetricType {
    Counter { name: &'static str, value: u64 },
    Gauge { name: &'static str, value: f64 },
    Histogram { name: &'static str, value: f64, unit: &'static str },
    Timer { name: &'static str, duration: Duration },
}

/// Trace context threaded through a single operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub operation: String,
    pub start_time: Instant,
    pub attributes: Vec<(String, String)>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[instrument(skip(ctx))]
pub fn log_operation(ctx: &OperationContext, op: &Operation, result: &Result<()>) {
    let elapsed = ctx.elapsed();
    let attrs = ctx
        .attributes
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");

    match result {
        Ok(()) => {
            info!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                parent_span_id = ?ctx.parent_span_id,
                operation = %ctx.operation,
                elapsed_ms = elapsed.as_millis(),
                attributes = %attrs,
                "operation completed: {:?}", op
            );
            OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            error!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                parent_span_id = ?ctx.parent_span_id,
                operation = %ctx.operation,
                elapsed_ms = elapsed.as_millis(),
                attributes = %attrs,
                error = %e,
                "operation failed: {:?}", op
            );
            ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
    }

    match op {
        Operation::QueryFanOut { .. } | Operation::QueryReduce { .. } => {
            QUERY_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Operation::MapScore { .. } => {
            WORKER_SCORE_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Operation::RendezvousPoll { .. } => {
            POLL_ATTEMPT_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        _ => {}
    }
}

/// Record a metric sample.
pub fn record_metric(metric: MetricType) {
    match metric {
        MetricType::Counter { name, value } => debug!("metric.counter {} = {}", name, value),
        MetricType::Gauge { name, value } => debug!("metric.gauge {} = {}", name, value),
        MetricType::Histogram { name, value, unit } => {
            debug!("metric.histogram {} = {} {}", name, value, unit)
        }
        MetricType::Timer { name, duration } => debug!("metric.timer {} = {:?}", name, duration),
    }
}

/// Run an async block under a fresh trace/span pair, logging entry, exit, and elapsed time.
pub async fn with_trace_id<F, T>(operation: &str, f: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    let ctx = OperationContext::new(operation);
    let trace_id = ctx.trace_id;
    let span_id = ctx.span_id;

    info!(trace_id = %trace_id, span_id = %span_id, "starting operation: {}", operation);

    let start = Instant::now();
    let result = f.await;
    let elapsed = start.elapsed();

    match &result {
        Ok(_) => {
            info!(
                trace_id = %trace_id, span_id = %span_id, elapsed_ms = elapsed.as_millis(),
                "operation completed successfully: {}", operation
            );
            record_metric(MetricType::Timer { name: "operation.duration", duration: elapsed });
        }
        Err(e) => {
            error!(
                trace_id = %trace_id, span_id = %span_id, elapsed_ms = elapsed.as_millis(), error = %e,
                "operation failed: {}", operation
            );
            record_metric(MetricType::Counter { name: "operation.errors", value: 1 });
        }
    }

    result
}

/// Snapshot of the process-wide counters, used by `GET /health` and `GET /metrics`.
pub fn get_metrics() -> serde_json::Value {
    serde_json::json!({
        "operations": {
            "total": OPERATION_COUNTER.load(Ordering::Relaxed),
            "errors": ERROR_COUNTER.load(Ordering::Relaxed),
            "queries": QUERY_COUNTER.load(Ordering::Relaxed),
            "worker_scores": WORKER_SCORE_COUNTER.load(Ordering::Relaxed),
            "poll_attempts": POLL_ATTEMPT_COUNTER.load(Ordering::Relaxed),
        },
        "timestamp": Utc::now().to_rfc3339(),
    })
}
