use std::time::Duration;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use crate::{AnomalyKind, ResolutionReport, Stage};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunStatus {
    Completed,
    /// Stopped on request while `stage` was running. Not a failure.
    Cancelled { stage: Stage },
    Failed { cause: String },
}

/// What a run did, reported once at the end of every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntrospectionSummary {
    pub run_id: Uuid,
    pub database: String,
    pub status: RunStatus,
    pub tables: usize,
    pub views: usize,
    pub routines: usize,
    pub anomalies: usize,
    pub resolution: ResolutionReport,
    pub elapsed: Duration,
}

/// Receives progress events. Events are fire-and-forget, a sink can't influence the run.
///
/// Sinks are called from the task that owns the graph, never concurrently.
pub trait ProgressSink: Send + Sync {
    fn on_stage_start(&self, _stage: Stage) {}

    /// Called once per table or view, after all of its metadata has been read.
    fn on_table_processed(&self, _table: &str) {}

    fn on_anomaly(&self, _kind: AnomalyKind, _detail: &str) {}

    fn on_complete(&self, _summary: &IntrospectionSummary) {}
}

/// A sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_stage_start(&self, stage: Stage) {
        info!(%stage, "Starting stage");
    }

    fn on_table_processed(&self, table: &str) {
        info!(table, "Processed table");
    }

    fn on_anomaly(&self, kind: AnomalyKind, detail: &str) {
        warn!(%kind, detail, "Anomaly in schema metadata");
    }

    fn on_complete(&self, summary: &IntrospectionSummary) {
        match &summary.status {
            RunStatus::Completed => info!(
                run_id = %summary.run_id,
                tables = summary.tables,
                views = summary.views,
                anomalies = summary.anomalies,
                elapsed = ?summary.elapsed,
                "Introspected database {}", summary.database
            ),
            RunStatus::Cancelled { stage } => warn!(run_id = %summary.run_id, %stage, "Introspection was cancelled"),
            RunStatus::Failed { cause } => warn!(run_id = %summary.run_id, cause = %cause, "Introspection failed"),
        }
    }
}
