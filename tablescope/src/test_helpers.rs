use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use crate::metadata::{FixtureCatalog, FixtureMetadata, TableDescriptor, TableRef};
use crate::{
    AnomalyKind, Database, IntrospectionConfig, IntrospectionOutcome, IntrospectionSummary, ProgressSink, Result,
    SchemaGraphBuilder, Stage, Vendor,
};

/// The database and namespace every vendor test runs against.
pub const TEST_DATABASE: &str = "TEST 1.0";

/// A helper for running the same test against each vendor dialect.
///
/// Every vendor places the test database at a different namespace level: MySQL calls it a
/// catalog, Postgres has a schema inside the current database, and SQLite always uses `main`.
///
/// All the methods on this struct unwrap errors directly to make it easier to write tests.
pub struct TestHelper {
    pub vendor: Vendor,
    /// An identifier for the test helper
    helper_name: String,
}

/// Creates a new test helper for a vendor.
pub async fn get_test_helper(name: &str, vendor: Vendor) -> TestHelper {
    #[cfg(test)]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    TestHelper {
        vendor,
        helper_name: name.to_string(),
    }
}

impl TestHelper {
    pub fn name(&self) -> &str {
        &self.helper_name
    }

    /// The catalog and schema tables of the test database are reported under.
    pub fn namespace(&self) -> (Option<&'static str>, Option<&'static str>) {
        match self.vendor {
            Vendor::MySql => (Some(TEST_DATABASE), None),
            Vendor::Postgres => (Some(TEST_DATABASE), Some(TEST_DATABASE)),
            Vendor::Sqlite => (Some("main"), None),
        }
    }

    /// A table in the test database.
    pub fn table(&self, name: &str) -> TableDescriptor {
        let (catalog, schema) = self.namespace();
        TableDescriptor::new(catalog, schema, name)
    }

    /// A table in a namespace next to the test database, which introspection must leave out.
    pub fn foreign_table(&self, name: &str) -> TableDescriptor {
        match self.vendor {
            Vendor::MySql => TableDescriptor::new(Some("TEST 1x0"), None, name),
            Vendor::Postgres => TableDescriptor::new(Some(TEST_DATABASE), Some("TEST 1x0"), name),
            Vendor::Sqlite => TableDescriptor::new(Some("temp"), None, name),
        }
    }

    pub fn table_ref(&self, name: &str) -> TableRef {
        self.table(name).table_ref()
    }

    /// An empty catalog for the vendor, with the listing defects its real driver has.
    pub fn catalog(&self) -> FixtureCatalog {
        match self.vendor {
            Vendor::MySql => FixtureCatalog::new(self.vendor).with_dot_pattern_defect(),
            _ => FixtureCatalog::new(self.vendor),
        }
    }

    /// A configuration selecting the test database.
    pub fn config(&self) -> IntrospectionConfig {
        let config = IntrospectionConfig::new(self.vendor, TEST_DATABASE);
        match self.vendor {
            Vendor::MySql => config.with_catalog(TEST_DATABASE),
            Vendor::Postgres => config.with_schema(TEST_DATABASE),
            Vendor::Sqlite => config.with_catalog("main"),
        }
    }

    /// Runs a full introspection of `catalog` and returns the graph.
    pub async fn introspect(&self, catalog: FixtureCatalog) -> Database {
        let outcome = self
            .run(&self.config(), FixtureMetadata::new(catalog), &RecordingProgressSink::default())
            .await
            .unwrap_or_else(|e| panic!("Introspection failed for {}: {:?}", self.helper_name, e));

        outcome
            .into_database()
            .unwrap_or_else(|| panic!("Introspection for {} was cancelled", self.helper_name))
    }

    /// Runs an introspection and returns its outcome, failures included.
    pub async fn run(
        &self,
        config: &IntrospectionConfig,
        metadata: FixtureMetadata,
        sink: &dyn ProgressSink,
    ) -> Result<IntrospectionOutcome> {
        self.run_with_cancellation(config, metadata, sink, CancellationToken::new()).await
    }

    pub async fn run_with_cancellation(
        &self,
        config: &IntrospectionConfig,
        metadata: FixtureMetadata,
        sink: &dyn ProgressSink,
        cancellation: CancellationToken,
    ) -> Result<IntrospectionOutcome> {
        SchemaGraphBuilder::new(config, Arc::new(metadata.clone()), sink)
            .with_connector(Arc::new(metadata))
            .with_cancellation(cancellation)
            .build()
            .await
    }
}

/// One event received by a [`RecordingProgressSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    StageStarted(Stage),
    TableProcessed(String),
    Anomaly(AnomalyKind, String),
    Completed(IntrospectionSummary),
}

/// A sink that keeps every event, to be inspected after the run.
///
/// Can optionally cancel a token once a number of tables have been processed.
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingProgressSink {
    pub fn cancelling_after(tables: usize, cancellation: CancellationToken) -> Self {
        Self {
            events: Mutex::default(),
            cancel_after: Some((tables, cancellation)),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::StageStarted(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }

    pub fn processed_tables(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::TableProcessed(table) => Some(table),
                _ => None,
            })
            .collect()
    }

    pub fn anomalies(&self) -> Vec<(AnomalyKind, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Anomaly(kind, detail) => Some((kind, detail)),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> Option<IntrospectionSummary> {
        self.events().into_iter().find_map(|e| match e {
            ProgressEvent::Completed(summary) => Some(summary),
            _ => None,
        })
    }

    fn push(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressSink for RecordingProgressSink {
    fn on_stage_start(&self, stage: Stage) {
        self.push(ProgressEvent::StageStarted(stage));
    }

    fn on_table_processed(&self, table: &str) {
        self.push(ProgressEvent::TableProcessed(table.to_string()));

        if let Some((tables, cancellation)) = &self.cancel_after {
            if self.processed_tables().len() >= *tables {
                cancellation.cancel();
            }
        }
    }

    fn on_anomaly(&self, kind: AnomalyKind, detail: &str) {
        self.push(ProgressEvent::Anomaly(kind, detail.to_string()));
    }

    fn on_complete(&self, summary: &IntrospectionSummary) {
        self.push(ProgressEvent::Completed(summary.clone()));
    }
}
