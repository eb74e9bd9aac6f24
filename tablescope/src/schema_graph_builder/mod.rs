use std::sync::Arc;
use std::time::{Duration, Instant};
use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use crate::metadata::{
    ColumnDescriptor, DatabaseConnector, DatabaseProduct, ForeignKeyDescriptor, IndexDescriptor, MetadataAccess,
    MetadataConnector, PrimaryKeyDescriptor, RelationKind, RoutineDescriptor, TableDescriptor,
};
use crate::parallel_runner::{Completion, ParallelRunner};
use crate::{
    Anomaly, AnomalyKind, Database, ForeignKeyConstraint, IdentifierNormalizer, IntrospectionConfig,
    IntrospectionSummary, ListingPlan, LookupCase, NameContext, NamePattern, ProgressSink, ResolutionOptions, ResolutionReport,
    Result, Routine, RunStatus, Table, TableColumn, TableId, TableIndex, TableKind, TablescopeError,
};

mod extraction;
mod stage;

use extraction::{fetch, with_timeout, Fetched, TableMutation, TableRequest};
pub use stage::{Stage, StageTracker};

/// How a run ended, when it didn't fail.
#[derive(Debug)]
pub enum IntrospectionOutcome {
    Completed {
        database: Database,
        summary: IntrospectionSummary,
    },
    /// Cancelled runs don't return a partial graph.
    Cancelled { summary: IntrospectionSummary },
}

impl IntrospectionOutcome {
    pub fn summary(&self) -> &IntrospectionSummary {
        match self {
            IntrospectionOutcome::Completed { summary, .. } => summary,
            IntrospectionOutcome::Cancelled { summary } => summary,
        }
    }

    pub fn database(&self) -> Option<&Database> {
        match self {
            IntrospectionOutcome::Completed { database, .. } => Some(database),
            IntrospectionOutcome::Cancelled { .. } => None,
        }
    }

    pub fn into_database(self) -> Option<Database> {
        match self {
            IntrospectionOutcome::Completed { database, .. } => Some(database),
            IntrospectionOutcome::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, IntrospectionOutcome::Cancelled { .. })
    }
}

/// Connects with the bundled driver for the configured vendor and builds the graph.
pub async fn introspect(
    config: &IntrospectionConfig,
    sink: &dyn ProgressSink,
    cancellation: CancellationToken,
) -> Result<IntrospectionOutcome> {
    let access = crate::metadata::connect(config).await?;

    SchemaGraphBuilder::new(config, access, sink)
        .with_connector(Arc::new(DatabaseConnector::new(config.clone())))
        .with_cancellation(cancellation)
        .build()
        .await
}

/// Drives one introspection run, stage by stage, and owns the graph while it is being built.
pub struct SchemaGraphBuilder<'a> {
    config: &'a IntrospectionConfig,
    access: Arc<dyn MetadataAccess>,
    connector: Option<Arc<dyn MetadataConnector>>,
    sink: &'a dyn ProgressSink,
    cancellation: CancellationToken,
}

#[derive(Default)]
struct RunState {
    tracker: StageTracker,
    database: Option<Database>,
    report: ResolutionReport,
}

impl<'a> SchemaGraphBuilder<'a> {
    pub fn new(config: &'a IntrospectionConfig, access: Arc<dyn MetadataAccess>, sink: &'a dyn ProgressSink) -> Self {
        Self {
            config,
            access,
            connector: None,
            sink,
            cancellation: CancellationToken::new(),
        }
    }

    /// Allows per-table calls to run on extra connections, up to the configured parallelism.
    pub fn with_connector(mut self, connector: Arc<dyn MetadataConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    #[instrument(skip_all, fields(database = %self.config.database_name))]
    pub async fn build(self) -> Result<IntrospectionOutcome> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut state = RunState::default();

        let result = self.run(&mut state).await;

        let status = match &result {
            Ok(Completion::Finished) => RunStatus::Completed,
            Ok(Completion::Cancelled) => RunStatus::Cancelled {
                stage: state.tracker.current(),
            },
            Err(e) => RunStatus::Failed { cause: e.to_string() },
        };

        let summary = self.summarize(run_id, status, &state, started.elapsed());
        self.sink.on_complete(&summary);

        match result {
            Ok(Completion::Finished) => match state.database {
                Some(database) => Ok(IntrospectionOutcome::Completed { database, summary }),
                None => Err(TablescopeError::StageOrder {
                    stage: Stage::Resolved,
                    missing: Stage::Init,
                }),
            },
            Ok(Completion::Cancelled) => {
                info!(stage = %state.tracker.current(), "Introspection cancelled");
                Ok(IntrospectionOutcome::Cancelled { summary })
            }
            Err(e) => Err(e),
        }
    }

    async fn run(&self, state: &mut RunState) -> Result<Completion> {
        if !self.enter(&mut state.tracker, Stage::Init)? {
            return Ok(Completion::Cancelled);
        }
        let (normalizer, database) = self.initialize().await?;
        let database = state.database.insert(database);
        state.tracker.complete(Stage::Init)?;

        if !self.enter(&mut state.tracker, Stage::Tables)? {
            return Ok(Completion::Cancelled);
        }
        let plan = normalizer.plan_listing(self.config.catalog.as_deref(), self.config.schema.as_deref());
        self.list_tables(&plan, database).await?;
        state.tracker.complete(Stage::Tables)?;

        let runner = self.runner().await?;

        let table_stages = [
            (Stage::Columns, TableRequest::Columns),
            (Stage::Indexes, TableRequest::Indexes),
            (Stage::PrimaryKeys, TableRequest::PrimaryKeys),
            (Stage::ForeignKeys, TableRequest::ForeignKeys),
        ];

        for (stage, request) in table_stages {
            if !self.enter(&mut state.tracker, stage)? {
                return Ok(Completion::Cancelled);
            }
            if self.extract(&runner, database, request).await? == Completion::Cancelled {
                return Ok(Completion::Cancelled);
            }
            state.tracker.complete(stage)?;
        }

        if self.config.include_views {
            if !self.enter(&mut state.tracker, Stage::Views)? {
                return Ok(Completion::Cancelled);
            }
            if self.extract(&runner, database, TableRequest::ViewDefinition).await? == Completion::Cancelled {
                return Ok(Completion::Cancelled);
            }
            state.tracker.complete(Stage::Views)?;
        } else {
            state.tracker.skip(Stage::Views)?;
        }

        if self.config.include_routines {
            if !self.enter(&mut state.tracker, Stage::Routines)? {
                return Ok(Completion::Cancelled);
            }
            self.list_routines(&plan, database).await?;
            state.tracker.complete(Stage::Routines)?;
        } else {
            state.tracker.skip(Stage::Routines)?;
        }

        if !self.enter(&mut state.tracker, Stage::Resolved)? {
            return Ok(Completion::Cancelled);
        }
        state.report = database.resolve(&ResolutionOptions {
            infer_implied_relationships: self.config.infer_implied_relationships,
        });
        for anomaly in database.resolution_anomalies() {
            self.sink.on_anomaly(anomaly.kind, &anomaly.detail);
        }
        state.tracker.complete(Stage::Resolved)?;

        Ok(Completion::Finished)
    }

    /// Begins a stage. Returns `false` when the run has been cancelled.
    fn enter(&self, tracker: &mut StageTracker, stage: Stage) -> Result<bool> {
        tracker.begin(stage)?;
        self.sink.on_stage_start(stage);
        debug!(%stage, "Entering stage");

        Ok(!self.cancellation.is_cancelled())
    }

    fn timeout(&self) -> Duration {
        self.config.metadata_timeout
    }

    fn record(&self, database: &mut Database, anomaly: Anomaly) {
        self.sink.on_anomaly(anomaly.kind, &anomaly.detail);
        database.push_anomaly(anomaly);
    }

    #[instrument(skip_all)]
    async fn initialize(&self) -> Result<(IdentifierNormalizer, Database)> {
        self.config.validate()?;

        let vendor = self.config.vendor;
        if self.access.vendor() != vendor {
            return Err(TablescopeError::InvalidConfiguration(format!(
                "configured for {} but the metadata connection is to {}",
                vendor,
                self.access.vendor()
            )));
        }

        let (product, reserved_words) = futures::join!(
            with_timeout("read product", self.timeout(), self.access.product()),
            with_timeout("read reserved words", self.timeout(), self.access.reserved_words()),
        );

        let mut anomalies = Vec::new();
        let product = match product {
            Ok(product) => product,
            Err(TablescopeError::UnsupportedFeature { feature, reason, .. }) => {
                anomalies.push(Anomaly::new(
                    AnomalyKind::UnsupportedFeature,
                    None,
                    format!("{} metadata is not available: {}", feature, reason),
                ));
                DatabaseProduct::new(vendor, &vendor.to_string(), "unknown")
            }
            Err(e) => return Err(e),
        };

        let reserved_words = match reserved_words {
            Ok(words) => words,
            Err(e) if e.is_unsupported_feature() => {
                debug!("Using the built-in reserved words: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        info!(product = %product.name, version = %product.version, "Connected");

        let normalizer = IdentifierNormalizer::new(vendor, self.config.filter_defects()).with_reserved_words(reserved_words);
        let name = normalizer
            .normalize_input(&self.config.database_name, NameContext::Database)
            .into_string();

        let mut database = Database::new(name, None, None, product);
        for anomaly in anomalies {
            self.record(&mut database, anomaly);
        }

        Ok((normalizer, database))
    }

    #[instrument(skip_all)]
    async fn list_tables(&self, plan: &ListingPlan, database: &mut Database) -> Result {
        if plan.bypasses_vendor_filter() {
            info!("The vendor can't filter on these names reliably, listing every table and filtering here");
        }

        let mut tables = with_timeout(
            "list tables",
            self.timeout(),
            self.access.list_tables(plan.vendor_catalog_pattern(), plan.vendor_schema_pattern()),
        )
        .await?;

        let listed = tables.len();
        plan.retain_tables(&mut tables);
        tables.retain(|t| (self.config.include_views || !t.kind.is_view()) && self.config.is_table_included(&t.name));
        tables.sort_by(|a, b| (&a.catalog, &a.schema, &a.name).cmp(&(&b.catalog, &b.schema, &b.name)));

        debug!("Kept {} of {} listed tables", tables.len(), listed);

        database.catalog = namespace(&plan.catalog.pattern, tables.iter().map(|t| t.catalog.as_deref()));
        database.schema = namespace(&plan.schema.pattern, tables.iter().map(|t| t.schema.as_deref()));
        if database.catalog.is_none() && database.schema.is_none() {
            database.catalog = Some(database.name.clone());
        }

        let column_case = self.config.vendor.lookup_case(NameContext::Column);
        for descriptor in tables {
            database.add_table(self.to_table(descriptor, column_case));
        }

        Ok(())
    }

    fn to_table(&self, descriptor: TableDescriptor, column_case: LookupCase) -> Table {
        let mut table = Table::new(descriptor.catalog, descriptor.schema, descriptor.name, column_case);
        table.remarks = descriptor.remarks;
        table.kind = match descriptor.kind {
            RelationKind::Table => TableKind::Table,
            RelationKind::View => TableKind::View {
                definition: None,
                materialized: false,
            },
            RelationKind::MaterializedView => TableKind::View {
                definition: None,
                materialized: true,
            },
        };
        if self.config.include_row_counts {
            table.row_count = descriptor.row_count;
        }
        table
    }

    async fn runner(&self) -> Result<ParallelRunner> {
        match &self.connector {
            Some(connector) if self.config.max_parallelism.get() > 1 => {
                let connect = ParallelRunner::connect(connector.as_ref(), self.config.max_parallelism);
                with_timeout("open worker connections", self.timeout(), connect).await
            }
            _ => Ok(ParallelRunner::single(self.access.clone())),
        }
    }

    /// Runs one per-table request for every table it applies to.
    #[instrument(skip_all, fields(request = ?request))]
    async fn extract(&self, runner: &ParallelRunner, database: &mut Database, request: TableRequest) -> Result<Completion> {
        let jobs = database
            .tables()
            .iter()
            .enumerate()
            .filter(|(_, t)| match request {
                TableRequest::Columns => true,
                TableRequest::ViewDefinition => t.is_view(),
                _ => !t.is_view(),
            })
            .map(|(idx, t)| (TableId(idx), t.table_ref()))
            .collect_vec();

        debug!("Reading {:?} for {} tables", request, jobs.len());

        let timeout = self.timeout();
        runner
            .run(
                jobs,
                &self.cancellation,
                move |access, (table, reference)| fetch(access, request, table, reference, timeout),
                |mutation| self.apply(database, mutation),
            )
            .await
    }

    /// Writes fetched metadata into the graph. Only ever called from the builder's own task.
    fn apply(&self, database: &mut Database, mutation: TableMutation) -> Result {
        let TableMutation { table, request, fetched } = mutation;
        let Some(target) = database.table_by_id_mut(table) else {
            return Err(TablescopeError::InvalidNumberOfResults {
                actual: 0,
                expected: 1,
            });
        };

        let qualified_name = target.qualified_name();
        let anomalies = match fetched {
            Fetched::Columns(columns) => target.set_columns(columns.into_iter().map(to_column).collect()),
            Fetched::Indexes(indexes) => target.set_indexes(indexes.into_iter().map(to_index).collect()),
            Fetched::PrimaryKeys(keys) => {
                let (name, columns) = to_primary_key(keys);
                target.set_primary_key(name, columns)
            }
            Fetched::ForeignKeys(keys) => {
                target.set_foreign_keys(keys.into_iter().map(to_foreign_key).collect());
                Vec::new()
            }
            Fetched::ViewDefinition(definition) => {
                if let TableKind::View { definition: current, .. } = &mut target.kind {
                    *current = definition;
                }
                Vec::new()
            }
            Fetched::Unsupported(reason) => vec![Anomaly::new(
                AnomalyKind::UnsupportedFeature,
                Some(qualified_name.clone()),
                format!("{} metadata is not available for {}: {}", request.feature(), qualified_name, reason),
            )],
        };

        for anomaly in anomalies {
            self.record(database, anomaly);
        }

        if matches!(request, TableRequest::ForeignKeys | TableRequest::ViewDefinition) {
            self.sink.on_table_processed(&qualified_name);
        }

        Ok(())
    }

    #[instrument(skip_all)]
    async fn list_routines(&self, plan: &ListingPlan, database: &mut Database) -> Result {
        let listed = with_timeout(
            "list routines",
            self.timeout(),
            self.access.list_routines(plan.vendor_catalog_pattern(), plan.vendor_schema_pattern()),
        )
        .await;

        match listed {
            Ok(mut routines) => {
                plan.retain_routines(&mut routines);
                routines.sort_by(|a, b| (&a.catalog, &a.schema, &a.name).cmp(&(&b.catalog, &b.schema, &b.name)));
                database.routines = routines.into_iter().map(to_routine).collect();
                Ok(())
            }
            Err(TablescopeError::UnsupportedFeature { feature, reason, .. }) => {
                let anomaly = Anomaly::new(
                    AnomalyKind::UnsupportedFeature,
                    None,
                    format!("{} metadata is not available: {}", feature, reason),
                );
                self.record(database, anomaly);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn summarize(&self, run_id: Uuid, status: RunStatus, state: &RunState, elapsed: Duration) -> IntrospectionSummary {
        let database = state.database.as_ref();
        let tables = database.map(|d| d.tables()).unwrap_or_default();

        IntrospectionSummary {
            run_id,
            database: database
                .map(|d| d.name.clone())
                .unwrap_or_else(|| self.config.database_name.clone()),
            status,
            tables: tables.iter().filter(|t| !t.is_view()).count(),
            views: tables.iter().filter(|t| t.is_view()).count(),
            routines: database.map_or(0, |d| d.routines.len()),
            anomalies: database.map_or(0, |d| d.anomalies().count()),
            resolution: state.report,
            elapsed,
        }
    }
}

/// The namespace the whole graph lives in: the configured literal, or the only one observed.
fn namespace<'n>(pattern: &NamePattern, observed: impl Iterator<Item = Option<&'n str>>) -> Option<String> {
    if let NamePattern::Literal(name) = pattern {
        return Some(name.clone());
    }

    observed
        .flatten()
        .unique()
        .exactly_one()
        .ok()
        .map(str::to_string)
}

fn to_column(column: ColumnDescriptor) -> TableColumn {
    TableColumn {
        is_nullable: column.is_nullable,
        default_value: column.default_value,
        remarks: column.remarks,
        identity: column.identity,
        ..TableColumn::new(column.name, column.data_type, column.ordinal_position)
    }
}

fn to_index(index: IndexDescriptor) -> TableIndex {
    TableIndex {
        name: index.name,
        is_unique: index.is_unique || index.is_primary,
        is_primary: index.is_primary,
        columns: index.columns,
        expressions: index.expressions,
        predicate: index.predicate,
    }
}

fn to_primary_key(mut keys: Vec<PrimaryKeyDescriptor>) -> (Option<String>, Vec<String>) {
    keys.sort_by_key(|k| k.key_sequence);
    let name = keys.first().and_then(|k| k.name.clone());

    (name, keys.into_iter().map(|k| k.column_name).collect())
}

fn to_foreign_key(key: ForeignKeyDescriptor) -> ForeignKeyConstraint {
    let mut constraint = ForeignKeyConstraint::new(key.name, key.parent);
    constraint.columns = key.columns;
    constraint.update_rule = key.update_rule;
    constraint.delete_rule = key.delete_rule;
    constraint
}

fn to_routine(routine: RoutineDescriptor) -> Routine {
    Routine {
        catalog: routine.catalog,
        schema: routine.schema,
        name: routine.name,
        kind: routine.kind,
        return_type: routine.return_type,
        language: routine.language,
        definition: routine.definition,
        remarks: routine.remarks,
    }
}
