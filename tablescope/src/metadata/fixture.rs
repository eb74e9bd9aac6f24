use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::metadata::{
    ColumnDescriptor, DatabaseProduct, ForeignKeyDescriptor, IndexDescriptor, MetadataAccess, MetadataConnector,
    MetadataFeature, PrimaryKeyDescriptor, RoutineDescriptor, TableDescriptor, TableRef,
};
use crate::{FilterDefects, NameContext, NamePattern, Result, TablescopeError, Vendor};

/// A table and everything the fixture reports about it.
#[derive(Debug, Clone)]
pub struct FixtureTable {
    pub descriptor: TableDescriptor,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_keys: Vec<PrimaryKeyDescriptor>,
    pub imported_keys: Vec<ForeignKeyDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    pub view_definition: Option<String>,
}

impl FixtureTable {
    pub fn new(descriptor: TableDescriptor) -> Self {
        Self {
            descriptor,
            columns: Vec::new(),
            primary_keys: Vec::new(),
            imported_keys: Vec::new(),
            indexes: Vec::new(),
            view_definition: None,
        }
    }

    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, name: Option<&str>, columns: &[&str]) -> Self {
        self.primary_keys = columns
            .iter()
            .enumerate()
            .map(|(idx, c)| PrimaryKeyDescriptor::new(name, c, idx as i32 + 1))
            .collect();
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKeyDescriptor) -> Self {
        self.imported_keys.push(foreign_key);
        self
    }

    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn view_definition(mut self, definition: &str) -> Self {
        self.view_definition = Some(definition.to_string());
        self
    }

    fn is(&self, table: &TableRef) -> bool {
        self.descriptor.name == table.name
            && self.descriptor.catalog == table.catalog
            && self.descriptor.schema == table.schema
    }
}

/// A failure injected into the fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureFailure {
    /// The feature is unsupported, for one table or for every call when `table` is `None`.
    Unsupported {
        feature: MetadataFeature,
        table: Option<String>,
    },
    /// Every call after the first `calls` calls fails with a connectivity error.
    ConnectivityLostAfter { calls: usize },
    /// The first call for the feature fails with a connectivity error, and so does every later call.
    ConnectivityLostAt { feature: MetadataFeature },
}

/// The contents and behavior of a [`FixtureMetadata`].
#[derive(Debug, Clone)]
pub struct FixtureCatalog {
    pub vendor: Vendor,
    pub product: DatabaseProduct,
    pub tables: Vec<FixtureTable>,
    pub routines: Vec<RoutineDescriptor>,
    pub failures: Vec<FixtureFailure>,
    /// Defects the fixture emulates, as a real driver would exhibit them.
    pub defects: FilterDefects,
    pub latency: Option<Duration>,
}

impl FixtureCatalog {
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            product: DatabaseProduct::new(vendor, "fixture", "1.0"),
            tables: Vec::new(),
            routines: Vec::new(),
            failures: Vec::new(),
            defects: FilterDefects::none(),
            latency: None,
        }
    }

    pub fn table(mut self, table: FixtureTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn routine(mut self, routine: RoutineDescriptor) -> Self {
        self.routines.push(routine);
        self
    }

    pub fn failure(mut self, failure: FixtureFailure) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn unsupported(self, feature: MetadataFeature, table: Option<&str>) -> Self {
        self.failure(FixtureFailure::Unsupported {
            feature,
            table: table.map(str::to_string),
        })
    }

    /// Makes name patterns containing a dot match nothing, like MySQL Connector/J does.
    pub fn with_dot_pattern_defect(mut self) -> Self {
        self.defects.dots_in_name_patterns = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[derive(Debug, Default)]
struct FixtureCounters {
    calls: AtomicUsize,
    connections: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    unfiltered_listings: AtomicUsize,
}

/// An in-memory [`MetadataAccess`] for tests.
///
/// Clones and connections made through [`MetadataConnector`] share the catalog and counters.
#[derive(Debug, Clone)]
pub struct FixtureMetadata {
    catalog: Arc<FixtureCatalog>,
    counters: Arc<FixtureCounters>,
}

struct InFlight<'a>(&'a FixtureCounters);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FixtureMetadata {
    pub fn new(catalog: FixtureCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            counters: Arc::new(FixtureCounters::default()),
        }
    }

    /// Metadata calls made so far, across all connections.
    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn connections_opened(&self) -> usize {
        self.counters.connections.load(Ordering::SeqCst)
    }

    /// The highest number of calls that were running at the same time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Table listings that were requested without any filter.
    pub fn unfiltered_listings(&self) -> usize {
        self.counters.unfiltered_listings.load(Ordering::SeqCst)
    }

    async fn enter(&self, feature: MetadataFeature, table: Option<&TableRef>) -> Result<InFlight<'_>> {
        let call = self.counters.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let guard = InFlight(&self.counters);

        if let Some(latency) = self.catalog.latency {
            tokio::time::sleep(latency).await;
        }

        for failure in &self.catalog.failures {
            match failure {
                FixtureFailure::ConnectivityLostAfter { calls } if call > *calls => {
                    return Err(TablescopeError::Connectivity(format!("connection reset during call {}", call)));
                }
                FixtureFailure::ConnectivityLostAt { feature: lost_at } if *lost_at == feature => {
                    return Err(TablescopeError::Connectivity(format!("connection reset while reading {} metadata", feature)));
                }
                FixtureFailure::Unsupported { feature: unsupported, table: failing_table }
                    if *unsupported == feature
                        && failing_table
                            .as_deref()
                            .map_or(true, |name| table.is_some_and(|t| t.name == name)) =>
                {
                    return Err(TablescopeError::UnsupportedFeature {
                        vendor: self.catalog.vendor,
                        feature,
                        reason: "disabled in fixture".to_string(),
                    });
                }
                _ => {}
            }
        }

        Ok(guard)
    }

    fn find(&self, table: &TableRef) -> Option<&FixtureTable> {
        self.catalog.tables.iter().find(|t| t.is(table))
    }

    /// Applies a vendor-side pattern the way the emulated driver would.
    fn vendor_matches(&self, pattern: Option<&str>, value: Option<&str>, context: NameContext) -> bool {
        match (pattern, value) {
            (None, _) => true,
            (Some(pattern), _) if self.catalog.defects.dots_in_name_patterns && pattern.contains('.') => false,
            (Some(_), None) => true,
            (Some(pattern), Some(value)) => {
                NamePattern::wildcard(pattern).matches(value, self.catalog.vendor.lookup_case(context))
            }
        }
    }
}

#[async_trait]
impl MetadataAccess for FixtureMetadata {
    fn vendor(&self) -> Vendor {
        self.catalog.vendor
    }

    async fn product(&self) -> Result<DatabaseProduct> {
        let _guard = self.enter(MetadataFeature::Product, None).await?;
        Ok(self.catalog.product.clone())
    }

    async fn list_tables(&self, catalog_pattern: Option<&str>, schema_pattern: Option<&str>) -> Result<Vec<TableDescriptor>> {
        let _guard = self.enter(MetadataFeature::Tables, None).await?;

        if catalog_pattern.is_none() && schema_pattern.is_none() {
            self.counters.unfiltered_listings.fetch_add(1, Ordering::SeqCst);
        }

        Ok(self
            .catalog
            .tables
            .iter()
            .map(|t| &t.descriptor)
            .filter(|t| self.vendor_matches(catalog_pattern, t.catalog.as_deref(), NameContext::Catalog))
            .filter(|t| self.vendor_matches(schema_pattern, t.schema.as_deref(), NameContext::Schema))
            .cloned()
            .collect())
    }

    async fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>> {
        let _guard = self.enter(MetadataFeature::Columns, Some(table)).await?;
        Ok(self.find(table).map(|t| t.columns.clone()).unwrap_or_default())
    }

    async fn list_primary_keys(&self, table: &TableRef) -> Result<Vec<PrimaryKeyDescriptor>> {
        let _guard = self.enter(MetadataFeature::PrimaryKeys, Some(table)).await?;
        Ok(self.find(table).map(|t| t.primary_keys.clone()).unwrap_or_default())
    }

    async fn list_imported_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyDescriptor>> {
        let _guard = self.enter(MetadataFeature::ImportedKeys, Some(table)).await?;
        Ok(self.find(table).map(|t| t.imported_keys.clone()).unwrap_or_default())
    }

    async fn list_indexes(&self, table: &TableRef) -> Result<Vec<IndexDescriptor>> {
        let _guard = self.enter(MetadataFeature::Indexes, Some(table)).await?;
        Ok(self.find(table).map(|t| t.indexes.clone()).unwrap_or_default())
    }

    async fn view_definition(&self, table: &TableRef) -> Result<Option<String>> {
        let _guard = self.enter(MetadataFeature::ViewDefinitions, Some(table)).await?;
        Ok(self.find(table).and_then(|t| t.view_definition.clone()))
    }

    async fn list_routines(&self, catalog_pattern: Option<&str>, schema_pattern: Option<&str>) -> Result<Vec<RoutineDescriptor>> {
        let _guard = self.enter(MetadataFeature::Routines, None).await?;

        Ok(self
            .catalog
            .routines
            .iter()
            .filter(|r| self.vendor_matches(catalog_pattern, r.catalog.as_deref(), NameContext::Catalog))
            .filter(|r| self.vendor_matches(schema_pattern, r.schema.as_deref(), NameContext::Schema))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MetadataConnector for FixtureMetadata {
    async fn connect(&self) -> Result<Arc<dyn MetadataAccess>> {
        self.counters.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> FixtureCatalog {
        FixtureCatalog::new(Vendor::MySql)
            .table(FixtureTable::new(TableDescriptor::new(Some("TEST 1.0"), Some("TEST 1.0"), "TABLE 1.0")))
            .table(FixtureTable::new(TableDescriptor::new(Some("shop"), Some("shop"), "orders")))
    }

    #[tokio::test]
    async fn emulates_the_dot_pattern_defect() {
        let metadata = FixtureMetadata::new(catalog().with_dot_pattern_defect());

        let filtered = metadata.list_tables(None, Some("TEST 1.0")).await.unwrap();
        let unfiltered = metadata.list_tables(None, None).await.unwrap();

        assert!(filtered.is_empty());
        assert_eq!(unfiltered.len(), 2);
        assert_eq!(metadata.unfiltered_listings(), 1);
    }

    #[tokio::test]
    async fn filters_like_the_vendor_without_the_defect() {
        let metadata = FixtureMetadata::new(catalog());

        let tables = metadata.list_tables(None, Some("TEST 1.0")).await.unwrap();

        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "TABLE 1.0");
    }

    #[tokio::test]
    async fn injects_failures() {
        let metadata = FixtureMetadata::new(
            catalog()
                .unsupported(MetadataFeature::Indexes, Some("orders"))
                .failure(FixtureFailure::ConnectivityLostAfter { calls: 3 }),
        );
        let orders = TableRef::new(Some("shop".to_string()), Some("shop".to_string()), "orders");
        let other = TableRef::new(Some("TEST 1.0".to_string()), Some("TEST 1.0".to_string()), "TABLE 1.0");

        assert!(metadata.list_indexes(&orders).await.unwrap_err().is_unsupported_feature());
        assert!(metadata.list_indexes(&other).await.is_ok());
        assert!(metadata.list_columns(&other).await.is_ok());
        assert!(metadata.list_columns(&other).await.unwrap_err().is_connectivity());
        assert_eq!(metadata.calls(), 4);
    }
}
