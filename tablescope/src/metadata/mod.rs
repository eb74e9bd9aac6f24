use std::sync::Arc;
use async_trait::async_trait;
use tracing::instrument;
use crate::{IntrospectionConfig, Result, TablescopeError, Vendor};

mod descriptors;
#[cfg(any(test, feature = "test_utilities"))]
mod fixture;
pub(crate) mod postgres;
mod sqlite;

pub use descriptors::*;
#[cfg(any(test, feature = "test_utilities"))]
pub use fixture::*;
pub use postgres::PostgresMetadata;
pub use sqlite::SqliteMetadata;

/// Read-only access to a database's catalog, normalized across vendors.
///
/// Calls fail with [`TablescopeError::is_connectivity`] errors when the connection is unusable,
/// and with [`TablescopeError::is_unsupported_feature`] errors when the vendor permanently
/// can't answer that kind of question.
#[async_trait]
pub trait MetadataAccess: Send + Sync {
    fn vendor(&self) -> Vendor;

    async fn product(&self) -> Result<DatabaseProduct>;

    /// Lists tables and views. Patterns use `LIKE` syntax with `\` as escape character, and
    /// `None` means no filter.
    async fn list_tables(&self, catalog_pattern: Option<&str>, schema_pattern: Option<&str>) -> Result<Vec<TableDescriptor>>;

    /// Columns in vendor order.
    async fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>>;

    async fn list_primary_keys(&self, table: &TableRef) -> Result<Vec<PrimaryKeyDescriptor>>;

    /// The foreign keys declared on `table`.
    async fn list_imported_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyDescriptor>>;

    async fn list_indexes(&self, table: &TableRef) -> Result<Vec<IndexDescriptor>>;

    async fn view_definition(&self, table: &TableRef) -> Result<Option<String>>;

    async fn list_routines(&self, catalog_pattern: Option<&str>, schema_pattern: Option<&str>) -> Result<Vec<RoutineDescriptor>>;

    /// Keywords the server refuses as bare identifiers.
    async fn reserved_words(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Opens independent metadata connections, one per parallel worker.
#[async_trait]
pub trait MetadataConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MetadataAccess>>;
}

/// Connects using the bundled driver for the configured vendor.
#[instrument(skip_all)]
pub async fn connect(config: &IntrospectionConfig) -> Result<Arc<dyn MetadataAccess>> {
    let connect = async {
        let access: Arc<dyn MetadataAccess> = match config.vendor {
            Vendor::Postgres => Arc::new(PostgresMetadata::connect(&config.connection).await?),
            Vendor::Sqlite => Arc::new(SqliteMetadata::open(&config.connection.database).await?),
            Vendor::MySql => return Err(TablescopeError::NoDriverForVendor(Vendor::MySql)),
        };
        Ok(access)
    };

    match tokio::time::timeout(config.metadata_timeout, connect).await {
        Ok(result) => result,
        Err(_) => Err(TablescopeError::Timeout {
            operation: "connect",
            timeout: config.metadata_timeout,
        }),
    }
}

/// A [`MetadataConnector`] for the bundled drivers.
#[derive(Debug, Clone)]
pub struct DatabaseConnector {
    config: IntrospectionConfig,
}

impl DatabaseConnector {
    pub fn new(config: IntrospectionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MetadataConnector for DatabaseConnector {
    async fn connect(&self) -> Result<Arc<dyn MetadataAccess>> {
        connect(&self.config).await
    }
}
