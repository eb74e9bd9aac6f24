use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use crate::metadata::{
    ColumnDescriptor, ForeignKeyDescriptor, IndexDescriptor, MetadataAccess, MetadataFeature, PrimaryKeyDescriptor,
    TableRef,
};
use crate::{Result, TableId, TablescopeError};

/// The per-table metadata requests, one per extraction stage.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub(crate) enum TableRequest {
    Columns,
    Indexes,
    PrimaryKeys,
    ForeignKeys,
    ViewDefinition,
}

impl TableRequest {
    pub fn feature(&self) -> MetadataFeature {
        match self {
            TableRequest::Columns => MetadataFeature::Columns,
            TableRequest::Indexes => MetadataFeature::Indexes,
            TableRequest::PrimaryKeys => MetadataFeature::PrimaryKeys,
            TableRequest::ForeignKeys => MetadataFeature::ImportedKeys,
            TableRequest::ViewDefinition => MetadataFeature::ViewDefinitions,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            TableRequest::Columns => "list columns",
            TableRequest::Indexes => "list indexes",
            TableRequest::PrimaryKeys => "list primary keys",
            TableRequest::ForeignKeys => "list imported keys",
            TableRequest::ViewDefinition => "read view definition",
        }
    }
}

#[derive(Debug)]
pub(crate) enum Fetched {
    Columns(Vec<ColumnDescriptor>),
    Indexes(Vec<IndexDescriptor>),
    PrimaryKeys(Vec<PrimaryKeyDescriptor>),
    ForeignKeys(Vec<ForeignKeyDescriptor>),
    ViewDefinition(Option<String>),
    /// The vendor can't answer this request. Holds the vendor's reason.
    Unsupported(String),
}

/// Metadata read for one table, waiting to be applied to the graph.
#[derive(Debug)]
pub(crate) struct TableMutation {
    pub table: TableId,
    pub request: TableRequest,
    pub fetched: Fetched,
}

/// Reads one kind of metadata for one table.
///
/// Unsupported features become [`Fetched::Unsupported`], every other failure is returned as is.
pub(crate) async fn fetch(
    access: Arc<dyn MetadataAccess>,
    request: TableRequest,
    table: TableId,
    reference: TableRef,
    timeout: Duration,
) -> Result<TableMutation> {
    let operation = request.operation();
    let fetched = match request {
        TableRequest::Columns => with_timeout(operation, timeout, access.list_columns(&reference))
            .await
            .map(Fetched::Columns),
        TableRequest::Indexes => with_timeout(operation, timeout, access.list_indexes(&reference))
            .await
            .map(Fetched::Indexes),
        TableRequest::PrimaryKeys => with_timeout(operation, timeout, access.list_primary_keys(&reference))
            .await
            .map(Fetched::PrimaryKeys),
        TableRequest::ForeignKeys => with_timeout(operation, timeout, access.list_imported_keys(&reference))
            .await
            .map(Fetched::ForeignKeys),
        TableRequest::ViewDefinition => with_timeout(operation, timeout, access.view_definition(&reference))
            .await
            .map(Fetched::ViewDefinition),
    };

    let fetched = match fetched {
        Ok(fetched) => fetched,
        Err(TablescopeError::UnsupportedFeature { reason, .. }) => Fetched::Unsupported(reason),
        Err(e) => return Err(e),
    };

    Ok(TableMutation {
        table,
        request,
        fetched,
    })
}

/// Bounds a single metadata call. A call that runs out of time counts as lost connectivity.
pub(crate) async fn with_timeout<T>(operation: &'static str, timeout: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(TablescopeError::Timeout { operation, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FixtureCatalog, FixtureMetadata, FixtureTable, TableDescriptor};
    use crate::Vendor;

    fn orders() -> TableRef {
        TableRef::new(None, Some("public".to_string()), "orders")
    }

    fn fixture(catalog: FixtureCatalog) -> Arc<dyn MetadataAccess> {
        Arc::new(FixtureMetadata::new(catalog.table(
            FixtureTable::new(TableDescriptor::new(None, Some("public"), "orders"))
                .column(ColumnDescriptor::new("id", "int4", 1))
                .index(IndexDescriptor::new("orders_pkey").primary().column("id")),
        )))
    }

    #[tokio::test]
    async fn wraps_the_fetched_metadata() {
        let access = fixture(FixtureCatalog::new(Vendor::Postgres));

        let mutation = fetch(access, TableRequest::Indexes, TableId(3), orders(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(mutation.table, TableId(3));
        assert!(matches!(mutation.fetched, Fetched::Indexes(indexes) if indexes.len() == 1));
    }

    #[tokio::test]
    async fn unsupported_features_are_not_errors() {
        let access = fixture(FixtureCatalog::new(Vendor::Postgres).unsupported(MetadataFeature::Indexes, None));

        let mutation = fetch(access, TableRequest::Indexes, TableId(0), orders(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(matches!(mutation.fetched, Fetched::Unsupported(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let access = fixture(FixtureCatalog::new(Vendor::Postgres).with_latency(Duration::from_secs(60)));

        let result = fetch(access, TableRequest::Columns, TableId(0), orders(), Duration::from_secs(1)).await;

        assert!(matches!(result, Err(TablescopeError::Timeout { operation: "list columns", .. })));
        assert!(result.unwrap_err().is_connectivity());
    }
}
