use async_trait::async_trait;
use itertools::Itertools;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tracing::{instrument, warn};
use crate::metadata::{
    ColumnDescriptor, DatabaseProduct, ForeignKeyDescriptor, IndexDescriptor, MetadataAccess, MetadataFeature,
    PrimaryKeyDescriptor, RoutineDescriptor, TableDescriptor, TableRef,
};
use crate::{ColumnIdentity, ConnectionSettings, Result, TablescopeError, Vendor};

mod client_wrapper;
mod foreign_key;
mod index;
mod primary_key;
mod routine;
mod table;
mod table_column;
mod view;

pub use client_wrapper::{FromRow, PostgresClientWrapper};
pub(crate) use client_wrapper::{FromPgChar, RowEnumExt};

/// Metadata access through `pg_catalog`.
///
/// Postgres has one catalog per connection, the current database, so catalog patterns are
/// matched against `current_database()`.
pub struct PostgresMetadata {
    connection: PostgresClientWrapper,
}

impl PostgresMetadata {
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let connection = PostgresClientWrapper::new(&settings.postgres_connection_string()).await?;
        Ok(Self::new(connection))
    }

    pub fn new(connection: PostgresClientWrapper) -> Self {
        Self { connection }
    }

    async fn query<T: FromRow>(&self, feature: MetadataFeature, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<T>> {
        self.connection
            .get_results(sql, params)
            .await
            .map_err(|e| self.classify(feature, e))
    }

    fn classify(&self, feature: MetadataFeature, error: TablescopeError) -> TablescopeError {
        classify(feature, error, self.connection.is_closed())
    }
}

/// Sorts driver errors into connectivity problems, missing features and everything else.
pub(in crate::metadata::postgres) fn classify(feature: MetadataFeature, error: TablescopeError, connection_closed: bool) -> TablescopeError {
    let TablescopeError::PostgresErrorWithQuery { query, source } = error else {
        return error;
    };

    if source.is_closed() || connection_closed {
        return TablescopeError::Connectivity(source.to_string());
    }

    match source.code() {
        None => TablescopeError::Connectivity(source.to_string()),
        Some(code)
            if *code == SqlState::FEATURE_NOT_SUPPORTED
                || *code == SqlState::UNDEFINED_FUNCTION
                || *code == SqlState::UNDEFINED_TABLE
                || *code == SqlState::UNDEFINED_COLUMN
                || *code == SqlState::INSUFFICIENT_PRIVILEGE =>
        {
            TablescopeError::UnsupportedFeature {
                vendor: Vendor::Postgres,
                feature,
                reason: source.to_string(),
            }
        }
        Some(code) if code.code().starts_with("08") || code.code().starts_with("57P") => {
            TablescopeError::Connectivity(source.to_string())
        }
        Some(_) => TablescopeError::PostgresErrorWithQuery { query, source },
    }
}

fn table_params(table: &TableRef) -> (&str, &str) {
    (table.schema.as_deref().unwrap_or("public"), table.name.as_str())
}

#[async_trait]
impl MetadataAccess for PostgresMetadata {
    fn vendor(&self) -> Vendor {
        Vendor::Postgres
    }

    #[instrument(skip_all)]
    async fn product(&self) -> Result<DatabaseProduct> {
        let version: String = self
            .connection
            .get_single_result("select current_setting('server_version');", &[])
            .await
            .map_err(|e| self.classify(MetadataFeature::Product, e))?;

        Ok(DatabaseProduct::new(Vendor::Postgres, "PostgreSQL", &version))
    }

    async fn list_tables(&self, catalog_pattern: Option<&str>, schema_pattern: Option<&str>) -> Result<Vec<TableDescriptor>> {
        let tables = self.get_tables(catalog_pattern, schema_pattern).await?;
        Ok(tables.into_iter().map(|t| t.into_descriptor()).collect())
    }

    async fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>> {
        let (schema, name) = table_params(table);
        let columns = self.get_columns(Some(schema), Some(name)).await?;

        Ok(columns
            .into_iter()
            .map(|c| {
                let identity = match c.identity {
                    Some(identity) => Some(identity),
                    None if c.default_value.as_deref().is_some_and(|d| d.starts_with("nextval(")) => Some(ColumnIdentity::Serial),
                    None => None,
                };

                ColumnDescriptor {
                    name: c.column_name,
                    data_type: c.data_type,
                    is_nullable: c.is_nullable,
                    default_value: c.default_value,
                    ordinal_position: c.ordinal_position as i32,
                    remarks: c.comment,
                    identity,
                }
            })
            .collect())
    }

    async fn list_primary_keys(&self, table: &TableRef) -> Result<Vec<PrimaryKeyDescriptor>> {
        let (schema, name) = table_params(table);
        let keys = self.get_primary_keys(Some(schema), Some(name)).await?;

        Ok(keys
            .into_iter()
            .map(|k| PrimaryKeyDescriptor {
                name: Some(k.constraint_name),
                column_name: k.column_name,
                key_sequence: k.key_sequence,
            })
            .collect())
    }

    async fn list_imported_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyDescriptor>> {
        let (schema, name) = table_params(table);
        let rows = self.get_foreign_keys(Some(schema), Some(name)).await?;

        let keys = rows
            .into_iter()
            .chunk_by(|r| r.constraint_name.clone())
            .into_iter()
            .filter_map(|(constraint_name, rows)| {
                let rows = rows.collect_vec();
                let first = rows.first()?;

                let parent = TableRef::new(
                    Some(first.target_catalog_name.clone()),
                    Some(first.target_schema_name.clone()),
                    first.target_table_name.clone(),
                );

                let descriptor = rows.iter().fold(
                    ForeignKeyDescriptor::new(&constraint_name, parent)
                        .on_update(first.update_action)
                        .on_delete(first.delete_action),
                    |fk, row| fk.column(&row.source_column_name, &row.target_column_name),
                );

                Some(descriptor)
            })
            .collect();

        Ok(keys)
    }

    async fn list_indexes(&self, table: &TableRef) -> Result<Vec<IndexDescriptor>> {
        let (schema, name) = table_params(table);
        let rows = self.get_indexes(Some(schema), Some(name)).await?;

        let indexes = rows
            .into_iter()
            .chunk_by(|r| r.index_name.clone())
            .into_iter()
            .map(|(index_name, rows)| {
                let rows = rows.collect_vec();
                let is_unique = rows.iter().any(|r| r.is_unique);
                let is_primary = rows.iter().any(|r| r.is_primary);
                let predicate = rows.iter().find_map(|r| r.predicate.clone());

                let index = IndexDescriptor {
                    is_unique: is_unique || is_primary,
                    is_primary,
                    predicate,
                    ..IndexDescriptor::new(&index_name)
                };

                rows.into_iter().fold(index, |index, row| match (row.column_name, row.expression) {
                    (Some(column), _) => index.column(&column),
                    (None, expression) => index.expression(&expression.unwrap_or_default()),
                })
            })
            .collect();

        Ok(indexes)
    }

    async fn view_definition(&self, table: &TableRef) -> Result<Option<String>> {
        let (schema, name) = table_params(table);
        let definitions = self.get_view_definitions(Some(schema), Some(name)).await?;

        Ok(definitions.into_iter().next().and_then(|v| v.definition))
    }

    async fn list_routines(&self, catalog_pattern: Option<&str>, schema_pattern: Option<&str>) -> Result<Vec<RoutineDescriptor>> {
        let routines = self.get_routines(catalog_pattern, schema_pattern).await?;
        Ok(routines.into_iter().map(|r| r.into_descriptor()).collect())
    }

    #[instrument(skip_all)]
    async fn reserved_words(&self) -> Result<Vec<String>> {
        match self
            .connection
            .get_single_results::<String>("select word from pg_catalog.pg_get_keywords() where catcode = 'R';", &[])
            .await
        {
            Ok(words) => Ok(words),
            Err(e) => {
                let e = self.classify(MetadataFeature::ReservedWords, e);
                if e.is_unsupported_feature() {
                    warn!("Could not read keywords from the server, using the built-in list: {}", e);
                    Ok(Vec::new())
                } else {
                    Err(e)
                }
            }
        }
    }
}

/// Defines a metadata query taking two optional text parameters.
macro_rules! define_metadata_query {
    ($fn_name:ident, $feature:expr, $result:ident, $query:literal) => {
        impl $crate::metadata::postgres::PostgresMetadata {
            #[tracing::instrument(skip_all)]
            pub(in crate::metadata::postgres) async fn $fn_name(
                &self,
                first: Option<&str>,
                second: Option<&str>,
            ) -> $crate::Result<Vec<$result>> {
                self.query($feature, $query, &[&first, &second]).await
            }
        }
    };
}

pub(crate) use define_metadata_query;
