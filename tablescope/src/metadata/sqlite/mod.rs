use async_trait::async_trait;
use itertools::Itertools;
use rusqlite::{Connection, ErrorCode};
use tracing::instrument;
use crate::metadata::{
    ColumnDescriptor, DatabaseProduct, ForeignKeyDescriptor, IndexDescriptor, MetadataAccess, MetadataFeature,
    PrimaryKeyDescriptor, RelationKind, RoutineDescriptor, TableDescriptor, TableRef,
};
use crate::{ColumnIdentity, ReferenceAction, Result, TablescopeError, Vendor};

mod client_wrapper;

pub use client_wrapper::{FromSqliteRow, SqliteClientWrapper};

/// SQLite only has the `main` catalog for the database that was opened.
const MAIN_CATALOG: &str = "main";

/// Metadata access through `sqlite_master` and the `pragma_*` table-valued functions.
///
/// SQLite has no schemas, so tables only carry a catalog. Its listings can't be filtered by
/// pattern, the normalizer filters them in-process instead.
pub struct SqliteMetadata {
    connection: SqliteClientWrapper,
}

struct TableRow {
    name: String,
    kind: String,
}

impl FromSqliteRow for TableRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            kind: row.get(1)?,
        })
    }
}

struct ColumnRow {
    cid: i32,
    name: String,
    data_type: String,
    not_null: bool,
    default_value: Option<String>,
    pk: i32,
    table_sql: Option<String>,
}

impl FromSqliteRow for ColumnRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            cid: row.get(0)?,
            name: row.get(1)?,
            data_type: row.get(2)?,
            not_null: row.get(3)?,
            default_value: row.get(4)?,
            pk: row.get(5)?,
            table_sql: row.get(6)?,
        })
    }
}

struct ForeignKeyRow {
    id: i32,
    parent_table: String,
    from_column: String,
    to_column: Option<String>,
    on_update: String,
    on_delete: String,
}

impl FromSqliteRow for ForeignKeyRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_table: row.get(1)?,
            from_column: row.get(2)?,
            to_column: row.get(3)?,
            on_update: row.get(4)?,
            on_delete: row.get(5)?,
        })
    }
}

struct IndexRow {
    name: String,
    is_unique: bool,
    origin: String,
    sql: Option<String>,
}

impl FromSqliteRow for IndexRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            is_unique: row.get(1)?,
            origin: row.get(2)?,
            sql: row.get(3)?,
        })
    }
}

/// The key members and `where` clause of a `create index` statement, as written.
#[derive(Debug, Default, Eq, PartialEq)]
struct IndexSql {
    members: Vec<String>,
    predicate: Option<String>,
}

impl IndexSql {
    /// SQLite only reports expression members as unnamed, so their text comes from the statement.
    fn parse(sql: &str) -> Option<Self> {
        let mut quote = None;
        let mut depth = 0usize;
        let mut start = None;
        let mut members = Vec::new();

        for (idx, c) in sql.char_indices() {
            if let Some(closing) = quote {
                if c == closing {
                    quote = None;
                }
                continue;
            }

            match c {
                '"' | '\'' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => {
                    depth += 1;
                    if depth == 1 {
                        start = Some(idx + 1);
                    }
                }
                ',' if depth == 1 => {
                    members.push(sql[start?..idx].trim().to_string());
                    start = Some(idx + 1);
                }
                ')' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        members.push(sql[start?..idx].trim().to_string());

                        let rest = sql[idx + 1..].trim();
                        let predicate = rest
                            .get(..5)
                            .filter(|keyword| keyword.eq_ignore_ascii_case("where"))
                            .map(|_| rest[5..].trim().to_string())
                            .filter(|p| !p.is_empty());

                        return Some(Self { members, predicate });
                    }
                }
                _ => {}
            }
        }

        None
    }
}

impl SqliteMetadata {
    pub async fn open(path: &str) -> Result<Self> {
        Ok(Self {
            connection: SqliteClientWrapper::open(path).await?,
        })
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self {
            connection: SqliteClientWrapper::from_connection(connection),
        }
    }

    async fn query<T>(&self, feature: MetadataFeature, sql: &'static str, params: Vec<String>) -> Result<Vec<T>>
    where
        T: FromSqliteRow + Send + 'static,
    {
        self.connection
            .get_results(sql, params)
            .await
            .map_err(|e| classify(feature, e))
    }

    async fn primary_key_columns(&self, table: &str) -> Result<Vec<String>> {
        //language=sqlite
        let columns = self
            .query::<(String,)>(
                MetadataFeature::PrimaryKeys,
                "select name from pragma_table_info(?1) where pk > 0 order by pk;",
                vec![table.to_string()],
            )
            .await?;

        Ok(columns.into_iter().map(|c| c.0).collect())
    }
}

/// Sorts driver errors into connectivity problems, missing features and everything else.
fn classify(feature: MetadataFeature, error: TablescopeError) -> TablescopeError {
    let (code, message) = match &error {
        TablescopeError::SqliteErrorWithQuery {
            source: rusqlite::Error::SqliteFailure(failure, message),
            ..
        }
        | TablescopeError::SqliteError(rusqlite::Error::SqliteFailure(failure, message)) => (failure.code, message.clone()),
        _ => return error,
    };

    match code {
        ErrorCode::CannotOpen
        | ErrorCode::NotADatabase
        | ErrorCode::DatabaseBusy
        | ErrorCode::DatabaseLocked
        | ErrorCode::DatabaseCorrupt
        | ErrorCode::SystemIoFailure => TablescopeError::Connectivity(error.to_string()),
        _ => match message {
            Some(message)
                if message.starts_with("no such table")
                    || message.starts_with("no such function")
                    || message.starts_with("no such module") =>
            {
                TablescopeError::UnsupportedFeature {
                    vendor: Vendor::Sqlite,
                    feature,
                    reason: message,
                }
            }
            _ => error,
        },
    }
}

/// Only an `INTEGER PRIMARY KEY` of a rowid table aliases the rowid and is generated by SQLite.
fn is_rowid_alias(column: &ColumnRow, primary_key_count: usize) -> bool {
    let without_rowid = column
        .table_sql
        .as_deref()
        .is_some_and(|sql| sql.to_uppercase().contains("WITHOUT ROWID"));

    primary_key_count == 1 && column.pk == 1 && column.data_type.eq_ignore_ascii_case("INTEGER") && !without_rowid
}

#[async_trait]
impl MetadataAccess for SqliteMetadata {
    fn vendor(&self) -> Vendor {
        Vendor::Sqlite
    }

    #[instrument(skip_all)]
    async fn product(&self) -> Result<DatabaseProduct> {
        let version = self
            .query::<(String,)>(MetadataFeature::Product, "select sqlite_version();", vec![])
            .await?
            .into_iter()
            .next()
            .map(|v| v.0)
            .unwrap_or_default();

        Ok(DatabaseProduct::new(Vendor::Sqlite, "SQLite", &version))
    }

    #[instrument(skip_all)]
    async fn list_tables(&self, _catalog_pattern: Option<&str>, _schema_pattern: Option<&str>) -> Result<Vec<TableDescriptor>> {
        //language=sqlite
        let tables = self
            .query::<TableRow>(
                MetadataFeature::Tables,
                r#"
                select name, type
                from sqlite_master
                where type in ('table', 'view')
                  and name not like 'sqlite\_%' escape '\'
                order by name;
                "#,
                vec![],
            )
            .await?;

        Ok(tables
            .into_iter()
            .map(|t| TableDescriptor {
                catalog: Some(MAIN_CATALOG.to_string()),
                schema: None,
                name: t.name,
                kind: if t.kind == "view" { RelationKind::View } else { RelationKind::Table },
                remarks: None,
                row_count: None,
            })
            .collect())
    }

    #[instrument(skip_all)]
    async fn list_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>> {
        //language=sqlite
        let columns = self
            .query::<ColumnRow>(
                MetadataFeature::Columns,
                r#"
                select cid, name, type, "notnull", dflt_value, pk,
                       (select sql from sqlite_master where type = 'table' and name = ?1)
                from pragma_table_info(?1)
                order by cid;
                "#,
                vec![table.name.clone()],
            )
            .await?;

        let primary_key_count = columns.iter().filter(|c| c.pk > 0).count();

        Ok(columns
            .iter()
            .map(|c| ColumnDescriptor {
                name: c.name.clone(),
                data_type: c.data_type.clone(),
                is_nullable: !c.not_null,
                default_value: c.default_value.clone(),
                ordinal_position: c.cid + 1,
                remarks: None,
                identity: is_rowid_alias(c, primary_key_count).then_some(ColumnIdentity::AutoIncrement),
            })
            .collect())
    }

    #[instrument(skip_all)]
    async fn list_primary_keys(&self, table: &TableRef) -> Result<Vec<PrimaryKeyDescriptor>> {
        let columns = self.primary_key_columns(&table.name).await?;

        Ok(columns
            .into_iter()
            .enumerate()
            .map(|(idx, column)| PrimaryKeyDescriptor {
                name: None,
                column_name: column,
                key_sequence: idx as i32 + 1,
            })
            .collect())
    }

    /// SQLite doesn't keep constraint names, so keys are named `fk_{table}_{id}` after their
    /// position in the pragma output.
    #[instrument(skip_all)]
    async fn list_imported_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyDescriptor>> {
        //language=sqlite
        let rows = self
            .query::<ForeignKeyRow>(
                MetadataFeature::ImportedKeys,
                r#"select id, "table", "from", "to", on_update, on_delete from pragma_foreign_key_list(?1) order by id, seq;"#,
                vec![table.name.clone()],
            )
            .await?;

        let groups = rows
            .into_iter()
            .chunk_by(|r| r.id)
            .into_iter()
            .map(|(id, rows)| (id, rows.collect_vec()))
            .collect_vec();

        let mut keys = Vec::new();

        for (id, rows) in groups {
            let Some(first) = rows.first() else {
                continue;
            };

            // A reference without column names targets the parent's primary key
            let implicit_parent_columns = if rows.iter().any(|r| r.to_column.is_none()) {
                self.primary_key_columns(&first.parent_table).await?
            } else {
                Vec::new()
            };

            let parent = TableRef::new(Some(MAIN_CATALOG.to_string()), None, first.parent_table.clone());
            let mut fk = ForeignKeyDescriptor::new(&format!("fk_{}_{}", table.name, id), parent)
                .on_update(ReferenceAction::from_rule_name(&first.on_update)?)
                .on_delete(ReferenceAction::from_rule_name(&first.on_delete)?);

            for (idx, row) in rows.iter().enumerate() {
                let parent_column = match &row.to_column {
                    Some(column) => column.clone(),
                    None => implicit_parent_columns.get(idx).cloned().unwrap_or_default(),
                };
                fk = fk.column(&row.from_column, &parent_column);
            }

            keys.push(fk);
        }

        Ok(keys)
    }

    #[instrument(skip_all)]
    async fn list_indexes(&self, table: &TableRef) -> Result<Vec<IndexDescriptor>> {
        //language=sqlite
        let indexes = self
            .query::<IndexRow>(
                MetadataFeature::Indexes,
                r#"
                select il.name, il."unique", il.origin,
                       (select sql from sqlite_master where type = 'index' and name = il.name)
                from pragma_index_list(?1) il
                order by il.name;
                "#,
                vec![table.name.clone()],
            )
            .await?;

        let mut result = Vec::with_capacity(indexes.len());

        for index in indexes {
            //language=sqlite
            let members = self
                .query::<(Option<String>,)>(
                    MetadataFeature::Indexes,
                    "select name from pragma_index_info(?1) order by seqno;",
                    vec![index.name.clone()],
                )
                .await?;

            let is_primary = index.origin == "pk";
            let written = index.sql.as_deref().and_then(IndexSql::parse).unwrap_or_default();

            let descriptor = IndexDescriptor {
                is_unique: index.is_unique || is_primary,
                is_primary,
                predicate: written.predicate.clone(),
                ..IndexDescriptor::new(&index.name)
            };

            let descriptor = members.into_iter().enumerate().fold(descriptor, |descriptor, (seqno, member)| match member.0 {
                Some(column) => descriptor.column(&column),
                None => descriptor.expression(written.members.get(seqno).map(String::as_str).unwrap_or_default()),
            });

            result.push(descriptor);
        }

        Ok(result)
    }

    #[instrument(skip_all)]
    async fn view_definition(&self, table: &TableRef) -> Result<Option<String>> {
        //language=sqlite
        let definitions = self
            .query::<(Option<String>,)>(
                MetadataFeature::ViewDefinitions,
                "select sql from sqlite_master where type = 'view' and name = ?1;",
                vec![table.name.clone()],
            )
            .await?;

        Ok(definitions.into_iter().next().and_then(|d| d.0))
    }

    async fn list_routines(&self, _catalog_pattern: Option<&str>, _schema_pattern: Option<&str>) -> Result<Vec<RoutineDescriptor>> {
        // SQLite has no stored routines
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn scenario() -> SqliteMetadata {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(indoc! {r#"
                create table "TABLE 1.0" (
                    id integer primary key autoincrement,
                    name varchar(50) not null,
                    "link id" int,
                    constraint "link fk" foreign key ("link id") references "TABLE 1.0" (id) on delete cascade
                );

                create unique index name_link_unique on "TABLE 1.0" (name, "link id");

                create table tags (
                    label text,
                    owner int references "TABLE 1.0",
                    primary key (label, owner)
                ) without rowid;

                create view named as select id, name from "TABLE 1.0";
            "#})
            .unwrap();

        SqliteMetadata::from_connection(connection)
    }

    fn table(name: &str) -> TableRef {
        TableRef::new(Some(MAIN_CATALOG.to_string()), None, name)
    }

    #[tokio::test]
    async fn lists_tables_and_views_without_internal_tables() {
        let metadata = scenario();

        let tables = metadata.list_tables(None, None).await.unwrap();

        let names = tables.iter().map(|t| (t.name.as_str(), t.kind)).collect_vec();
        assert_eq!(
            names,
            vec![("TABLE 1.0", RelationKind::Table), ("named", RelationKind::View), ("tags", RelationKind::Table)]
        );
        assert!(tables.iter().all(|t| t.catalog.as_deref() == Some("main") && t.schema.is_none()));
    }

    #[tokio::test]
    async fn reads_columns_with_rowid_alias() {
        let metadata = scenario();

        let columns = metadata.list_columns(&table("TABLE 1.0")).await.unwrap();

        assert_eq!(
            columns,
            vec![
                ColumnDescriptor::new("id", "integer", 1).identity(ColumnIdentity::AutoIncrement),
                ColumnDescriptor::new("name", "varchar(50)", 2).not_null(),
                ColumnDescriptor::new("link id", "int", 3),
            ]
        );

        let tag_columns = metadata.list_columns(&table("tags")).await.unwrap();
        assert!(tag_columns.iter().all(|c| c.identity.is_none()));
    }

    #[tokio::test]
    async fn synthesizes_foreign_key_names_and_implicit_parent_columns() {
        let metadata = scenario();

        let keys = metadata.list_imported_keys(&table("TABLE 1.0")).await.unwrap();
        assert_eq!(
            keys,
            vec![ForeignKeyDescriptor::new("fk_TABLE 1.0_0", table("TABLE 1.0"))
                .column("link id", "id")
                .on_delete(ReferenceAction::Cascade)]
        );

        let tag_keys = metadata.list_imported_keys(&table("tags")).await.unwrap();
        assert_eq!(tag_keys[0].columns[0].parent_column, "id");
    }

    #[tokio::test]
    async fn reads_indexes_and_primary_keys() {
        let metadata = scenario();

        let indexes = metadata.list_indexes(&table("TABLE 1.0")).await.unwrap();
        assert_eq!(indexes, vec![IndexDescriptor::new("name_link_unique").unique().column("name").column("link id")]);

        let tag_indexes = metadata.list_indexes(&table("tags")).await.unwrap();
        assert_eq!(tag_indexes.len(), 1);
        assert!(tag_indexes[0].is_primary);

        let keys = metadata.list_primary_keys(&table("tags")).await.unwrap();
        assert_eq!(
            keys,
            vec![PrimaryKeyDescriptor::new(None, "label", 1), PrimaryKeyDescriptor::new(None, "owner", 2)]
        );
    }

    #[tokio::test]
    async fn keeps_expression_members_and_predicates() {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(indoc! {r#"
                create table accounts (id integer primary key, name text, email text, deleted_at text);
                create unique index name_lower_email on accounts (name, lower(email));
                create unique index email_lower_unique on accounts (lower(email));
                create unique index live_email on accounts (email) where deleted_at is null;
            "#})
            .unwrap();
        let metadata = SqliteMetadata::from_connection(connection);

        let indexes = metadata.list_indexes(&table("accounts")).await.unwrap();

        assert_eq!(
            indexes,
            vec![
                IndexDescriptor::new("email_lower_unique").unique().expression("lower(email)"),
                IndexDescriptor::new("live_email").unique().column("email").partial("deleted_at is null"),
                IndexDescriptor::new("name_lower_email").unique().column("name").expression("lower(email)"),
            ]
        );
    }

    #[test]
    fn parses_index_statements() {
        let parsed = IndexSql::parse(r#"CREATE INDEX "odd (name" ON "TABLE 1.0" ("link id", substr(name, 1, 3) DESC) WHERE "link id" > 0"#);

        assert_eq!(
            parsed,
            Some(IndexSql {
                members: vec![r#""link id""#.to_string(), "substr(name, 1, 3) DESC".to_string()],
                predicate: Some(r#""link id" > 0"#.to_string()),
            })
        );
        assert_eq!(IndexSql::parse("create index broken on t"), None);
    }

    #[tokio::test]
    async fn reads_view_definitions() {
        let metadata = scenario();

        let definition = metadata.view_definition(&table("named")).await.unwrap();

        let definition = definition.unwrap().to_lowercase();
        assert!(definition.starts_with("create view named"));
        assert!(definition.contains(r#"select id, name from "table 1.0""#));
    }

    #[tokio::test]
    async fn missing_files_are_connectivity_errors() {
        let result = SqliteMetadata::open("/definitely/not/here.sqlite").await;

        assert!(matches!(result, Err(e) if e.is_connectivity()));
    }
}
