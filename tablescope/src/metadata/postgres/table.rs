use tokio_postgres::Row;
use crate::metadata::postgres::{define_metadata_query, FromRow, RowEnumExt};
use crate::metadata::{MetadataFeature, RelationKind, TableDescriptor};

pub struct TableResult {
    pub catalog_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub kind: RelationKind,
    pub comment: Option<String>,
    pub row_estimate: Option<i64>,
}

impl FromRow for TableResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Self {
            catalog_name: row.try_get(0)?,
            schema_name: row.try_get(1)?,
            table_name: row.try_get(2)?,
            kind: row.try_get_enum_value(3)?,
            comment: row.try_get(4)?,
            row_estimate: row.try_get(5)?,
        })
    }
}

impl TableResult {
    pub fn into_descriptor(self) -> TableDescriptor {
        TableDescriptor {
            catalog: Some(self.catalog_name),
            schema: Some(self.schema_name),
            name: self.table_name,
            kind: self.kind,
            remarks: self.comment,
            row_count: self.row_estimate,
        }
    }
}

//language=postgresql
define_metadata_query!(get_tables, MetadataFeature::Tables, TableResult, r#"
select current_database()::text                                            as catalog_name,
       ns.nspname::text                                                    as schema_name,
       cl.relname::text                                                    as table_name,
       cl.relkind                                                          as kind,
       des.description                                                     as comment,
       case when cl.reltuples < 0 then null else cl.reltuples::int8 end    as row_estimate
from pg_catalog.pg_class cl
         join pg_catalog.pg_namespace ns on ns.oid = cl.relnamespace
         left join pg_catalog.pg_description des
                   on des.objoid = cl.oid and des.objsubid = 0 and des.classoid = 'pg_class'::regclass
where cl.relkind in ('r', 'p', 'f', 'v', 'm')
  and not cl.relispartition
  and ns.nspname not in ('pg_catalog', 'information_schema')
  and ns.nspname not like 'pg\_toast%'
  and ($1::text is null or current_database() like $1::text)
  and ($2::text is null or ns.nspname like $2::text)
order by ns.nspname, cl.relname;
"#);
