use tokio_postgres::Row;
use crate::metadata::postgres::{define_metadata_query, FromRow, RowEnumExt};
use crate::metadata::MetadataFeature;
use crate::ReferenceAction;

/// One column pair of a foreign key. Rows of the same constraint are adjacent and in key order.
pub struct ForeignKeyResult {
    pub constraint_name: String,
    pub target_catalog_name: String,
    pub target_schema_name: String,
    pub target_table_name: String,
    pub source_column_name: String,
    pub target_column_name: String,
    pub update_action: ReferenceAction,
    pub delete_action: ReferenceAction,
}

impl FromRow for ForeignKeyResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Self {
            constraint_name: row.try_get(0)?,
            target_catalog_name: row.try_get(1)?,
            target_schema_name: row.try_get(2)?,
            target_table_name: row.try_get(3)?,
            source_column_name: row.try_get(4)?,
            target_column_name: row.try_get(5)?,
            update_action: row.try_get_enum_value(6)?,
            delete_action: row.try_get_enum_value(7)?,
        })
    }
}

//language=postgresql
define_metadata_query!(get_foreign_keys, MetadataFeature::ImportedKeys, ForeignKeyResult, r#"
select con.conname::text            as constraint_name,
       current_database()::text     as target_catalog_name,
       target_ns.nspname::text      as target_schema_name,
       target.relname::text         as target_table_name,
       source_attr.attname::text    as source_column_name,
       target_attr.attname::text    as target_column_name,
       con.confupdtype              as update_action,
       con.confdeltype              as delete_action
from pg_catalog.pg_constraint con
         join pg_catalog.pg_class cl on cl.oid = con.conrelid
         join pg_catalog.pg_namespace ns on ns.oid = cl.relnamespace
         join pg_catalog.pg_class target on target.oid = con.confrelid
         join pg_catalog.pg_namespace target_ns on target_ns.oid = target.relnamespace
         cross join lateral unnest(con.conkey, con.confkey) with ordinality as k(source_attnum, target_attnum, seq)
         join pg_catalog.pg_attribute source_attr on source_attr.attrelid = con.conrelid and source_attr.attnum = k.source_attnum
         join pg_catalog.pg_attribute target_attr on target_attr.attrelid = con.confrelid and target_attr.attnum = k.target_attnum
where con.contype = 'f'
  and ns.nspname = $1::text
  and cl.relname = $2::text
order by con.conname, k.seq;
"#);
