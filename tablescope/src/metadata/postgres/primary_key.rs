use tokio_postgres::Row;
use crate::metadata::postgres::{define_metadata_query, FromRow};
use crate::metadata::MetadataFeature;

pub struct PrimaryKeyResult {
    pub constraint_name: String,
    pub column_name: String,
    pub key_sequence: i32,
}

impl FromRow for PrimaryKeyResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Self {
            constraint_name: row.try_get(0)?,
            column_name: row.try_get(1)?,
            key_sequence: row.try_get(2)?,
        })
    }
}

//language=postgresql
define_metadata_query!(get_primary_keys, MetadataFeature::PrimaryKeys, PrimaryKeyResult, r#"
select con.conname::text     as constraint_name,
       attr.attname::text    as column_name,
       k.seq::int4  as key_sequence
from pg_catalog.pg_constraint con
         join pg_catalog.pg_class cl on cl.oid = con.conrelid
         join pg_catalog.pg_namespace ns on ns.oid = cl.relnamespace
         cross join lateral unnest(con.conkey) with ordinality as k(attnum, seq)
         join pg_catalog.pg_attribute attr on attr.attrelid = con.conrelid and attr.attnum = k.attnum
where con.contype = 'p'
  and ns.nspname = $1::text
  and cl.relname = $2::text
order by k.seq;
"#);
