use tokio_postgres::Row;
use crate::metadata::postgres::{define_metadata_query, FromRow};
use crate::metadata::MetadataFeature;

/// One key member of an index. Expression members have no `column_name` but an `expression`.
pub struct IndexColumnResult {
    pub index_name: String,
    pub is_unique: bool,
    pub is_primary: bool,
    pub column_name: Option<String>,
    pub expression: Option<String>,
    pub predicate: Option<String>,
}

impl FromRow for IndexColumnResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Self {
            index_name: row.try_get(0)?,
            is_unique: row.try_get(1)?,
            is_primary: row.try_get(2)?,
            column_name: row.try_get(3)?,
            expression: row.try_get(4)?,
            predicate: row.try_get(5)?,
        })
    }
}

//language=postgresql
define_metadata_query!(get_indexes, MetadataFeature::Indexes, IndexColumnResult, r#"
select index_class.relname::text as index_name,
       i.indisunique             as is_unique,
       i.indisprimary            as is_primary,
       attr.attname::text        as column_name,
       case when k.attnum = 0
                then pg_catalog.pg_get_indexdef(i.indexrelid, k.seq::int, true)
           end                   as expression,
       pg_catalog.pg_get_expr(i.indpred, i.indrelid, true) as predicate
from pg_catalog.pg_index i
         join pg_catalog.pg_class cl on cl.oid = i.indrelid
         join pg_catalog.pg_namespace ns on ns.oid = cl.relnamespace
         join pg_catalog.pg_class index_class on index_class.oid = i.indexrelid
         cross join lateral unnest(i.indkey::int2[]) with ordinality as k(attnum, seq)
         left join pg_catalog.pg_attribute attr on attr.attrelid = i.indrelid and attr.attnum = k.attnum
where ns.nspname = $1::text
  and cl.relname = $2::text
  and k.seq <= i.indnkeyatts
order by index_class.relname, k.seq;
"#);
