use tokio_postgres::Row;
use crate::metadata::postgres::{define_metadata_query, FromRow, RowEnumExt};
use crate::metadata::MetadataFeature;
use crate::ColumnIdentity;

pub struct TableColumnResult {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub ordinal_position: i16,
    pub comment: Option<String>,
    pub identity: Option<ColumnIdentity>,
}

impl FromRow for TableColumnResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Self {
            column_name: row.try_get(0)?,
            data_type: row.try_get(1)?,
            is_nullable: row.try_get(2)?,
            default_value: row.try_get(3)?,
            ordinal_position: row.try_get(4)?,
            comment: row.try_get(5)?,
            identity: row.try_get_opt_enum_value(6)?,
        })
    }
}

//language=postgresql
define_metadata_query!(get_columns, MetadataFeature::Columns, TableColumnResult, r#"
select attr.attname::text                                   as column_name,
       pg_catalog.format_type(attr.atttypid, attr.atttypmod) as data_type,
       not attr.attnotnull                                  as is_nullable,
       pg_catalog.pg_get_expr(def.adbin, def.adrelid)       as default_value,
       attr.attnum                                          as ordinal_position,
       des.description                                      as comment,
       nullif(attr.attidentity, ''::"char")                 as identity
from pg_catalog.pg_attribute attr
         join pg_catalog.pg_class cl on cl.oid = attr.attrelid
         join pg_catalog.pg_namespace ns on ns.oid = cl.relnamespace
         left join pg_catalog.pg_attrdef def on def.adrelid = attr.attrelid and def.adnum = attr.attnum
         left join pg_catalog.pg_description des
                   on des.objoid = cl.oid and des.objsubid = attr.attnum and des.classoid = 'pg_class'::regclass
where ns.nspname = $1::text
  and cl.relname = $2::text
  and attr.attnum > 0
  and not attr.attisdropped
order by attr.attnum;
"#);
