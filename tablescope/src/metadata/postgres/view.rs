use tokio_postgres::Row;
use crate::metadata::postgres::{define_metadata_query, FromRow};
use crate::metadata::MetadataFeature;

pub struct ViewDefinitionResult {
    pub definition: Option<String>,
}

impl FromRow for ViewDefinitionResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Self {
            definition: row.try_get(0)?,
        })
    }
}

//language=postgresql
define_metadata_query!(get_view_definitions, MetadataFeature::ViewDefinitions, ViewDefinitionResult, r#"
select pg_catalog.pg_get_viewdef(cl.oid, true) as definition
from pg_catalog.pg_class cl
         join pg_catalog.pg_namespace ns on ns.oid = cl.relnamespace
where cl.relkind in ('v', 'm')
  and ns.nspname = $1::text
  and cl.relname = $2::text;
"#);
