use tokio_postgres::Row;
use crate::metadata::postgres::{define_metadata_query, FromRow, RowEnumExt};
use crate::metadata::{MetadataFeature, RoutineDescriptor};
use crate::RoutineKind;

pub struct RoutineResult {
    pub catalog_name: String,
    pub schema_name: String,
    pub routine_name: String,
    pub kind: RoutineKind,
    pub return_type: Option<String>,
    pub language: String,
    pub definition: Option<String>,
    pub comment: Option<String>,
}

impl FromRow for RoutineResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(Self {
            catalog_name: row.try_get(0)?,
            schema_name: row.try_get(1)?,
            routine_name: row.try_get(2)?,
            kind: row.try_get_enum_value(3)?,
            return_type: row.try_get(4)?,
            language: row.try_get(5)?,
            definition: row.try_get(6)?,
            comment: row.try_get(7)?,
        })
    }
}

impl RoutineResult {
    pub fn into_descriptor(self) -> RoutineDescriptor {
        RoutineDescriptor {
            catalog: Some(self.catalog_name),
            schema: Some(self.schema_name),
            name: self.routine_name,
            kind: self.kind,
            return_type: self.return_type,
            language: Some(self.language),
            definition: self.definition,
            remarks: self.comment,
        }
    }
}

// Routines installed by extensions are left out, they are not part of the user's schema.
//language=postgresql
define_metadata_query!(get_routines, MetadataFeature::Routines, RoutineResult, r#"
select current_database()::text                                                   as catalog_name,
       ns.nspname::text                                                           as schema_name,
       proc.proname::text                                                         as routine_name,
       proc.prokind                                                               as kind,
       case when proc.prokind <> 'p' then pg_catalog.pg_get_function_result(proc.oid) end as return_type,
       lang.lanname::text                                                         as language,
       proc.prosrc                                                                as definition,
       des.description                                                            as comment
from pg_catalog.pg_proc proc
         join pg_catalog.pg_namespace ns on ns.oid = proc.pronamespace
         join pg_catalog.pg_language lang on lang.oid = proc.prolang
         left join pg_catalog.pg_description des
                   on des.objoid = proc.oid and des.objsubid = 0 and des.classoid = 'pg_proc'::regclass
where ns.nspname not in ('pg_catalog', 'information_schema')
  and ns.nspname not like 'pg\_toast%'
  and not exists(select 1 from pg_catalog.pg_depend dep where dep.objid = proc.oid and dep.deptype = 'e')
  and ($1::text is null or current_database() like $1::text)
  and ($2::text is null or ns.nspname like $2::text)
order by ns.nspname, proc.proname;
"#);
