use std::fmt::{Display, Formatter};
use serde::Serialize;
use crate::metadata::postgres::FromPgChar;
use crate::{ColumnIdentity, IndexExpression, ReferenceAction, RoutineKind, TablescopeError, Vendor};

/// Identifies one table or view in a metadata call.
#[derive(Debug, Eq, PartialEq, Hash, Clone, Serialize)]
pub struct TableRef {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(catalog: Option<String>, schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            catalog,
            schema,
            name: name.into(),
        }
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.catalog, &self.schema) {
            (_, Some(schema)) => write!(f, "{}.{}", schema, self.name),
            (Some(catalog), None) => write!(f, "{}.{}", catalog, self.name),
            (None, None) => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub enum RelationKind {
    #[default]
    Table,
    View,
    MaterializedView,
}

impl RelationKind {
    pub fn is_view(&self) -> bool {
        !matches!(self, RelationKind::Table)
    }
}

impl FromPgChar for RelationKind {
    fn from_pg_char(c: char) -> Result<Self, TablescopeError> {
        match c {
            'r' | 'p' | 'f' => Ok(RelationKind::Table),
            'v' => Ok(RelationKind::View),
            'm' => Ok(RelationKind::MaterializedView),
            _ => Err(TablescopeError::UnknownTableKind(c.to_string())),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct TableDescriptor {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
    pub kind: RelationKind,
    pub remarks: Option<String>,
    pub row_count: Option<i64>,
}

impl TableDescriptor {
    pub fn new(catalog: Option<&str>, schema: Option<&str>, name: &str) -> Self {
        Self {
            catalog: catalog.map(str::to_string),
            schema: schema.map(str::to_string),
            name: name.to_string(),
            kind: RelationKind::Table,
            remarks: None,
            row_count: None,
        }
    }

    pub fn view(mut self) -> Self {
        self.kind = RelationKind::View;
        self
    }

    pub fn remarks(mut self, remarks: &str) -> Self {
        self.remarks = Some(remarks.to_string());
        self
    }

    pub fn row_count(mut self, rows: i64) -> Self {
        self.row_count = Some(rows);
        self
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.catalog.clone(), self.schema.clone(), self.name.clone())
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    /// As reported by the vendor. May have gaps.
    pub ordinal_position: i32,
    pub remarks: Option<String>,
    pub identity: Option<ColumnIdentity>,
}

impl ColumnDescriptor {
    pub fn new(name: &str, data_type: &str, ordinal_position: i32) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: true,
            default_value: None,
            ordinal_position,
            remarks: None,
            identity: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn default_value(mut self, default_value: &str) -> Self {
        self.default_value = Some(default_value.to_string());
        self
    }

    pub fn identity(mut self, identity: ColumnIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// One column of a primary key.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct PrimaryKeyDescriptor {
    pub name: Option<String>,
    pub column_name: String,
    /// 1-based position of the column in the key.
    pub key_sequence: i32,
}

impl PrimaryKeyDescriptor {
    pub fn new(name: Option<&str>, column_name: &str, key_sequence: i32) -> Self {
        Self {
            name: name.map(str::to_string),
            column_name: column_name.to_string(),
            key_sequence,
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct ForeignKeyColumnPair {
    pub child_column: String,
    pub parent_column: String,
}

impl ForeignKeyColumnPair {
    pub fn new(child_column: impl Into<String>, parent_column: impl Into<String>) -> Self {
        Self {
            child_column: child_column.into(),
            parent_column: parent_column.into(),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ForeignKeyDescriptor {
    pub name: String,
    pub parent: TableRef,
    pub columns: Vec<ForeignKeyColumnPair>,
    pub update_rule: ReferenceAction,
    pub delete_rule: ReferenceAction,
}

impl ForeignKeyDescriptor {
    pub fn new(name: &str, parent: TableRef) -> Self {
        Self {
            name: name.to_string(),
            parent,
            columns: Vec::new(),
            update_rule: ReferenceAction::NoAction,
            delete_rule: ReferenceAction::NoAction,
        }
    }

    pub fn column(mut self, child_column: &str, parent_column: &str) -> Self {
        self.columns.push(ForeignKeyColumnPair::new(child_column, parent_column));
        self
    }

    pub fn on_update(mut self, action: ReferenceAction) -> Self {
        self.update_rule = action;
        self
    }

    pub fn on_delete(mut self, action: ReferenceAction) -> Self {
        self.delete_rule = action;
        self
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub is_unique: bool,
    pub is_primary: bool,
    pub columns: Vec<String>,
    pub expressions: Vec<IndexExpression>,
    pub predicate: Option<String>,
}

impl IndexDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_unique: false,
            is_primary: false,
            columns: Vec::new(),
            expressions: Vec::new(),
            predicate: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.is_unique = true;
        self
    }

    pub fn column(mut self, column: &str) -> Self {
        self.columns.push(column.to_string());
        self
    }

    /// Adds a computed key member after the members added so far.
    pub fn expression(mut self, definition: &str) -> Self {
        let position = self.columns.len() + self.expressions.len() + 1;
        self.expressions.push(IndexExpression::new(position, definition));
        self
    }

    pub fn partial(mut self, predicate: &str) -> Self {
        self.predicate = Some(predicate.to_string());
        self
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct RoutineDescriptor {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
    pub kind: RoutineKind,
    pub return_type: Option<String>,
    pub language: Option<String>,
    pub definition: Option<String>,
    pub remarks: Option<String>,
}

impl RoutineDescriptor {
    pub fn new(catalog: Option<&str>, schema: Option<&str>, name: &str, kind: RoutineKind) -> Self {
        Self {
            catalog: catalog.map(str::to_string),
            schema: schema.map(str::to_string),
            name: name.to_string(),
            kind,
            return_type: None,
            language: None,
            definition: None,
            remarks: None,
        }
    }
}

/// What the connection reports about the server.
#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct DatabaseProduct {
    pub vendor: Vendor,
    pub name: String,
    pub version: String,
}

impl DatabaseProduct {
    pub fn new(vendor: Vendor, name: &str, version: &str) -> Self {
        Self {
            vendor,
            name: name.to_string(),
            version: version.to_string(),
        }
    }
}

/// The kinds of metadata a [`crate::MetadataAccess`] provides.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFeature {
    Product,
    Tables,
    Columns,
    PrimaryKeys,
    ImportedKeys,
    Indexes,
    ViewDefinitions,
    Routines,
    ReservedWords,
}

impl Display for MetadataFeature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MetadataFeature::Product => "product",
            MetadataFeature::Tables => "table",
            MetadataFeature::Columns => "column",
            MetadataFeature::PrimaryKeys => "primary key",
            MetadataFeature::ImportedKeys => "foreign key",
            MetadataFeature::Indexes => "index",
            MetadataFeature::ViewDefinitions => "view definition",
            MetadataFeature::Routines => "routine",
            MetadataFeature::ReservedWords => "keyword",
        })
    }
}
