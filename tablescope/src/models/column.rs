use serde::Serialize;
use crate::metadata::postgres::FromPgChar;
use crate::TablescopeError;

/// How the database generates values for a column, as reported by the vendor.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnIdentity {
    /// `generated always as identity`
    Always,
    /// `generated by default as identity`
    ByDefault,
    /// MySQL `auto_increment` or an SQLite rowid alias.
    AutoIncrement,
    /// A default drawing from a sequence, such as Postgres `serial` columns.
    Serial,
}

impl FromPgChar for ColumnIdentity {
    fn from_pg_char(c: char) -> Result<Self, TablescopeError> {
        match c {
            'a' => Ok(ColumnIdentity::Always),
            'd' => Ok(ColumnIdentity::ByDefault),
            _ => Err(TablescopeError::UnknownColumnIdentity(c.to_string())),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    /// 1-based, contiguous within the table.
    pub ordinal_position: i32,
    pub remarks: Option<String>,
    pub identity: Option<ColumnIdentity>,
    /// Set by resolution.
    pub is_primary: bool,
    /// Set by resolution.
    pub is_auto_updated: bool,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal_position: i32) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default_value: None,
            ordinal_position,
            remarks: None,
            identity: None,
            is_primary: false,
            is_auto_updated: false,
        }
    }
}
