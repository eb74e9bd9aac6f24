use serde::Serialize;
use crate::metadata::postgres::FromPgChar;
use crate::{ForeignKeyColumnPair, TableId, TableRef, TablescopeError};

#[derive(Debug, Eq, PartialEq, Copy, Clone, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl FromPgChar for ReferenceAction {
    fn from_pg_char(c: char) -> Result<Self, TablescopeError> {
        match c {
            'a' => Ok(ReferenceAction::NoAction),
            'r' => Ok(ReferenceAction::Restrict),
            'c' => Ok(ReferenceAction::Cascade),
            'n' => Ok(ReferenceAction::SetNull),
            'd' => Ok(ReferenceAction::SetDefault),
            _ => Err(TablescopeError::UnknownReferenceAction(c.to_string())),
        }
    }
}

impl ReferenceAction {
    /// Parses the rule names used by `information_schema` and SQLite's pragmas.
    pub fn from_rule_name(rule: &str) -> Result<Self, TablescopeError> {
        match rule.trim().to_uppercase().as_str() {
            "NO ACTION" | "" => Ok(ReferenceAction::NoAction),
            "RESTRICT" => Ok(ReferenceAction::Restrict),
            "CASCADE" => Ok(ReferenceAction::Cascade),
            "SET NULL" => Ok(ReferenceAction::SetNull),
            "SET DEFAULT" => Ok(ReferenceAction::SetDefault),
            _ => Err(TablescopeError::UnknownReferenceAction(rule.to_string())),
        }
    }
}

/// The outcome of resolving a foreign key.
#[derive(Debug, Eq, PartialEq, Clone, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ReferenceStatus {
    #[default]
    Unresolved,
    Resolved,
    /// The parent table is not part of the graph.
    Orphaned,
    /// The parent exists, but some of the named columns don't.
    Ambiguous {
        missing_columns: Vec<String>,
    },
}

/// The key on the parent table a foreign key points at.
#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencedKey {
    PrimaryKey,
    UniqueIndex(String),
}

#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct ForeignKeyConstraint {
    pub name: String,
    /// (child column, parent column) pairs in key order.
    pub columns: Vec<ForeignKeyColumnPair>,
    pub parent: TableRef,
    #[serde(skip)]
    pub parent_table: Option<TableId>,
    pub update_rule: ReferenceAction,
    pub delete_rule: ReferenceAction,
    pub status: ReferenceStatus,
    pub referenced_key: Option<ReferencedKey>,
}

impl ForeignKeyConstraint {
    pub fn new(name: impl Into<String>, parent: TableRef) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            parent,
            parent_table: None,
            update_rule: ReferenceAction::NoAction,
            delete_rule: ReferenceAction::NoAction,
            status: ReferenceStatus::Unresolved,
            referenced_key: None,
        }
    }

    pub fn child_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.child_column.as_str())
    }

    pub fn parent_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.parent_column.as_str())
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ReferenceStatus::Resolved
    }

    pub fn is_orphaned(&self) -> bool {
        self.status == ReferenceStatus::Orphaned
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self.status, ReferenceStatus::Ambiguous { .. })
    }
}

/// An incoming edge: a foreign key in another table pointing at this one.
#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct ForeignKeyReference {
    pub table: TableRef,
    pub constraint: String,
    #[serde(skip)]
    pub table_id: TableId,
}

/// A likely relationship that is not declared as a foreign key.
#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct ImpliedRelationship {
    pub child: TableRef,
    pub child_column: String,
    pub parent: TableRef,
    pub parent_column: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_names() {
        assert_eq!(ReferenceAction::from_rule_name("SET NULL").unwrap(), ReferenceAction::SetNull);
        assert_eq!(ReferenceAction::from_rule_name("cascade").unwrap(), ReferenceAction::Cascade);
        assert_eq!(ReferenceAction::from_rule_name("NO ACTION").unwrap(), ReferenceAction::NoAction);
        assert!(ReferenceAction::from_rule_name("EXPLODE").is_err());
    }

    #[test]
    fn parses_pg_chars() {
        assert_eq!(ReferenceAction::from_pg_char('r').unwrap(), ReferenceAction::Restrict);
        assert_eq!(ReferenceAction::from_pg_char('d').unwrap(), ReferenceAction::SetDefault);
        assert!(ReferenceAction::from_pg_char('x').is_err());
    }
}
