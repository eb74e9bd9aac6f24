use std::fmt::{Display, Formatter};
use serde::Serialize;

#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// The vendor could not provide some metadata, the sub-collection was left empty.
    UnsupportedFeature,
    /// A foreign key whose parent table does not exist in the graph.
    OrphanedReference,
    /// A foreign key whose columns don't all exist on the child or parent table.
    AmbiguousReference,
    DuplicateColumn,
    UnknownIndexColumn,
    UnknownPrimaryKeyColumn,
}

impl Display for AnomalyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AnomalyKind::UnsupportedFeature => "unsupported feature",
            AnomalyKind::OrphanedReference => "orphaned reference",
            AnomalyKind::AmbiguousReference => "ambiguous reference",
            AnomalyKind::DuplicateColumn => "duplicate column",
            AnomalyKind::UnknownIndexColumn => "unknown index column",
            AnomalyKind::UnknownPrimaryKeyColumn => "unknown primary key column",
        })
    }
}

/// Something about the catalog that could not be represented faithfully.
#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// The qualified name of the affected table, if any.
    pub table: Option<String>,
    pub detail: String,
}

impl Anomaly {
    pub fn new(kind: AnomalyKind, table: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            table,
            detail: detail.into(),
        }
    }
}

impl Display for Anomaly {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{} on {}: {}", self.kind, table, self.detail),
            None => write!(f, "{}: {}", self.kind, self.detail),
        }
    }
}
