use serde::Serialize;

/// A key member that is computed rather than a plain column, e.g. `lower(email)`.
#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct IndexExpression {
    /// 1-based position among all key members of the index.
    pub position: usize,
    pub definition: String,
}

impl IndexExpression {
    pub fn new(position: usize, definition: impl Into<String>) -> Self {
        Self {
            position,
            definition: definition.into(),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct TableIndex {
    pub name: String,
    pub is_unique: bool,
    pub is_primary: bool,
    /// Plain key columns in index order. Always columns of the owning table.
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<IndexExpression>,
    /// The `where` clause of a partial index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

impl TableIndex {
    pub fn has_expressions(&self) -> bool {
        !self.expressions.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        self.predicate.is_some()
    }

    /// Whether the index keys on exactly these columns over the whole table. Expression and
    /// partial indexes never do.
    pub fn covers_exactly<S: AsRef<str>>(&self, columns: &[S], names_equal: impl Fn(&str, &str) -> bool) -> bool {
        !self.has_expressions()
            && !self.is_partial()
            && self.columns.len() == columns.len()
            && columns
                .iter()
                .all(|wanted| self.columns.iter().any(|c| names_equal(c, wanted.as_ref())))
    }
}
