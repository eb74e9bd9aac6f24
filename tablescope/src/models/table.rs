use std::collections::HashSet;
use itertools::Itertools;
use serde::Serialize;
use crate::{Anomaly, AnomalyKind, ForeignKeyConstraint, ForeignKeyReference, LookupCase, TableColumn, TableIndex, TableRef};

/// Position of a table in its [`crate::Database`].
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct TableId(pub(crate) usize);

impl TableId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TableKind {
    #[default]
    Table,
    /// Views are read-only tables.
    View {
        definition: Option<String>,
        materialized: bool,
    },
}

#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct Table {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
    pub remarks: Option<String>,
    pub kind: TableKind,
    pub columns: Vec<TableColumn>,
    /// Primary key column names in key order.
    pub primary_key: Vec<String>,
    pub primary_key_name: Option<String>,
    pub indexes: Vec<TableIndex>,
    pub foreign_keys: Vec<ForeignKeyConstraint>,
    /// Foreign keys in other tables pointing at this one. Rebuilt by every resolution pass.
    pub referenced_by: Vec<ForeignKeyReference>,
    pub row_count: Option<i64>,
    #[serde(skip)]
    pub(crate) column_case: LookupCase,
}

impl Table {
    pub fn new(catalog: Option<String>, schema: Option<String>, name: impl Into<String>, column_case: LookupCase) -> Self {
        Self {
            catalog,
            schema,
            name: name.into(),
            remarks: None,
            kind: TableKind::Table,
            columns: Vec::new(),
            primary_key: Vec::new(),
            primary_key_name: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            referenced_by: Vec::new(),
            row_count: None,
            column_case,
        }
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.catalog.clone(), self.schema.clone(), self.name.clone())
    }

    pub fn qualified_name(&self) -> String {
        self.table_ref().to_string()
    }

    pub fn is_view(&self) -> bool {
        matches!(self.kind, TableKind::View { .. })
    }

    pub fn view_definition(&self) -> Option<&str> {
        match &self.kind {
            TableKind::View { definition, .. } => definition.as_deref(),
            TableKind::Table => None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| self.column_case.names_equal(&c.name, name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn index(&self, name: &str) -> Option<&TableIndex> {
        self.indexes.iter().find(|i| self.column_case.names_equal(&i.name, name))
    }

    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKeyConstraint> {
        self.foreign_keys.iter().find(|f| self.column_case.names_equal(&f.name, name))
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &TableColumn> {
        self.columns.iter().filter(|c| c.is_primary)
    }

    pub fn column_names_equal(&self, left: &str, right: &str) -> bool {
        self.column_case.names_equal(left, right)
    }

    /// Replaces the columns, keeping vendor order but closing gaps in the ordinal positions.
    ///
    /// Columns whose name collides with an earlier one under the table's case rules are dropped.
    pub fn set_columns(&mut self, mut columns: Vec<TableColumn>) -> Vec<Anomaly> {
        columns.sort_by_key(|c| c.ordinal_position);

        let mut seen = HashSet::with_capacity(columns.len());
        let mut anomalies = Vec::new();
        let mut kept = Vec::with_capacity(columns.len());

        for column in columns {
            if seen.insert(self.column_case.fold(&column.name)) {
                kept.push(column);
            } else {
                anomalies.push(Anomaly::new(
                    AnomalyKind::DuplicateColumn,
                    Some(self.qualified_name()),
                    format!("column `{}` is reported more than once", column.name),
                ));
            }
        }

        for (idx, column) in kept.iter_mut().enumerate() {
            column.ordinal_position = idx as i32 + 1;
        }

        self.columns = kept;
        anomalies
    }

    /// Sets the primary key. `columns` must already be in key order.
    pub fn set_primary_key(&mut self, name: Option<String>, columns: Vec<String>) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        let mut key = Vec::with_capacity(columns.len());

        for column_name in columns {
            match self.column(&column_name) {
                Some(column) => {
                    if !key.iter().any(|k: &String| self.column_case.names_equal(k, &column.name)) {
                        key.push(column.name.clone());
                    }
                }
                None => anomalies.push(Anomaly::new(
                    AnomalyKind::UnknownPrimaryKeyColumn,
                    Some(self.qualified_name()),
                    format!("primary key column `{}` does not exist", column_name),
                )),
            }
        }

        self.primary_key_name = if key.is_empty() { None } else { name };
        self.primary_key = key;
        anomalies
    }

    /// Sets the indexes. An index naming a column this table doesn't have is dropped whole.
    pub fn set_indexes(&mut self, indexes: Vec<TableIndex>) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        let indexes = indexes
            .into_iter()
            .unique_by(|i| self.column_case.fold(&i.name))
            .filter_map(|mut index| {
                let mut columns = Vec::with_capacity(index.columns.len());
                let mut unknown = Vec::new();
                for column_name in &index.columns {
                    match self.column(column_name) {
                        Some(column) => columns.push(column.name.clone()),
                        None => unknown.push(column_name.as_str()),
                    }
                }

                if !unknown.is_empty() {
                    anomalies.push(Anomaly::new(
                        AnomalyKind::UnknownIndexColumn,
                        Some(self.qualified_name()),
                        format!("index `{}` names unknown columns `{}` and was left out", index.name, unknown.join("`, `")),
                    ));
                    return None;
                }

                if columns.is_empty() && !index.has_expressions() {
                    return None;
                }

                index.columns = columns;
                Some(index)
            })
            .collect_vec();

        self.indexes = indexes;
        anomalies
    }

    pub fn set_foreign_keys(&mut self, foreign_keys: Vec<ForeignKeyConstraint>) {
        let case = self.column_case;
        self.foreign_keys = foreign_keys
            .into_iter()
            .unique_by(|f| case.fold(&f.name))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexExpression;

    fn table() -> Table {
        Table::new(Some("TEST 1.0".to_string()), None, "TABLE 1.0", LookupCase::Insensitive)
    }

    #[test]
    fn closes_gaps_in_ordinal_positions() {
        let mut table = table();
        let anomalies = table.set_columns(vec![
            TableColumn::new("name", "varchar", 4),
            TableColumn::new("id", "int", 1),
            TableColumn::new("link id", "int", 7),
        ]);

        assert!(anomalies.is_empty());
        let columns = table.columns.iter().map(|c| (c.name.as_str(), c.ordinal_position)).collect_vec();
        assert_eq!(columns, vec![("id", 1), ("name", 2), ("link id", 3)]);
    }

    #[test]
    fn drops_columns_that_only_differ_in_case() {
        let mut table = table();
        let anomalies = table.set_columns(vec![
            TableColumn::new("Name", "varchar", 1),
            TableColumn::new("name", "varchar", 2),
        ]);

        assert_eq!(table.columns.len(), 1);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::DuplicateColumn);
    }

    #[test]
    fn keeps_columns_that_differ_in_case_for_case_sensitive_vendors() {
        let mut table = Table::new(None, Some("public".to_string()), "t", LookupCase::Sensitive);
        let anomalies = table.set_columns(vec![
            TableColumn::new("Name", "text", 1),
            TableColumn::new("name", "text", 2),
        ]);

        assert!(anomalies.is_empty());
        assert_eq!(table.columns.len(), 2);
    }

    fn index(name: &str, columns: &[&str], expressions: Vec<IndexExpression>) -> TableIndex {
        TableIndex {
            name: name.to_string(),
            is_unique: true,
            is_primary: false,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            expressions,
            predicate: None,
        }
    }

    #[test]
    fn indexes_with_unknown_columns_are_dropped_whole() {
        let mut table = table();
        table.set_columns(vec![TableColumn::new("name", "varchar", 1)]);

        let anomalies = table.set_indexes(vec![
            index("name_link_unique", &["NAME", "missing"], Vec::new()),
            index("only_missing", &["missing"], Vec::new()),
            index("name_unique", &["NAME"], Vec::new()),
        ]);

        assert_eq!(anomalies.len(), 2);
        assert!(anomalies.iter().all(|a| a.kind == AnomalyKind::UnknownIndexColumn));
        assert_eq!(table.indexes.len(), 1);
        assert_eq!(table.indexes[0].name, "name_unique");
        assert_eq!(table.indexes[0].columns, vec!["name".to_string()]);
    }

    #[test]
    fn expression_members_are_kept() {
        let mut table = table();
        table.set_columns(vec![
            TableColumn::new("name", "varchar", 1),
            TableColumn::new("email", "varchar", 2),
        ]);

        let anomalies = table.set_indexes(vec![
            index("name_lower_email", &["name"], vec![IndexExpression::new(2, "lower(email)")]),
            index("email_lower_unique", &[], vec![IndexExpression::new(1, "lower(email)")]),
        ]);

        assert!(anomalies.is_empty());
        assert_eq!(table.indexes.len(), 2);
        let mixed = table.index("name_lower_email").unwrap();
        assert_eq!(mixed.columns, vec!["name".to_string()]);
        assert_eq!(mixed.expressions, vec![IndexExpression::new(2, "lower(email)")]);
        let computed = table.index("email_lower_unique").unwrap();
        assert!(computed.columns.is_empty());
        assert_eq!(computed.expressions[0].definition, "lower(email)");
    }

    #[test]
    fn primary_key_uses_stored_column_names() {
        let mut table = table();
        table.set_columns(vec![TableColumn::new("id", "int", 1)]);

        let anomalies = table.set_primary_key(Some("PRIMARY".to_string()), vec!["ID".to_string(), "nope".to_string()]);

        assert_eq!(table.primary_key, vec!["id".to_string()]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::UnknownPrimaryKeyColumn);
    }
}
