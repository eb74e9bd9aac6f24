use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, instrument};
use crate::{Anomaly, AnomalyKind, Database, ForeignKeyConstraint, ForeignKeyReference, ImpliedRelationship, ReferenceStatus, ReferencedKey, Table, TableId};

#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub struct ResolutionOptions {
    pub infer_implied_relationships: bool,
}

/// Counts from one resolution pass.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default, Serialize)]
pub struct ResolutionReport {
    pub resolved: usize,
    pub orphaned: usize,
    pub ambiguous: usize,
    pub implied: usize,
}

struct ForeignKeyOutcome {
    child: TableId,
    index: usize,
    parent: Option<TableId>,
    status: ReferenceStatus,
    referenced_key: Option<ReferencedKey>,
}

impl Database {
    /// Links foreign keys to their parent tables and derives per-column flags.
    ///
    /// Everything this computes is rebuilt from scratch, so running it again yields the same graph.
    #[instrument(skip_all)]
    pub fn resolve(&mut self, options: &ResolutionOptions) -> ResolutionReport {
        self.rebuild_lookup();
        self.resolution_anomalies.clear();
        self.implied_relationships.clear();

        for table in self.tables_mut() {
            table.referenced_by.clear();
            mark_columns(table);
        }

        let outcomes = self
            .tables()
            .iter()
            .enumerate()
            .flat_map(|(child_idx, child)| {
                child
                    .foreign_keys
                    .iter()
                    .enumerate()
                    .map(move |(index, fk)| (TableId(child_idx), child, index, fk))
            })
            .map(|(child_id, child, index, fk)| self.resolve_foreign_key(child_id, child, index, fk))
            .collect_vec();

        let mut report = ResolutionReport::default();

        for outcome in outcomes {
            let Some(child) = self.table_by_id(outcome.child) else {
                continue;
            };
            let child_name = child.qualified_name();
            let child_ref = child.table_ref();
            let Some(fk) = child.foreign_keys.get(outcome.index) else {
                continue;
            };
            let fk_name = fk.name.clone();
            let fk_parent = fk.parent.to_string();

            match &outcome.status {
                ReferenceStatus::Resolved => {
                    report.resolved += 1;
                }
                ReferenceStatus::Orphaned => {
                    report.orphaned += 1;
                    self.resolution_anomalies.push(Anomaly::new(
                        AnomalyKind::OrphanedReference,
                        Some(child_name),
                        format!("foreign key `{}` references `{}`, which is not part of the graph", fk_name, fk_parent),
                    ));
                }
                ReferenceStatus::Ambiguous { missing_columns } => {
                    report.ambiguous += 1;
                    self.resolution_anomalies.push(Anomaly::new(
                        AnomalyKind::AmbiguousReference,
                        Some(child_name),
                        format!("foreign key `{}` names columns that do not exist: {}", fk_name, missing_columns.join(", ")),
                    ));
                }
                ReferenceStatus::Unresolved => {}
            }

            if let (ReferenceStatus::Resolved, Some(parent_id)) = (&outcome.status, outcome.parent) {
                if let Some(parent) = self.table_by_id_mut(parent_id) {
                    parent.referenced_by.push(ForeignKeyReference {
                        table: child_ref,
                        constraint: fk_name,
                        table_id: outcome.child,
                    });
                }
            }

            if let Some(fk) = self
                .table_by_id_mut(outcome.child)
                .and_then(|c| c.foreign_keys.get_mut(outcome.index))
            {
                fk.parent_table = outcome.parent;
                fk.status = outcome.status;
                fk.referenced_key = outcome.referenced_key;
            }
        }

        if options.infer_implied_relationships {
            self.implied_relationships = self.infer_implied_relationships();
            report.implied = self.implied_relationships.len();
        }

        debug!(?report, "Resolved schema graph");

        report
    }

    fn resolve_foreign_key(&self, child_id: TableId, child: &Table, index: usize, fk: &ForeignKeyConstraint) -> ForeignKeyOutcome {
        let parent = self
            .find_table(&fk.parent)
            .and_then(|id| self.table_by_id(id).map(|t| (id, t)));

        let Some((parent_id, parent)) = parent else {
            return ForeignKeyOutcome {
                child: child_id,
                index,
                parent: None,
                status: ReferenceStatus::Orphaned,
                referenced_key: None,
            };
        };

        let missing_columns = fk
            .child_columns()
            .filter(|c| !child.has_column(c))
            .map(|c| format!("{}.{}", child.name, c))
            .chain(
                fk.parent_columns()
                    .filter(|c| !parent.has_column(c))
                    .map(|c| format!("{}.{}", parent.name, c)),
            )
            .collect_vec();

        if fk.columns.is_empty() || !missing_columns.is_empty() {
            return ForeignKeyOutcome {
                child: child_id,
                index,
                parent: Some(parent_id),
                status: ReferenceStatus::Ambiguous { missing_columns },
                referenced_key: None,
            };
        }

        ForeignKeyOutcome {
            child: child_id,
            index,
            parent: Some(parent_id),
            status: ReferenceStatus::Resolved,
            referenced_key: referenced_key(parent, fk),
        }
    }

    /// Non-key columns named and typed like the single-column primary key of another table.
    fn infer_implied_relationships(&self) -> Vec<ImpliedRelationship> {
        let parents = self
            .tables()
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_view())
            .filter_map(|(idx, t)| match t.primary_key.as_slice() {
                [key] => t.column(key).map(|c| (idx, t, c)),
                _ => None,
            })
            .collect_vec();

        let mut implied = Vec::new();

        for (child_idx, child) in self.tables().iter().enumerate() {
            for column in &child.columns {
                if column.is_primary
                    || child
                        .foreign_keys
                        .iter()
                        .any(|fk| fk.child_columns().any(|c| child.column_names_equal(c, &column.name)))
                {
                    continue;
                }

                for (parent_idx, parent, key) in &parents {
                    if *parent_idx == child_idx || !key.data_type.eq_ignore_ascii_case(&column.data_type) {
                        continue;
                    }

                    let prefixed = format!("{}_{}", parent.name, key.name);
                    if column.name.eq_ignore_ascii_case(&key.name) || column.name.eq_ignore_ascii_case(&prefixed) {
                        implied.push(ImpliedRelationship {
                            child: child.table_ref(),
                            child_column: column.name.clone(),
                            parent: parent.table_ref(),
                            parent_column: key.name.clone(),
                        });
                    }
                }
            }
        }

        implied
    }
}

fn mark_columns(table: &mut Table) {
    let case = table.column_case;

    for column in &mut table.columns {
        column.is_primary = table.primary_key.iter().any(|k| case.names_equal(k, &column.name));
        column.is_auto_updated = column.identity.is_some();
    }
}

/// The parent key whose columns are exactly the foreign key's parent columns.
fn referenced_key(parent: &Table, fk: &ForeignKeyConstraint) -> Option<ReferencedKey> {
    let parent_columns = fk.parent_columns().collect_vec();
    let names_equal = |a: &str, b: &str| parent.column_names_equal(a, b);

    let matches_primary_key = parent.primary_key.len() == parent_columns.len()
        && parent_columns
            .iter()
            .all(|c| parent.primary_key.iter().any(|k| names_equal(k, c)));

    if matches_primary_key {
        return Some(ReferencedKey::PrimaryKey);
    }

    parent
        .indexes
        .iter()
        .filter(|i| i.is_unique || i.is_primary)
        .find(|i| i.covers_exactly(&parent_columns, names_equal))
        .map(|i| {
            if i.is_primary {
                ReferencedKey::PrimaryKey
            } else {
                ReferencedKey::UniqueIndex(i.name.clone())
            }
        })
}
