use std::collections::HashMap;
use serde::Serialize;
use crate::{Anomaly, DatabaseProduct, ImpliedRelationship, NameContext, Routine, Table, TableId, TableRef, Vendor};

type TableKey = (Option<String>, Option<String>, String);

/// The root of the schema graph. Owns every table, routine and anomaly of one run.
#[derive(Debug, Clone, Serialize)]
pub struct Database {
    pub name: String,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub product: DatabaseProduct,
    tables: Vec<Table>,
    pub routines: Vec<Routine>,
    extraction_anomalies: Vec<Anomaly>,
    pub(crate) resolution_anomalies: Vec<Anomaly>,
    pub(crate) implied_relationships: Vec<ImpliedRelationship>,
    #[serde(skip)]
    lookup: HashMap<TableKey, TableId>,
}

impl PartialEq for Database {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.catalog == other.catalog
            && self.schema == other.schema
            && self.product == other.product
            && self.tables == other.tables
            && self.routines == other.routines
            && self.extraction_anomalies == other.extraction_anomalies
            && self.resolution_anomalies == other.resolution_anomalies
            && self.implied_relationships == other.implied_relationships
    }
}

impl Database {
    pub fn new(name: impl Into<String>, catalog: Option<String>, schema: Option<String>, product: DatabaseProduct) -> Self {
        Self {
            name: name.into(),
            catalog,
            schema,
            product,
            tables: Vec::new(),
            routines: Vec::new(),
            extraction_anomalies: Vec::new(),
            resolution_anomalies: Vec::new(),
            implied_relationships: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    pub fn vendor(&self) -> Vendor {
        self.product.vendor
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table_by_id(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.0)
    }

    pub(crate) fn table_by_id_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(id.0)
    }

    /// Finds a table by name in any catalog or schema.
    pub fn table(&self, name: &str) -> Option<&Table> {
        let case = self.vendor().lookup_case(NameContext::Table);
        self.tables.iter().find(|t| case.names_equal(&t.name, name))
    }

    pub fn table_in(&self, catalog: Option<&str>, schema: Option<&str>, name: &str) -> Option<&Table> {
        let reference = TableRef::new(catalog.map(str::to_string), schema.map(str::to_string), name);
        self.find_table(&reference).and_then(|id| self.table_by_id(id))
    }

    /// Locates a referenced table.
    ///
    /// An exact match on every namespace level wins. Otherwise, levels missing on either side
    /// are ignored, as long as that leaves exactly one candidate.
    pub fn find_table(&self, reference: &TableRef) -> Option<TableId> {
        if let Some(id) = self.lookup.get(&self.key_of(reference.catalog.as_deref(), reference.schema.as_deref(), &reference.name)) {
            return Some(*id);
        }

        let (catalog, schema, name) = self.key_of(reference.catalog.as_deref(), reference.schema.as_deref(), &reference.name);
        let level_matches = |wanted: &Option<String>, actual: &Option<String>| match (wanted, actual) {
            (Some(w), Some(a)) => w == a,
            _ => true,
        };

        let mut candidates = self
            .tables
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                let (t_catalog, t_schema, t_name) = self.key_of(t.catalog.as_deref(), t.schema.as_deref(), &t.name);
                t_name == name && level_matches(&catalog, &t_catalog) && level_matches(&schema, &t_schema)
            })
            .map(|(idx, _)| TableId(idx));

        match (candidates.next(), candidates.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }

    /// Adds a table, or returns the existing one with the same qualified name.
    pub(crate) fn add_table(&mut self, table: Table) -> TableId {
        let key = self.key_of(table.catalog.as_deref(), table.schema.as_deref(), &table.name);
        if let Some(id) = self.lookup.get(&key) {
            return *id;
        }

        let id = TableId(self.tables.len());
        self.tables.push(table);
        self.lookup.insert(key, id);
        id
    }

    pub(crate) fn tables_mut(&mut self) -> &mut [Table] {
        &mut self.tables
    }

    pub(crate) fn rebuild_lookup(&mut self) {
        let lookup = self
            .tables
            .iter()
            .enumerate()
            .map(|(idx, t)| (self.key_of(t.catalog.as_deref(), t.schema.as_deref(), &t.name), TableId(idx)))
            .collect();
        self.lookup = lookup;
    }

    fn key_of(&self, catalog: Option<&str>, schema: Option<&str>, name: &str) -> TableKey {
        let vendor = self.vendor();
        (
            catalog.map(|c| vendor.lookup_case(NameContext::Catalog).fold(c)),
            schema.map(|s| vendor.lookup_case(NameContext::Schema).fold(s)),
            vendor.lookup_case(NameContext::Table).fold(name),
        )
    }

    pub(crate) fn push_anomaly(&mut self, anomaly: Anomaly) {
        self.extraction_anomalies.push(anomaly);
    }

    /// Problems found while reading the catalog followed by those found while resolving it.
    pub fn anomalies(&self) -> impl Iterator<Item = &Anomaly> {
        self.extraction_anomalies.iter().chain(self.resolution_anomalies.iter())
    }

    pub fn extraction_anomalies(&self) -> &[Anomaly] {
        &self.extraction_anomalies
    }

    pub fn resolution_anomalies(&self) -> &[Anomaly] {
        &self.resolution_anomalies
    }

    pub fn implied_relationships(&self) -> &[ImpliedRelationship] {
        &self.implied_relationships
    }
}
