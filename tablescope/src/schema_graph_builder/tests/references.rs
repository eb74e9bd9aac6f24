use tablescope_test_macros::vendor_test;
use crate::metadata::{FixtureMetadata, ForeignKeyDescriptor};
use crate::schema_graph_builder::tests;
use crate::test_helpers::{RecordingProgressSink, TestHelper};
use crate::{AnomalyKind, ImpliedRelationship, ReferenceStatus, ResolutionOptions};

#[vendor_test(arg(vendor = "mysql"))]
#[vendor_test(arg(vendor = "postgres"))]
#[vendor_test(arg(vendor = "sqlite"))]
async fn resolves_references_to_tables_listed_later(helper: &TestHelper) {
    let catalog = helper
        .catalog()
        .table(
            tests::keyed_table(helper, "a_orders", &["customer"])
                .foreign_key(ForeignKeyDescriptor::new("orders_customer_fk", helper.table_ref("z_customers")).column("customer", "id")),
        )
        .table(tests::keyed_table(helper, "z_customers", &[]));

    let db = helper.introspect(catalog).await;

    let orders = db.table("a_orders").unwrap();
    let customers_id = db.find_table(&helper.table_ref("z_customers")).unwrap();
    let fk = orders.foreign_key("orders_customer_fk").unwrap();
    assert!(fk.is_resolved());
    assert_eq!(fk.parent_table, Some(customers_id));

    let customers = db.table("z_customers").unwrap();
    assert_eq!(customers.referenced_by.len(), 1);
    assert_eq!(customers.referenced_by[0].constraint, "orders_customer_fk");
    assert_eq!(customers.referenced_by[0].table.name, "a_orders");
}

#[vendor_test(arg(vendor = "mysql"))]
#[vendor_test(arg(vendor = "postgres"))]
#[vendor_test(arg(vendor = "sqlite"))]
async fn keeps_orphaned_references(helper: &TestHelper) {
    let catalog = helper.catalog().table(
        tests::keyed_table(helper, "orders", &["warehouse"])
            .foreign_key(ForeignKeyDescriptor::new("orders_warehouse_fk", helper.table_ref("warehouses")).column("warehouse", "id")),
    );
    let sink = RecordingProgressSink::default();

    let outcome = helper
        .run(&helper.config(), FixtureMetadata::new(catalog), &sink)
        .await
        .unwrap();

    let db = outcome.database().unwrap();
    let fk = db.table("orders").unwrap().foreign_key("orders_warehouse_fk").unwrap();
    assert!(fk.is_orphaned());
    assert_eq!(fk.parent_table, None);

    let anomalies = db.anomalies().collect::<Vec<_>>();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].kind, AnomalyKind::OrphanedReference);
    assert_eq!(sink.anomalies().len(), 1);
    assert_eq!(outcome.summary().resolution.orphaned, 1);
}

#[vendor_test(arg(vendor = "postgres"))]
#[vendor_test(arg(vendor = "sqlite"))]
async fn flags_references_to_missing_columns(helper: &TestHelper) {
    let catalog = helper
        .catalog()
        .table(tests::keyed_table(helper, "customers", &[]))
        .table(
            tests::keyed_table(helper, "orders", &["customer"])
                .foreign_key(ForeignKeyDescriptor::new("orders_customer_fk", helper.table_ref("customers")).column("customer", "customer_no")),
        );

    let db = helper.introspect(catalog).await;

    let fk = db.table("orders").unwrap().foreign_key("orders_customer_fk").unwrap();
    assert_eq!(
        fk.status,
        ReferenceStatus::Ambiguous {
            missing_columns: vec!["customers.customer_no".to_string()]
        }
    );
    assert!(db.table("customers").unwrap().referenced_by.is_empty());
    assert_eq!(db.anomalies().filter(|a| a.kind == AnomalyKind::AmbiguousReference).count(), 1);
}

#[vendor_test(arg(vendor = "mysql"))]
#[vendor_test(arg(vendor = "postgres"))]
async fn resolving_twice_changes_nothing(helper: &TestHelper) {
    let catalog = helper
        .catalog()
        .table(tests::keyed_table(helper, "customers", &[]))
        .table(
            tests::keyed_table(helper, "orders", &["customer", "warehouse"])
                .foreign_key(ForeignKeyDescriptor::new("orders_customer_fk", helper.table_ref("customers")).column("customer", "id"))
                .foreign_key(ForeignKeyDescriptor::new("orders_warehouse_fk", helper.table_ref("warehouses")).column("warehouse", "id")),
        );
    let mut db = helper.introspect(catalog).await;
    let first = db.clone();

    db.resolve(&ResolutionOptions::default());

    similar_asserts::assert_eq!(first, db);
}

#[vendor_test(arg(vendor = "postgres"))]
async fn infers_implied_relationships_when_asked(helper: &TestHelper) {
    let catalog = helper
        .catalog()
        .table(tests::keyed_table(helper, "customers", &[]))
        .table(tests::keyed_table(helper, "invoices", &["customers_id"]));
    let config = helper.config().with_implied_relationships(true);

    let outcome = helper
        .run(&config, FixtureMetadata::new(catalog), &RecordingProgressSink::default())
        .await
        .unwrap();

    let db = outcome.database().unwrap();
    assert_eq!(
        db.implied_relationships(),
        &[ImpliedRelationship {
            child: helper.table_ref("invoices"),
            child_column: "customers_id".to_string(),
            parent: helper.table_ref("customers"),
            parent_column: "id".to_string(),
        }]
    );
    assert!(db.table("invoices").unwrap().foreign_keys.is_empty());
}
