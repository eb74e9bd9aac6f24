use tablescope_test_macros::vendor_test;
use crate::metadata::{ColumnDescriptor, FixtureMetadata, FixtureTable, RoutineDescriptor};
use crate::schema_graph_builder::tests;
use crate::test_helpers::{RecordingProgressSink, TestHelper};
use crate::{RoutineKind, Stage};

fn shop(helper: &TestHelper) -> crate::metadata::FixtureCatalog {
    helper
        .catalog()
        .table(tests::keyed_table(helper, "orders", &[]))
        .table(tests::keyed_table(helper, "order_lines", &[]))
        .table(tests::keyed_table(helper, "order_archive", &[]))
        .table(FixtureTable::new(helper.table("customers").row_count(1200)).column(ColumnDescriptor::new("id", "int", 1)))
        .table(
            FixtureTable::new(helper.table("open_orders").view())
                .column(ColumnDescriptor::new("id", "int", 1))
                .view_definition("select id from orders where closed_at is null"),
        )
}

#[vendor_test(arg(vendor = "mysql"))]
#[vendor_test(arg(vendor = "postgres"))]
#[vendor_test(arg(vendor = "sqlite"))]
async fn applies_include_and_exclude_filters_before_columns(helper: &TestHelper) {
    let metadata = FixtureMetadata::new(shop(helper));
    let config = helper
        .config()
        .with_include_tables("^order")
        .unwrap()
        .with_exclude_tables("_archive$")
        .unwrap();

    let outcome = helper
        .run(&config, metadata.clone(), &RecordingProgressSink::default())
        .await
        .unwrap();

    let db = outcome.into_database().unwrap();
    let names = db.tables().iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["order_lines", "orders"]);
}

#[vendor_test(arg(vendor = "mysql"))]
#[vendor_test(arg(vendor = "postgres"))]
async fn reads_view_definitions(helper: &TestHelper) {
    let sink = RecordingProgressSink::default();

    let outcome = helper
        .run(&helper.config(), FixtureMetadata::new(shop(helper)), &sink)
        .await
        .unwrap();

    let db = outcome.database().unwrap();
    let view = db.table("open_orders").unwrap();
    assert!(view.is_view());
    assert_eq!(view.view_definition(), Some("select id from orders where closed_at is null"));
    assert!(view.indexes.is_empty());
    assert_eq!(outcome.summary().views, 1);
    assert_eq!(outcome.summary().tables, 4);
    assert!(sink.processed_tables().iter().any(|t| t.contains("open_orders")));
}

#[vendor_test(arg(vendor = "postgres"))]
#[vendor_test(arg(vendor = "sqlite"))]
async fn leaves_out_views_when_asked(helper: &TestHelper) {
    let sink = RecordingProgressSink::default();
    let config = helper.config().with_views(false);

    let outcome = helper
        .run(&config, FixtureMetadata::new(shop(helper)), &sink)
        .await
        .unwrap();

    let db = outcome.database().unwrap();
    assert!(db.table("open_orders").is_none());
    assert!(db.tables().iter().all(|t| !t.is_view()));
    assert!(!sink.stages().contains(&Stage::Views));
    assert!(sink.stages().contains(&Stage::Resolved));
}

#[vendor_test(arg(vendor = "postgres"))]
async fn row_counts_can_be_turned_off(helper: &TestHelper) {
    let with_counts = helper.introspect(shop(helper)).await;
    let without_counts = helper
        .run(&helper.config().with_row_counts(false), FixtureMetadata::new(shop(helper)), &RecordingProgressSink::default())
        .await
        .unwrap()
        .into_database()
        .unwrap();

    assert_eq!(with_counts.table("customers").unwrap().row_count, Some(1200));
    assert_eq!(without_counts.table("customers").unwrap().row_count, None);
}

#[vendor_test(arg(vendor = "mysql"))]
#[vendor_test(arg(vendor = "postgres"))]
async fn keeps_routines_of_the_selected_namespace(helper: &TestHelper) {
    let (catalog, schema) = helper.namespace();
    let outside = helper.foreign_table("unused");
    let fixture = shop(helper)
        .routine(RoutineDescriptor::new(catalog, schema, "close_order", RoutineKind::Procedure))
        .routine(RoutineDescriptor::new(outside.catalog.as_deref(), outside.schema.as_deref(), "purge", RoutineKind::Function));

    let db = helper.introspect(fixture).await;

    assert_eq!(db.routines.len(), 1);
    assert_eq!(db.routines[0].name, "close_order");
    assert_eq!(db.routines[0].kind, RoutineKind::Procedure);
}

#[vendor_test(arg(vendor = "postgres"))]
async fn routines_can_be_turned_off(helper: &TestHelper) {
    let (catalog, schema) = helper.namespace();
    let fixture = shop(helper).routine(RoutineDescriptor::new(catalog, schema, "close_order", RoutineKind::Procedure));
    let sink = RecordingProgressSink::default();

    let outcome = helper
        .run(&helper.config().with_routines(false), FixtureMetadata::new(fixture), &sink)
        .await
        .unwrap();

    assert!(outcome.database().unwrap().routines.is_empty());
    assert!(!sink.stages().contains(&Stage::Routines));
}
