use std::time::Duration;
use tablescope_test_macros::vendor_test;
use crate::metadata::{FixtureFailure, FixtureMetadata, MetadataFeature};
use crate::schema_graph_builder::tests;
use crate::test_helpers::{get_test_helper, RecordingProgressSink, TestHelper};
use crate::{AnomalyKind, RunStatus, Stage, TablescopeError, Vendor};

fn three_tables(helper: &TestHelper) -> crate::metadata::FixtureCatalog {
    helper
        .catalog()
        .table(tests::keyed_table(helper, "customers", &["name"]))
        .table(tests::keyed_table(helper, "orders", &["customer"]))
        .table(tests::keyed_table(helper, "products", &["price"]))
}

#[vendor_test(arg(vendor = "mysql"))]
#[vendor_test(arg(vendor = "postgres"))]
#[vendor_test(arg(vendor = "sqlite"))]
async fn losing_the_connection_after_tables_fails_the_run(helper: &TestHelper) {
    let catalog = three_tables(helper).failure(FixtureFailure::ConnectivityLostAt {
        feature: MetadataFeature::Columns,
    });
    let sink = RecordingProgressSink::default();

    let result = helper.run(&helper.config(), FixtureMetadata::new(catalog), &sink).await;

    let error = result.unwrap_err();
    assert!(error.is_connectivity());
    assert_eq!(sink.stages(), vec![Stage::Init, Stage::Tables, Stage::Columns]);
    assert!(sink.processed_tables().is_empty());
    assert!(matches!(sink.summary().unwrap().status, RunStatus::Failed { .. }));
}

#[vendor_test(arg(vendor = "postgres"))]
async fn losing_the_connection_while_listing_tables_fails_the_run(helper: &TestHelper) {
    let catalog = three_tables(helper).failure(FixtureFailure::ConnectivityLostAfter { calls: 1 });

    let result = helper
        .run(&helper.config(), FixtureMetadata::new(catalog), &RecordingProgressSink::default())
        .await;

    assert!(matches!(result, Err(TablescopeError::Connectivity(_))));
}

#[vendor_test(arg(vendor = "mysql"))]
#[vendor_test(arg(vendor = "postgres"))]
#[vendor_test(arg(vendor = "sqlite"))]
async fn unsupported_indexes_on_one_table_leave_the_rest_intact(helper: &TestHelper) {
    let catalog = three_tables(helper).unsupported(MetadataFeature::Indexes, Some("orders"));
    let sink = RecordingProgressSink::default();

    let outcome = helper
        .run(&helper.config(), FixtureMetadata::new(catalog), &sink)
        .await
        .unwrap();

    let db = outcome.database().unwrap();
    assert!(db.table("orders").unwrap().indexes.is_empty());
    assert_eq!(db.table("orders").unwrap().columns.len(), 2);
    assert_eq!(db.table("customers").unwrap().indexes.len(), 1);
    assert_eq!(db.table("products").unwrap().indexes.len(), 1);

    let anomalies = db.anomalies().collect::<Vec<_>>();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].kind, AnomalyKind::UnsupportedFeature);
    assert!(anomalies[0].table.as_deref().is_some_and(|t| t.contains("orders")));

    assert_eq!(sink.anomalies().len(), 1);
    let summary = outcome.summary();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.anomalies, 1);
    assert_eq!(summary.tables, 3);
}

#[vendor_test(arg(vendor = "postgres"))]
async fn unsupported_routines_degrade_to_an_empty_list(helper: &TestHelper) {
    let catalog = three_tables(helper).unsupported(MetadataFeature::Routines, None);

    let db = helper.introspect(catalog).await;

    assert!(db.routines.is_empty());
    assert_eq!(db.tables().len(), 3);
    assert_eq!(db.extraction_anomalies().len(), 1);
}

#[vendor_test(arg(vendor = "sqlite"))]
async fn an_unsupported_product_query_is_not_fatal(helper: &TestHelper) {
    let catalog = three_tables(helper).unsupported(MetadataFeature::Product, None);

    let db = helper.introspect(catalog).await;

    assert_eq!(db.product.version, "unknown");
    assert_eq!(db.vendor(), Vendor::Sqlite);
    assert_eq!(db.tables().len(), 3);
}

#[vendor_test(arg(vendor = "postgres"))]
async fn an_unsupported_table_listing_is_fatal(helper: &TestHelper) {
    let catalog = three_tables(helper).unsupported(MetadataFeature::Tables, None);

    let result = helper
        .run(&helper.config(), FixtureMetadata::new(catalog), &RecordingProgressSink::default())
        .await;

    assert!(result.unwrap_err().is_unsupported_feature());
}

#[vendor_test(arg(vendor = "mysql"))]
async fn a_connection_to_another_vendor_is_rejected(helper: &TestHelper) {
    let catalog = crate::metadata::FixtureCatalog::new(Vendor::Postgres);

    let result = helper
        .run(&helper.config(), FixtureMetadata::new(catalog), &RecordingProgressSink::default())
        .await;

    assert!(matches!(result, Err(TablescopeError::InvalidConfiguration(_))));
}

#[tokio::test(start_paused = true)]
async fn slow_metadata_calls_time_out() {
    let helper = get_test_helper("helper", Vendor::Postgres).await;
    let catalog = three_tables(&helper).with_latency(Duration::from_secs(120));
    let config = helper.config().with_metadata_timeout(Duration::from_secs(5));
    let sink = RecordingProgressSink::default();

    let result = helper.run(&config, FixtureMetadata::new(catalog), &sink).await;

    let error = result.unwrap_err();
    assert!(error.is_connectivity());
    assert!(matches!(error, TablescopeError::Timeout { .. }));
    assert_eq!(sink.stages(), vec![Stage::Init]);
}
