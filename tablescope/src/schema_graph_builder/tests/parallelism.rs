use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::metadata::{FixtureCatalog, FixtureMetadata, ForeignKeyDescriptor};
use crate::schema_graph_builder::tests;
use crate::test_helpers::{get_test_helper, RecordingProgressSink, TestHelper};
use crate::{RunStatus, SchemaGraphBuilder, Stage, Vendor};

fn warehouse(helper: &TestHelper, tables: usize) -> FixtureCatalog {
    (0..tables).fold(
        helper.catalog().with_latency(Duration::from_millis(20)),
        |catalog, idx| {
            let name = format!("table {:02}", idx);
            let next = format!("table {:02}", (idx + 1) % tables);
            catalog.table(
                tests::keyed_table(helper, &name, &["next"])
                    .foreign_key(ForeignKeyDescriptor::new(&format!("{} next", name), helper.table_ref(&next)).column("next", "id")),
            )
        },
    )
}

#[tokio::test(start_paused = true)]
async fn parallel_extraction_builds_the_same_graph() {
    let helper = get_test_helper("helper", Vendor::Postgres).await;
    let sequential = FixtureMetadata::new(warehouse(&helper, 12));
    let parallel = FixtureMetadata::new(warehouse(&helper, 12));
    let config = helper.config();
    let parallel_config = helper.config().with_max_parallelism(NonZeroUsize::new(4).unwrap());

    let expected = helper
        .run(&config, sequential.clone(), &RecordingProgressSink::default())
        .await
        .unwrap()
        .into_database()
        .unwrap();
    let actual = helper
        .run(&parallel_config, parallel.clone(), &RecordingProgressSink::default())
        .await
        .unwrap()
        .into_database()
        .unwrap();

    similar_asserts::assert_eq!(expected, actual);
    assert_eq!(sequential.connections_opened(), 0);
    assert_eq!(sequential.max_concurrent_calls(), 1);
    assert_eq!(parallel.connections_opened(), 4);
    assert!(parallel.max_concurrent_calls() > 1);
    assert!(parallel.max_concurrent_calls() <= 4);
    assert_eq!(actual.tables().iter().filter(|t| t.foreign_keys[0].is_resolved()).count(), 12);
}

#[tokio::test(start_paused = true)]
async fn parallelism_without_a_connector_stays_on_one_connection() {
    let helper = get_test_helper("helper", Vendor::Sqlite).await;
    let metadata = FixtureMetadata::new(warehouse(&helper, 6));
    let config = helper.config().with_max_parallelism(NonZeroUsize::new(8).unwrap());
    let sink = RecordingProgressSink::default();

    let outcome = SchemaGraphBuilder::new(&config, Arc::new(metadata.clone()), &sink)
        .build()
        .await
        .unwrap();

    assert_eq!(outcome.database().unwrap().tables().len(), 6);
    assert_eq!(metadata.max_concurrent_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_stops_after_the_current_table() {
    let helper = get_test_helper("helper", Vendor::MySql).await;
    let metadata = FixtureMetadata::new(warehouse(&helper, 8));
    let cancellation = CancellationToken::new();
    let sink = RecordingProgressSink::cancelling_after(1, cancellation.clone());

    let outcome = helper
        .run_with_cancellation(&helper.config(), metadata, &sink, cancellation)
        .await
        .unwrap();

    assert!(outcome.is_cancelled());
    assert!(outcome.database().is_none());
    assert!(sink.processed_tables().len() < 8);
    assert_eq!(outcome.summary().status, RunStatus::Cancelled { stage: Stage::ForeignKeys });
    assert!(!sink.stages().contains(&Stage::Views));
    assert_eq!(sink.summary().as_ref(), Some(outcome.summary()));
}

#[tokio::test(start_paused = true)]
async fn cancelling_before_the_run_makes_no_calls() {
    let helper = get_test_helper("helper", Vendor::Postgres).await;
    let metadata = FixtureMetadata::new(warehouse(&helper, 3));
    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let outcome = helper
        .run_with_cancellation(&helper.config(), metadata.clone(), &RecordingProgressSink::default(), cancellation)
        .await
        .unwrap();

    assert_eq!(outcome.summary().status, RunStatus::Cancelled { stage: Stage::Init });
    assert_eq!(metadata.calls(), 0);
}
