use crate::cli::{Commands, DbArgs, IntrospectionArgs};
use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tablescope::{introspect, IntrospectionOutcome, Result, TracingProgressSink};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

mod cli;

const OUTPUT_FILE_NAME: &str = "schema-graph.json";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = cli::Cli::parse();

    let cancellation = CancellationToken::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the tables currently being read");
            on_interrupt.cancel();
        }
    });

    run(cli, cancellation).await?;

    Ok(())
}

#[instrument(skip_all)]
async fn run(cli: cli::Cli, cancellation: CancellationToken) -> Result<Option<PathBuf>> {
    match cli.command {
        Commands::Introspect { db_args, options } => {
            do_introspect(db_args, options, cli.max_parallelism, cancellation).await
        }
    }
}

/// Returns the path of the written graph, or `None` if the run was cancelled.
#[instrument(skip_all)]
async fn do_introspect(
    db_args: DbArgs,
    options: IntrospectionArgs,
    max_parallelism: NonZeroUsize,
    cancellation: CancellationToken,
) -> Result<Option<PathBuf>> {
    let config = cli::build_config(&db_args, &options, max_parallelism)?;

    let outcome = introspect(&config, &TracingProgressSink, cancellation).await?;

    match outcome {
        IntrospectionOutcome::Completed { database, .. } => {
            let json = serde_json::to_vec_pretty(&database).map_err(std::io::Error::from)?;

            tokio::fs::create_dir_all(&options.output_dir).await?;
            let path = options.output_dir.join(OUTPUT_FILE_NAME);
            tokio::fs::write(&path, json).await?;

            info!("Wrote schema graph to {}", path.display());
            Ok(Some(path))
        }
        IntrospectionOutcome::Cancelled { .. } => {
            warn!("Nothing was written because the run was cancelled");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn sqlite_file(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("TEST 1.0.sqlite");
        let connection = Connection::open(&path).unwrap();
        connection
            .execute_batch(
                r#"
        create table "TABLE 1.0" (id integer primary key, name text);
        create table orders (id integer primary key, owner int references "TABLE 1.0" (id));
        "#,
            )
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_introspect_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let database = sqlite_file(dir.path());
        let output = dir.path().join("out");

        let parameters = cli::Cli::try_parse_from([
            "tablescope",
            "--max-parallelism",
            "2",
            "introspect",
            "-t",
            "sqlite",
            "-d",
            database.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .unwrap();

        let written = run(parameters, CancellationToken::new()).await.unwrap().unwrap();

        assert_eq!(written, output.join(OUTPUT_FILE_NAME));
        let json = std::fs::read_to_string(&written).unwrap();
        let graph: serde_json::Value = serde_json::from_str(&json).unwrap();
        let names = graph["tables"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["TABLE 1.0".to_string(), "orders".to_string()]);
        assert_eq!(graph["name"], "TEST 1.0");
    }

    #[test]
    fn test_sqlite_databases_are_named_after_their_file() {
        let parameters = cli::Cli::try_parse_from(["tablescope", "introspect", "-t", "sqlite", "-d", "./data/app.db"]).unwrap();
        let Commands::Introspect { db_args, options } = parameters.command;

        let config = cli::build_config(&db_args, &options, NonZeroUsize::MIN).unwrap();

        assert_eq!(config.database_name, "app");
        assert_eq!(config.connection.database, "./data/app.db");
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let database = sqlite_file(dir.path());
        let output = dir.path().join("out");

        let parameters = cli::Cli {
            max_parallelism: NonZeroUsize::MIN,
            command: Commands::Introspect {
                db_args: DbArgs {
                    database_type: tablescope::Vendor::Sqlite,
                    db_host: "localhost".to_string(),
                    db_port: 0,
                    db_user: String::new(),
                    db_password: String::new(),
                    db_name: database.to_string_lossy().into_owned(),
                },
                options: IntrospectionArgs {
                    catalog: None,
                    schema: None,
                    include_tables: None,
                    exclude_tables: None,
                    output_dir: output.clone(),
                    no_views: false,
                    no_routines: false,
                    no_rows: false,
                    infer_implied: false,
                    timeout_secs: 30,
                    trust_vendor_filters: false,
                },
            },
        };

        let cancellation = CancellationToken::new();
        cancellation.cancel();

        assert_eq!(run(parameters, cancellation).await.unwrap(), None);
        assert!(!output.exists());
    }

    #[test]
    fn test_rejects_unknown_database_types() {
        let result = cli::Cli::try_parse_from(["tablescope", "introspect", "-t", "oracle", "-d", "x"]);

        assert!(result.is_err());
    }
}
