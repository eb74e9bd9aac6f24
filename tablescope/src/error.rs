use std::time::Duration;
use thiserror::Error;
use crate::{MetadataFeature, Stage, Vendor};

#[derive(Error, Debug)]
pub enum TablescopeError {
    #[error("Lost connectivity to the database: {0}")]
    Connectivity(String),

    #[error("Metadata call `{operation}` did not complete within {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("{vendor} does not expose {feature} metadata: {reason}")]
    UnsupportedFeature {
        vendor: Vendor,
        feature: MetadataFeature,
        reason: String,
    },

    #[error("Error from postgres: `{0}`")]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Error from postgres: `{source}` when executing query: `{query}`")]
    PostgresErrorWithQuery {
        query: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Error from sqlite: `{0}`")]
    SqliteError(#[from] rusqlite::Error),

    #[error("Error from sqlite: `{source}` when executing query: `{query}`")]
    SqliteErrorWithQuery {
        query: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Unsupported postgres version: {0}. Postgres 12 or newer is required")]
    UnsupportedPostgresVersion(i32),

    #[error("Invalid response when asking postgres for its version")]
    InvalidPostgresVersionResponse,

    #[error("Invalid number of results returned from query. Expected `{expected}`, got `{actual}`")]
    InvalidNumberOfResults {
        actual: usize,
        expected: usize,
    },

    #[error("Unknown reference action '{0}'")]
    UnknownReferenceAction(String),

    #[error("Unknown column identity '{0}'")]
    UnknownColumnIdentity(String),

    #[error("Unknown relation kind '{0}'")]
    UnknownTableKind(String),

    #[error("Unknown routine kind '{0}'")]
    UnknownRoutineKind(String),

    #[error("Unknown database type '{0}'. Supported types are postgres, mysql and sqlite")]
    UnknownDatabaseType(String),

    #[error("No metadata driver is bundled for {0}. Provide a MetadataAccess implementation instead")]
    NoDriverForVendor(Vendor),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid table filter `{pattern}`: {source}")]
    InvalidFilterPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Stage `{stage}` cannot start before `{missing}` has completed")]
    StageOrder {
        stage: Stage,
        missing: Stage,
    },

    #[error("Stage `{stage}` was already started")]
    StageRepeated {
        stage: Stage,
    },

    #[error("The metadata worker pool was closed")]
    WorkerPoolClosed,

    #[error("Metadata worker task failed: `{0}`")]
    WorkerFailed(#[from] tokio::task::JoinError),

    #[error("io error: `{0}`")]
    IoError(#[from] std::io::Error),
}

impl TablescopeError {
    /// Lost connections, failed logins and timeouts. These abort the whole run.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, TablescopeError::Connectivity(_) | TablescopeError::Timeout { .. })
    }

    /// The vendor cannot provide the requested metadata at all. Callers degrade to an empty result.
    pub fn is_unsupported_feature(&self) -> bool {
        matches!(self, TablescopeError::UnsupportedFeature { .. })
    }
}

pub type Result<T = ()> = std::result::Result<T, TablescopeError>;
