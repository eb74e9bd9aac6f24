use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use clap::{Args, Parser, Subcommand};
use tablescope::{ConnectionSettings, FilterDefects, IntrospectionConfig, Result, Vendor};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about)]
#[command(propagate_version = true)]
/// Reads the catalog of a relational database and writes it out as a resolved graph of tables,
/// columns, keys and relationships.
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// How many connections to use when reading per-table metadata. Defaults to the number of
    /// estimated cores on the machine. If the available parallelism cannot be determined, it defaults to 1.
    #[arg(long, default_value_t = get_default_max_parallelism())]
    pub max_parallelism: NonZeroUsize,
}

fn get_default_max_parallelism() -> NonZeroUsize {
    thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

fn parse_vendor(value: &str) -> std::result::Result<Vendor, String> {
    value.parse().map_err(|e: tablescope::TablescopeError| e.to_string())
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Introspect a database and write `schema-graph.json` to the output directory
    Introspect {
        #[command(flatten)]
        db_args: DbArgs,

        #[command(flatten)]
        options: IntrospectionArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// The kind of database: postgres, mysql or sqlite
    #[arg(long, short = 't', value_parser = parse_vendor)]
    pub database_type: Vendor,

    /// The host of the database to introspect
    #[arg(long, default_value = "localhost")]
    pub db_host: String,

    /// The port of the database to introspect
    #[arg(long, default_value_t = 5432)]
    pub db_port: u16,

    /// The username to use when connecting to the database
    #[arg(long, default_value = "postgres")]
    pub db_user: String,

    /// The password to use when connecting to the database
    #[arg(long, env = "TABLESCOPE_PASSWORD", default_value = "", hide_env_values = true)]
    pub db_password: String,

    /// The name of the database to introspect. For SQLite this is the path of the database file
    #[arg(long, short = 'd')]
    pub db_name: String,
}

impl DbArgs {
    pub(crate) fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            database: self.db_name.clone(),
        }
    }

    /// The name the graph is published under. SQLite databases are named after their file.
    pub(crate) fn database_name(&self) -> String {
        match self.database_type {
            Vendor::Sqlite => Path::new(&self.db_name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.db_name.clone()),
            _ => self.db_name.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IntrospectionArgs {
    /// The catalog to introspect, or a `%` pattern. If not specified, all catalogs are read
    #[arg(long)]
    pub catalog: Option<String>,

    /// The schema to introspect, or a `%` pattern. If not specified, all schemas are read
    #[arg(long, short = 's')]
    pub schema: Option<String>,

    /// Only introspect tables whose name matches this regular expression
    #[arg(long, short = 'i')]
    pub include_tables: Option<String>,

    /// Skip tables whose name matches this regular expression
    #[arg(long, short = 'I')]
    pub exclude_tables: Option<String>,

    /// The directory `schema-graph.json` is written to
    #[arg(long, short = 'o', default_value = ".")]
    pub output_dir: PathBuf,

    /// Leave views out of the graph
    #[arg(long)]
    pub no_views: bool,

    /// Don't read stored functions and procedures
    #[arg(long)]
    pub no_routines: bool,

    /// Don't report row count estimates
    #[arg(long)]
    pub no_rows: bool,

    /// Guess relationships from column names for tables without foreign keys
    #[arg(long)]
    pub infer_implied: bool,

    /// How long a single metadata call may take before the run is given up
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Send catalog and schema names to the database as filters even where its driver is known
    /// to mishandle them
    #[arg(long)]
    pub trust_vendor_filters: bool,
}

/// Turns the parsed arguments into the library configuration.
pub(crate) fn build_config(db_args: &DbArgs, options: &IntrospectionArgs, max_parallelism: NonZeroUsize) -> Result<IntrospectionConfig> {
    let mut config = IntrospectionConfig::new(db_args.database_type, db_args.database_name())
        .with_connection(db_args.connection_settings())
        .with_output_directory(&options.output_dir)
        .with_views(!options.no_views)
        .with_routines(!options.no_routines)
        .with_row_counts(!options.no_rows)
        .with_implied_relationships(options.infer_implied)
        .with_metadata_timeout(Duration::from_secs(options.timeout_secs))
        .with_max_parallelism(max_parallelism);

    if let Some(catalog) = &options.catalog {
        config = config.with_catalog(catalog);
    }

    if let Some(schema) = &options.schema {
        config = config.with_schema(schema);
    }

    if let Some(include) = &options.include_tables {
        config = config.with_include_tables(include)?;
    }

    if let Some(exclude) = &options.exclude_tables {
        config = config.with_exclude_tables(exclude)?;
    }

    if options.trust_vendor_filters {
        config = config.with_filter_defects(FilterDefects::none());
    }

    config.validate()?;

    Ok(config)
}
