use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use regex::Regex;
use crate::{FilterDefects, Result, TablescopeError, Vendor};

/// Where to find the database server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// For SQLite this is the path of the database file.
    pub database: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
        }
    }
}

impl ConnectionSettings {
    pub fn postgres_connection_string(&self) -> String {
        let mut connection_string = format!(
            "host={} port={} user={} dbname={}",
            self.host,
            self.port,
            self.user,
            quote_connection_value(&self.database)
        );

        if !self.password.is_empty() {
            connection_string.push_str(&format!(" password={}", quote_connection_value(&self.password)));
        }

        connection_string
    }
}

fn quote_connection_value(value: &str) -> String {
    if value.is_empty() || value.contains([' ', '\'', '\\']) {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    } else {
        value.to_string()
    }
}

/// Everything one introspection run needs to know. Read-only once the run starts.
#[derive(Debug, Clone)]
pub struct IntrospectionConfig {
    pub vendor: Vendor,
    pub connection: ConnectionSettings,
    /// The name the resulting graph is reported under.
    pub database_name: String,
    /// Catalog name or `%` pattern. `None` means all catalogs.
    pub catalog: Option<String>,
    /// Schema name or `%` pattern. `None` means all schemas.
    pub schema: Option<String>,
    pub output_directory: Option<PathBuf>,
    pub include_tables: Option<Regex>,
    pub exclude_tables: Option<Regex>,
    pub include_views: bool,
    pub include_routines: bool,
    pub include_row_counts: bool,
    pub infer_implied_relationships: bool,
    pub metadata_timeout: Duration,
    pub max_parallelism: NonZeroUsize,
    filter_defects: Option<FilterDefects>,
}

impl Default for IntrospectionConfig {
    fn default() -> Self {
        Self::new(Vendor::Postgres, "postgres")
    }
}

impl IntrospectionConfig {
    pub fn new(vendor: Vendor, database_name: impl Into<String>) -> Self {
        let database_name = database_name.into();
        Self {
            vendor,
            connection: ConnectionSettings {
                database: database_name.clone(),
                ..crate::default()
            },
            database_name,
            catalog: None,
            schema: None,
            output_directory: None,
            include_tables: None,
            exclude_tables: None,
            include_views: true,
            include_routines: true,
            include_row_counts: true,
            infer_implied_relationships: false,
            metadata_timeout: Duration::from_secs(30),
            max_parallelism: NonZeroUsize::MIN,
            filter_defects: None,
        }
    }

    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(directory.into());
        self
    }

    pub fn with_include_tables(mut self, pattern: &str) -> Result<Self> {
        self.include_tables = Some(compile_filter(pattern)?);
        Ok(self)
    }

    pub fn with_exclude_tables(mut self, pattern: &str) -> Result<Self> {
        self.exclude_tables = Some(compile_filter(pattern)?);
        Ok(self)
    }

    pub fn with_views(mut self, include: bool) -> Self {
        self.include_views = include;
        self
    }

    pub fn with_routines(mut self, include: bool) -> Self {
        self.include_routines = include;
        self
    }

    pub fn with_row_counts(mut self, include: bool) -> Self {
        self.include_row_counts = include;
        self
    }

    pub fn with_implied_relationships(mut self, infer: bool) -> Self {
        self.infer_implied_relationships = infer;
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: NonZeroUsize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    /// Overrides the vendor's default listing-defect workarounds.
    pub fn with_filter_defects(mut self, defects: FilterDefects) -> Self {
        self.filter_defects = Some(defects);
        self
    }

    pub fn filter_defects(&self) -> FilterDefects {
        self.filter_defects
            .unwrap_or_else(|| self.vendor.default_filter_defects())
    }

    pub fn validate(&self) -> Result {
        if self.database_name.is_empty() {
            return Err(TablescopeError::InvalidConfiguration("the database name cannot be empty".to_string()));
        }

        if self.catalog.as_deref() == Some("") {
            return Err(TablescopeError::InvalidConfiguration("the catalog cannot be an empty string, leave it out to include all catalogs".to_string()));
        }

        if self.schema.as_deref() == Some("") {
            return Err(TablescopeError::InvalidConfiguration("the schema cannot be an empty string, leave it out to include all schemas".to_string()));
        }

        if self.metadata_timeout.is_zero() {
            return Err(TablescopeError::InvalidConfiguration("the metadata timeout must be positive".to_string()));
        }

        Ok(())
    }

    /// Applies the include and exclude filters to a table name.
    pub fn is_table_included(&self, name: &str) -> bool {
        let included = self.include_tables.as_ref().map_or(true, |r| r.is_match(name));
        let excluded = self.exclude_tables.as_ref().is_some_and(|r| r.is_match(name));

        included && !excluded
    }
}

fn compile_filter(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| TablescopeError::InvalidFilterPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_and_exclude_filters_combine() {
        let config = IntrospectionConfig::new(Vendor::Postgres, "shop")
            .with_include_tables("^order").unwrap()
            .with_exclude_tables("_archive$").unwrap();

        assert!(config.is_table_included("orders"));
        assert!(config.is_table_included("order_lines"));
        assert!(!config.is_table_included("order_archive"));
        assert!(!config.is_table_included("customers"));
    }

    #[test]
    fn invalid_filters_are_rejected() {
        let result = IntrospectionConfig::new(Vendor::Postgres, "shop").with_include_tables("(");

        assert!(matches!(result, Err(TablescopeError::InvalidFilterPattern { pattern, .. }) if pattern == "("));
    }

    #[test]
    fn empty_namespaces_are_invalid() {
        let config = IntrospectionConfig::new(Vendor::MySql, "TEST 1.0").with_schema("");

        assert!(matches!(config.validate(), Err(TablescopeError::InvalidConfiguration(_))));
        assert!(IntrospectionConfig::new(Vendor::MySql, "TEST 1.0").with_schema("TEST 1.0").validate().is_ok());
    }

    #[test]
    fn filter_defects_default_per_vendor() {
        let mysql = IntrospectionConfig::new(Vendor::MySql, "db");
        assert!(mysql.filter_defects().dots_in_name_patterns);

        let overridden = mysql.with_filter_defects(FilterDefects::none());
        assert!(!overridden.filter_defects().dots_in_name_patterns);
    }

    #[test]
    fn connection_strings_quote_odd_values() {
        let settings = ConnectionSettings {
            host: "db.internal".to_string(),
            port: 5433,
            user: "reader".to_string(),
            password: "it's secret".to_string(),
            database: "TEST 1.0".to_string(),
        };

        assert_eq!(
            settings.postgres_connection_string(),
            "host=db.internal port=5433 user=reader dbname='TEST 1.0' password='it\\'s secret'"
        );
    }
}
