use std::fmt::{Display, Formatter};
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::{NameContext, TablescopeError};

/// The database products whose metadata dialect is known.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Postgres,
    MySql,
    Sqlite,
}

/// How the vendor folds unquoted identifiers written in SQL.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum IdentifierCase {
    Lower,
    Preserve,
}

/// How stored names are compared when looking entities up.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub enum LookupCase {
    #[default]
    Sensitive,
    Insensitive,
}

impl LookupCase {
    /// Produces the key a name is stored under in lookup tables.
    pub fn fold(&self, name: &str) -> String {
        match self {
            LookupCase::Sensitive => name.to_string(),
            LookupCase::Insensitive => name.to_lowercase(),
        }
    }

    pub fn names_equal(&self, left: &str, right: &str) -> bool {
        match self {
            LookupCase::Sensitive => left == right,
            LookupCase::Insensitive => left.to_lowercase() == right.to_lowercase(),
        }
    }
}

/// Known defects in a vendor's filtered metadata listings.
///
/// Each flag makes the normalizer bypass the vendor filter for the affected patterns
/// and filter the unfiltered listing in-process instead.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub struct FilterDefects {
    /// Name patterns containing `.` match nothing (or the wrong objects).
    /// Seen in MySQL Connector/J, see <https://bugs.mysql.com/bug.php?id=63992>.
    pub dots_in_name_patterns: bool,
}

impl FilterDefects {
    pub fn none() -> Self {
        FilterDefects::default()
    }
}

impl Vendor {
    pub fn identifier_case(&self) -> IdentifierCase {
        match self {
            Vendor::Postgres => IdentifierCase::Lower,
            Vendor::MySql | Vendor::Sqlite => IdentifierCase::Preserve,
        }
    }

    /// How names in the given position compare.
    ///
    /// MySQL stores databases and tables as files, so those names are case-sensitive on most
    /// platforms, while column, index, constraint and routine names never are.
    pub fn lookup_case(&self, context: NameContext) -> LookupCase {
        match self {
            Vendor::Postgres => LookupCase::Sensitive,
            Vendor::Sqlite => LookupCase::Insensitive,
            Vendor::MySql => match context {
                NameContext::Database
                | NameContext::Catalog
                | NameContext::Schema
                | NameContext::Table => LookupCase::Sensitive,
                NameContext::Column
                | NameContext::Index
                | NameContext::ForeignKey
                | NameContext::Routine => LookupCase::Insensitive,
            },
        }
    }

    pub fn quote_char(&self) -> char {
        match self {
            Vendor::Postgres | Vendor::Sqlite => '"',
            Vendor::MySql => '`',
        }
    }

    /// The escape character for `LIKE` patterns sent to the vendor.
    pub fn pattern_escape(&self) -> char {
        '\\'
    }

    /// If the vendor's listing calls accept name patterns at all.
    pub fn supports_listing_filters(&self) -> bool {
        !matches!(self, Vendor::Sqlite)
    }

    /// The filter workarounds enabled unless the configuration says otherwise.
    pub fn default_filter_defects(&self) -> FilterDefects {
        match self {
            Vendor::MySql => FilterDefects {
                dots_in_name_patterns: true,
            },
            Vendor::Postgres | Vendor::Sqlite => FilterDefects::none(),
        }
    }

    /// Keywords that always need quoting, used until the server provides its own list.
    pub fn default_reserved_words(&self) -> &'static [&'static str] {
        match self {
            Vendor::Postgres => &[
                "all", "and", "any", "array", "as", "asc", "both", "case", "cast", "check",
                "collate", "column", "constraint", "create", "default", "desc", "distinct", "do",
                "else", "end", "except", "false", "for", "foreign", "from", "grant", "group",
                "having", "in", "into", "leading", "limit", "not", "null", "offset", "on", "only",
                "or", "order", "primary", "references", "select", "table", "then", "to", "true",
                "union", "unique", "user", "using", "when", "where", "window", "with",
            ],
            Vendor::MySql => &[
                "add", "all", "alter", "and", "as", "asc", "by", "case", "check", "column",
                "constraint", "create", "database", "default", "delete", "desc", "distinct",
                "drop", "foreign", "from", "group", "having", "in", "index", "insert", "key",
                "like", "limit", "not", "null", "on", "or", "order", "primary", "references",
                "select", "table", "to", "union", "unique", "update", "where", "with",
            ],
            Vendor::Sqlite => &[
                "add", "all", "alter", "and", "as", "autoincrement", "between", "check", "collate",
                "commit", "constraint", "create", "default", "delete", "distinct", "drop", "else",
                "escape", "except", "exists", "foreign", "from", "group", "having", "in", "index",
                "insert", "into", "is", "isnull", "join", "limit", "not", "notnull", "null", "on",
                "or", "order", "primary", "references", "select", "set", "table", "then", "to",
                "transaction", "union", "unique", "update", "using", "values", "when", "where",
            ],
        }
    }
}

impl Display for Vendor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Vendor::Postgres => "postgres",
            Vendor::MySql => "mysql",
            Vendor::Sqlite => "sqlite",
        })
    }
}

impl FromStr for Vendor {
    type Err = TablescopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Ok(Vendor::Postgres),
            "mysql" | "mariadb" => Ok(Vendor::MySql),
            "sqlite" | "sqlite3" => Ok(Vendor::Sqlite),
            _ => Err(TablescopeError::UnknownDatabaseType(s.to_string())),
        }
    }
}
