use std::fmt::{Display, Formatter};
use serde::Serialize;
use tracing::debug;
use crate::quoting::{IdentifierQuoter, Quotable};
use crate::{FilterDefects, LookupCase, RoutineDescriptor, TableDescriptor, Vendor};

/// Which kind of object a name belongs to. Vendors compare names differently per position.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum NameContext {
    Database,
    Catalog,
    Schema,
    Table,
    Column,
    Index,
    ForeignKey,
    Routine,
}

/// A stored name together with the key it is looked up by.
#[derive(Debug, Eq, PartialEq, Hash, Clone, Serialize)]
pub struct NormalizedName {
    display: String,
    #[serde(skip)]
    key: String,
}

impl NormalizedName {
    pub fn as_str(&self) -> &str {
        &self.display
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn into_string(self) -> String {
        self.display
    }
}

impl Display for NormalizedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}

/// A name filter as given by the user.
///
/// `%` and `_` only act as wildcards in [`NamePattern::Wildcard`]. Names are always compared
/// against the pattern in-process, never by handing a stored name to the vendor's pattern matcher.
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub enum NamePattern {
    #[default]
    Any,
    Literal(String),
    Wildcard(String),
}

impl NamePattern {
    /// Interprets a configured filter.
    ///
    /// A pattern is a wildcard pattern only when it contains `%`. Patterns containing a space or
    /// a dot always name one object literally, as such names can't be meant as SQL patterns.
    /// A lone `_` is common in real names and is therefore literal unless `%` is present too.
    pub fn from_filter(pattern: Option<&str>) -> Self {
        match pattern {
            None | Some("%") => NamePattern::Any,
            Some(p) if p.contains(' ') || p.contains('.') => NamePattern::Literal(p.to_string()),
            Some(p) if p.contains('%') => NamePattern::Wildcard(p.to_string()),
            Some(p) => NamePattern::Literal(p.to_string()),
        }
    }

    pub fn literal(name: impl Into<String>) -> Self {
        NamePattern::Literal(name.into())
    }

    pub fn wildcard(pattern: impl Into<String>) -> Self {
        NamePattern::Wildcard(pattern.into())
    }

    pub fn matches(&self, name: &str, case: LookupCase) -> bool {
        match self {
            NamePattern::Any => true,
            NamePattern::Literal(literal) => case.names_equal(literal, name),
            NamePattern::Wildcard(pattern) => like_matches(pattern, name, case),
        }
    }
}

enum LikeToken {
    AnySequence,
    AnyChar,
    Char(char),
}

fn tokenize_like(pattern: &str, escape: char) -> Vec<LikeToken> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        let token = match c {
            '%' => LikeToken::AnySequence,
            '_' => LikeToken::AnyChar,
            c if c == escape => LikeToken::Char(chars.next().unwrap_or(escape)),
            c => LikeToken::Char(c),
        };
        tokens.push(token);
    }

    tokens
}

/// SQL `LIKE` semantics with `\` as escape character.
fn like_matches(pattern: &str, name: &str, case: LookupCase) -> bool {
    let tokens = tokenize_like(&case.fold(pattern), '\\');
    let name: Vec<char> = case.fold(name).chars().collect();

    // matched[i] is true when the tokens seen so far can match the first i characters
    let mut matched = vec![false; name.len() + 1];
    matched[0] = true;

    for token in &tokens {
        let mut next = vec![false; name.len() + 1];
        match token {
            LikeToken::AnySequence => {
                let mut seen = false;
                for i in 0..=name.len() {
                    seen |= matched[i];
                    next[i] = seen;
                }
            }
            LikeToken::AnyChar => {
                for i in 1..=name.len() {
                    next[i] = matched[i - 1];
                }
            }
            LikeToken::Char(c) => {
                for i in 1..=name.len() {
                    next[i] = matched[i - 1] && name[i - 1] == *c;
                }
            }
        }
        matched = next;
    }

    matched[name.len()]
}

/// Escapes `LIKE` metacharacters so the vendor treats the name literally.
fn escape_like(name: &str, escape: char) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '%' || c == '_' || c == escape {
            escaped.push(escape);
        }
        escaped.push(c);
    }
    escaped
}

/// What to ask the vendor for, and how to narrow down what it returns.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct PatternPlan {
    pub pattern: NamePattern,
    /// The pattern handed to the vendor's listing call. `None` lists everything.
    pub vendor_pattern: Option<String>,
    /// Set when a usable filter was withheld from the vendor because of a known defect.
    pub bypassed_vendor_filter: bool,
    case: LookupCase,
}

impl PatternPlan {
    pub fn matches(&self, name: Option<&str>) -> bool {
        match name {
            Some(name) => self.pattern.matches(name, self.case),
            None => true,
        }
    }
}

/// The normalizer's instructions for one listing call.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct ListingPlan {
    pub catalog: PatternPlan,
    pub schema: PatternPlan,
}

impl ListingPlan {
    pub fn vendor_catalog_pattern(&self) -> Option<&str> {
        self.catalog.vendor_pattern.as_deref()
    }

    pub fn vendor_schema_pattern(&self) -> Option<&str> {
        self.schema.vendor_pattern.as_deref()
    }

    /// If the vendor will return an unfiltered superset that is filtered in-process.
    pub fn bypasses_vendor_filter(&self) -> bool {
        self.catalog.bypassed_vendor_filter || self.schema.bypassed_vendor_filter
    }

    pub fn includes(&self, catalog: Option<&str>, schema: Option<&str>) -> bool {
        self.catalog.matches(catalog) && self.schema.matches(schema)
    }

    /// Applies the exact in-process filter to a table listing.
    pub fn retain_tables(&self, tables: &mut Vec<TableDescriptor>) {
        tables.retain(|t| self.includes(t.catalog.as_deref(), t.schema.as_deref()));
    }

    pub fn retain_routines(&self, routines: &mut Vec<RoutineDescriptor>) {
        routines.retain(|r| self.includes(r.catalog.as_deref(), r.schema.as_deref()));
    }
}

/// Resolves vendor-specific case, quoting and pattern-matching behavior.
#[derive(Debug, Clone)]
pub struct IdentifierNormalizer {
    vendor: Vendor,
    defects: FilterDefects,
    quoter: IdentifierQuoter,
}

impl IdentifierNormalizer {
    pub fn new(vendor: Vendor, defects: FilterDefects) -> Self {
        Self {
            vendor,
            defects,
            quoter: IdentifierQuoter::for_vendor(vendor),
        }
    }

    pub fn with_reserved_words<S: AsRef<str>>(mut self, words: impl IntoIterator<Item = S>) -> Self {
        self.quoter.extend_reserved_words(words);
        self
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn quoter(&self) -> &IdentifierQuoter {
        &self.quoter
    }

    /// Normalizes a name as stored by the database.
    pub fn normalize(&self, raw: &str, context: NameContext) -> NormalizedName {
        NormalizedName {
            display: raw.to_string(),
            key: self.vendor.lookup_case(context).fold(raw),
        }
    }

    /// Normalizes a name typed by a user, which may be wrapped in the vendor's quotes.
    pub fn normalize_input(&self, raw: &str, context: NameContext) -> NormalizedName {
        let unquoted = self.quoter.unquote(raw);
        self.normalize(&unquoted, context)
    }

    pub fn names_equal(&self, left: &str, right: &str, context: NameContext) -> bool {
        self.vendor.lookup_case(context).names_equal(left, right)
    }

    pub fn quote_identifier(&self, name: &str) -> String {
        self.quoter.quote(name)
    }

    /// `schema.table`, or `catalog.table` for vendors without schemas, quoted as needed.
    pub fn qualified_name(&self, catalog: Option<&str>, schema: Option<&str>, name: &str) -> String {
        match schema.or(catalog) {
            Some(namespace) => format!("{}.{}", namespace.quote(&self.quoter), name.quote(&self.quoter)),
            None => name.quote(&self.quoter),
        }
    }

    /// Decides how to list objects for the configured catalog and schema patterns.
    pub fn plan_listing(&self, catalog: Option<&str>, schema: Option<&str>) -> ListingPlan {
        ListingPlan {
            catalog: self.plan_pattern(catalog, NameContext::Catalog),
            schema: self.plan_pattern(schema, NameContext::Schema),
        }
    }

    fn plan_pattern(&self, raw: Option<&str>, context: NameContext) -> PatternPlan {
        let unquoted = raw.map(|r| self.quoter.unquote(r));
        let pattern = NamePattern::from_filter(unquoted.as_deref());
        let case = self.vendor.lookup_case(context);

        if !self.vendor.supports_listing_filters() {
            return PatternPlan {
                pattern,
                vendor_pattern: None,
                bypassed_vendor_filter: false,
                case,
            };
        }

        let (vendor_pattern, bypassed_vendor_filter) = match &pattern {
            NamePattern::Any => (None, false),
            NamePattern::Literal(name) | NamePattern::Wildcard(name)
                if self.defects.dots_in_name_patterns && name.contains('.') =>
            {
                debug!(pattern = %name, vendor = %self.vendor, "Vendor filter is unreliable for dotted names, filtering in-process");
                (None, true)
            }
            NamePattern::Literal(name) => (Some(escape_like(name, self.vendor.pattern_escape())), false),
            NamePattern::Wildcard(pattern) => (Some(pattern.clone()), false),
        };

        PatternPlan {
            pattern,
            vendor_pattern,
            bypassed_vendor_filter,
            case,
        }
    }
}
