use std::collections::HashSet;
use crate::{IdentifierCase, Vendor};

/// Quotes identifiers for one vendor as needed.
#[derive(Debug, Clone)]
pub struct IdentifierQuoter {
    vendor: Vendor,
    /// Lower-cased keywords that can never be used bare.
    reserved_words: HashSet<String>,
}

impl IdentifierQuoter {
    /// Creates a quoter with the specified reserved words.
    pub fn new<S: AsRef<str>>(vendor: Vendor, reserved_words: impl IntoIterator<Item = S>) -> Self {
        Self {
            vendor,
            reserved_words: reserved_words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Creates a quoter that only knows the built-in keyword list of the vendor.
    pub fn for_vendor(vendor: Vendor) -> Self {
        Self::new(vendor, vendor.default_reserved_words().iter().copied())
    }

    /// Adds keywords reported by the server.
    pub fn extend_reserved_words<S: AsRef<str>>(&mut self, words: impl IntoIterator<Item = S>) {
        self.reserved_words
            .extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Quotes an identifier as needed.
    ///
    /// Follows the rules of `quote_identifier` in Postgres' ruleutils.c, widened to upper case
    /// letters for vendors that preserve identifier case.
    pub fn quote(&self, identifier: impl AsRef<str>) -> String {
        let identifier = identifier.as_ref();
        let quote = self.vendor.quote_char();

        if identifier.is_empty() {
            return format!("{quote}{quote}");
        }

        let lower_only = self.vendor.identifier_case() == IdentifierCase::Lower;
        let mut chars = identifier.chars();

        let safe = !self.reserved_words.contains(&identifier.to_lowercase())
            && matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_lowercase() || (!lower_only && c.is_ascii_uppercase()))
            && chars.all(|c| {
                c == '_'
                    || c.is_ascii_digit()
                    || c.is_ascii_lowercase()
                    || (!lower_only && c.is_ascii_uppercase())
            });

        if safe {
            identifier.to_string()
        } else {
            let escaped = identifier.replace(quote, &format!("{quote}{quote}"));

            format!("{quote}{escaped}{quote}")
        }
    }

    /// Removes one level of quoting, if the identifier is fully quoted.
    pub fn unquote<'s>(&self, identifier: &'s str) -> std::borrow::Cow<'s, str> {
        let quote = self.vendor.quote_char();

        if identifier.len() >= 2 && identifier.starts_with(quote) && identifier.ends_with(quote) {
            let inner = &identifier[quote.len_utf8()..identifier.len() - quote.len_utf8()];
            std::borrow::Cow::Owned(inner.replace(&format!("{quote}{quote}"), &quote.to_string()))
        } else {
            std::borrow::Cow::Borrowed(identifier)
        }
    }
}

/// A trait for types that can be quoted.
pub(crate) trait Quotable {
    /// Quotes the value as needed.
    fn quote(&self, quoter: &IdentifierQuoter) -> String;
}

impl<S> Quotable for S
where
    S: AsRef<str>,
{
    fn quote(&self, quoter: &IdentifierQuoter) -> String {
        quoter.quote(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        let quoter = IdentifierQuoter::new(Vendor::Postgres, ["table"]);

        macro_rules! test_quote {
            ($identifier:literal, $expected:literal) => {
                let quoted = quoter.quote($identifier);
                assert_eq!(quoted, $expected);
            };
        }

        test_quote!("table", "\"table\"");
        test_quote!("table1", "table1");
        test_quote!("table_1", "table_1");
        test_quote!("table-1", "\"table-1\"");
        test_quote!("table 1", "\"table 1\"");
        test_quote!("TABLE 1.0", "\"TABLE 1.0\"");
        test_quote!("1table", "\"1table\"");
        test_quote!("my_table", "my_table");
        test_quote!("MyTable", "\"MyTable\"");
        test_quote!("my\"table", "\"my\"\"table\"");
        test_quote!("", "\"\"");
    }

    #[test]
    fn mysql_uses_backticks_and_keeps_case() {
        let quoter = IdentifierQuoter::for_vendor(Vendor::MySql);

        assert_eq!(quoter.quote("MyTable"), "MyTable");
        assert_eq!(quoter.quote("link id"), "`link id`");
        assert_eq!(quoter.quote("TABLE 1.0"), "`TABLE 1.0`");
        assert_eq!(quoter.quote("key"), "`key`");
        assert_eq!(quoter.quote("odd`name"), "`odd``name`");
    }

    #[test]
    fn server_keywords_extend_the_builtin_list() {
        let mut quoter = IdentifierQuoter::for_vendor(Vendor::Postgres);
        assert_eq!(quoter.quote("analyse"), "analyse");

        quoter.extend_reserved_words(["ANALYSE"]);
        assert_eq!(quoter.quote("analyse"), "\"analyse\"");
    }

    #[test]
    fn unquotes_fully_quoted_identifiers() {
        let quoter = IdentifierQuoter::for_vendor(Vendor::Postgres);

        assert_eq!(quoter.unquote("\"TEST 1.0\""), "TEST 1.0");
        assert_eq!(quoter.unquote("\"a\"\"b\""), "a\"b");
        assert_eq!(quoter.unquote("plain"), "plain");
        assert_eq!(quoter.unquote("\""), "\"");
    }
}
