//! Identifier quoting for the statements the execution layer builds itself
//! (freshness lookups).
//!
//! Every engine the service executes on quotes with `"identifier"`.

/// SQL dialects the query layer executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
}

impl Dialect {
    /// Quote an identifier (table, column), escaping embedded quote characters.
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}
