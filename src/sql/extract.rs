//! Pulling a SQL statement out of raw model output.
//!
//! Models frequently wrap their answer in a Markdown code fence even when told
//! not to. The extractor removes one opening fence (optionally carrying a
//! language tag such as `sql`) and one closing fence, nothing more. SQL syntax
//! is never inspected here; the database is the judge of that.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const FENCE: &str = "```";

/// A fence info string: `sql`, `postgresql`, `SQL`, `tsql`, ...
static LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_+.\-]*$").expect("language tag pattern is valid"));

/// Outcome of a failed extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// Nothing usable was left after stripping whitespace and fences.
    #[error("Failed to generate SQL.")]
    Empty,
}

/// Extract the SQL statement from raw model output.
///
/// Returns [`ExtractionError::Empty`] when the model produced nothing usable,
/// which callers treat as an ordinary negative answer.
pub fn extract_sql(raw: &str) -> Result<String, ExtractionError> {
    let text = raw.trim();
    let text = strip_opening_fence(text);
    let text = text.trim_end().strip_suffix(FENCE).unwrap_or(text);
    let sql = text.trim();

    if sql.is_empty() {
        Err(ExtractionError::Empty)
    } else {
        Ok(sql.to_string())
    }
}

/// SQL-flavoured fence tags recognised in front of code on the fence line.
const SQL_TAGS: &[&str] = &[
    "sql", "postgresql", "postgres", "pgsql", "plpgsql", "mysql", "sqlite", "tsql", "mssql",
    "plsql", "duckdb",
];

/// Drop a leading fence and, when the rest of its line is a bare language
/// tag, that tag too. A fence followed by code on the same line keeps the
/// code, minus a leading SQL tag.
fn strip_opening_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return text;
    };

    match rest.find('\n') {
        Some(newline) if LANGUAGE_TAG.is_match(rest[..newline].trim()) => &rest[newline + 1..],
        _ => strip_inline_tag(rest),
    }
}

/// `sql SELECT 1` becomes `SELECT 1` and a lone tag becomes empty. Anything
/// not led by a SQL tag is returned unchanged.
fn strip_inline_tag(rest: &str) -> &str {
    let body = rest.trim_start();
    let word_end = body.find(char::is_whitespace).unwrap_or(body.len());
    let (word, tail) = body.split_at(word_end);

    if tail.is_empty() {
        let bare = word.strip_suffix(FENCE).unwrap_or(word);
        return if is_sql_tag(bare) { "" } else { rest };
    }
    if is_sql_tag(word) {
        tail
    } else {
        rest
    }
}

fn is_sql_tag(word: &str) -> bool {
    SQL_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(word))
}
