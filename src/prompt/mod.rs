//! Prompt compilation.
//!
//! Both templates are pure functions of their inputs. The query prompt embeds
//! the compiled semantic layer text; the suggestion prompt embeds the live
//! schema as JSON and asks for a semantic layer back.

use crate::metadata::SchemaDescription;

/// Dialect used when neither an override nor a connection URL says otherwise.
pub const DEFAULT_DIALECT: &str = "postgresql";

/// Build the prompt that asks the model for one SQL statement.
pub fn query_prompt(question: &str, table_info: &str, dialect: &str) -> String {
    format!(
        "You are a {dialect} SQL expert. Use the following semantic layer info to generate accurate SQL.

Semantic Layer Info:
{table_info}

Question: {question}

Guidelines:
- Do NOT wrap table or column names in double quotes unless the name requires quoting
- Use lowercase for all table and column names
- Return only valid SQL ({dialect} dialect)
- Do NOT include explanation or formatting

SQL:
"
    )
}

/// Build the prompt that asks the model to propose a semantic layer for `schema`.
pub fn suggestion_prompt(schema: &SchemaDescription, dialect: &str) -> String {
    // Serializing plain maps and strings cannot fail.
    let schema_json = serde_json::to_string_pretty(&schema.tables).unwrap_or_default();

    format!(
        "You are a data modeling expert. Propose a semantic layer for the following {dialect} database schema.

Schema:
{schema_json}

Return a JSON object with exactly this shape:
{{\"tables\": {{\"<table>\": {{\"columns\": {{\"<column>\": [\"<synonym>\", ...]}}, \"metrics\": {{\"<metric_name>\": \"<{dialect} SQL expression>\"}}}}}}}}

Guidelines:
- Include every table and every column from the schema
- List business-friendly synonyms for each column, most likely first
- Suggest useful aggregate metrics (sums, counts, averages) as {dialect} expressions over the table's columns
- Return JSON only, no markdown fences, no explanation
"
    )
}

/// Decide which SQL dialect to ask for.
///
/// An explicit override wins; otherwise the connection URL scheme is used with
/// any driver suffix removed (`mysql+pymysql://` → `mysql`); otherwise
/// [`DEFAULT_DIALECT`]. `postgres` is normalised to `postgresql`.
pub fn infer_dialect(env_dialect: Option<&str>, connection_url: Option<&str>) -> String {
    if let Some(dialect) = env_dialect.map(str::trim).filter(|d| !d.is_empty()) {
        return dialect.to_lowercase();
    }

    let from_url = connection_url
        .and_then(|url| url.split_once("://"))
        .map(|(scheme, _)| scheme.split('+').next().unwrap_or(scheme).trim().to_lowercase())
        .filter(|scheme| !scheme.is_empty());

    match from_url.as_deref() {
        Some("postgres") => DEFAULT_DIALECT.to_string(),
        Some(scheme) => scheme.to_string(),
        None => DEFAULT_DIALECT.to_string(),
    }
}
