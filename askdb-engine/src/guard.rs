//! Textual SQL safety gate.
//!
//! A best-effort deterrent, not a parser-backed authorization layer: the
//! deny-list matches whole words anywhere in the statement, including
//! inside string literals and comments. The gate sits behind a trait so
//! a real SQL parser with an allow-list can replace it without touching
//! call sites.

use askdb_core::db::SqlDialect;
use once_cell::sync::Lazy;
use regex::Regex;

static DENY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(DROP|DELETE|TRUNCATE|UPDATE|INSERT|ALTER|CREATE|EXEC)\b")
        .expect("deny-list pattern is valid")
});

static TABLE_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z0-9_]+)").expect("table-ref pattern is valid")
});

/// Functions the embedded fallback engine does not implement, with the
/// portable rewrite to suggest instead of executing.
static SQLITE_INCOMPATIBLE: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bYEAR\s*\(", "Use strftime('%Y', date_column) instead of YEAR()"),
        (r"(?i)\bMONTH\s*\(", "Use strftime('%m', date_column) instead of MONTH()"),
        (r"(?i)\bDAY\s*\(", "Use strftime('%d', date_column) instead of DAY()"),
    ]
    .into_iter()
    .map(|(pattern, suggestion)| {
        (
            Regex::new(pattern).expect("dialect pattern is valid"),
            suggestion,
        )
    })
    .collect()
});

/// Gate consulted before any relational statement reaches the driver.
pub trait StatementGuard: Send + Sync {
    fn check(&self, sql: &str) -> Result<(), String>;
}

/// The textual heuristic: non-empty statement, no deny-listed keyword as
/// a whole word (case-insensitive, anywhere).
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordGuard;

impl StatementGuard for KeywordGuard {
    fn check(&self, sql: &str) -> Result<(), String> {
        if sql.trim().is_empty() {
            return Err("Empty query provided".to_string());
        }
        if let Some(found) = DENY_RE.find(sql) {
            return Err(format!(
                "Potentially dangerous operation detected ({}). Only SELECT statements are permitted.",
                found.as_str().to_uppercase()
            ));
        }
        Ok(())
    }
}

/// The executor's prefix gate: the trimmed statement must read as a
/// SELECT before anything else is considered.
pub fn require_select(sql: &str) -> Result<(), String> {
    if sql.trim().to_uppercase().starts_with("SELECT") {
        Ok(())
    } else {
        Err("Only SELECT queries are allowed. Please provide a SELECT statement.".to_string())
    }
}

/// Reject engine-specific functions before they reach the embedded
/// fallback. A static text check, not a parse.
pub fn dialect_gate(dialect: SqlDialect, sql: &str) -> Result<(), String> {
    if dialect != SqlDialect::Sqlite {
        return Ok(());
    }
    for (pattern, suggestion) in SQLITE_INCOMPATIBLE.iter() {
        if pattern.is_match(sql) {
            return Err(format!("Function not supported in SQLite. {suggestion}"));
        }
    }
    Ok(())
}

/// Table names referenced after FROM or JOIN. Basic extraction -- good
/// enough to enrich error messages, not a parse.
pub fn referenced_tables(sql: &str) -> Vec<String> {
    TABLE_REF_RE
        .captures_iter(sql)
        .map(|caps| caps[1].to_string())
        .collect()
}
