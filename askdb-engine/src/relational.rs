//! Relational adapter: MySQL primary, embedded SQLite fallback.
//!
//! Both engines are reached through sqlx's `Any` driver so there is one
//! code path; the resolved dialect is carried alongside the pool for the
//! places where vocabulary differs (catalog queries, identifier quoting,
//! the dialect gate).

use askdb_core::db::{ColumnDef, DbKind, ResultSet, SqlDialect, TableSummary};
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Column, Row, TypeInfo};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::format;
use crate::guard::{self, KeywordGuard, StatementGuard};
use crate::schema_cache::SchemaCache;
use crate::{Database, ExecOutcome};

/// Rows included in a schema probe's sample block.
const SQL_SAMPLE_ROWS: u32 = 2;

pub struct SqlAdapter {
    pool: AnyPool,
    dialect: SqlDialect,
    guard: KeywordGuard,
    cache: SchemaCache,
}

impl SqlAdapter {
    pub fn new(pool: AnyPool, dialect: SqlDialect) -> Self {
        Self {
            pool,
            dialect,
            guard: KeywordGuard,
            cache: SchemaCache::new(),
        }
    }

    /// As `new`, with a custom schema-cache staleness window.
    pub fn with_cache_window(
        pool: AnyPool,
        dialect: SqlDialect,
        window: std::time::Duration,
    ) -> Self {
        Self {
            pool,
            dialect,
            guard: KeywordGuard,
            cache: SchemaCache::with_window(window),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn quote_identifier(&self, name: &str) -> String {
        match self.dialect {
            SqlDialect::MySql => format!("`{}`", name.replace('`', "``")),
            SqlDialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Declared columns in physical column order, with primary-key flags.
    pub fn table_summary(&self, rt: &Runtime, table: &str) -> EngineResult<TableSummary> {
        let columns = rt.block_on(async {
            match self.dialect {
                SqlDialect::MySql => {
                    let rows = sqlx::query(
                        "SELECT column_name, column_type, column_key \
                         FROM information_schema.columns \
                         WHERE table_schema = DATABASE() AND table_name = ? \
                         ORDER BY ordinal_position",
                    )
                    .bind(table)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| probe_error(table, &e))?;

                    rows.iter()
                        .map(|row| {
                            Ok(ColumnDef {
                                name: row.try_get(0).map_err(|e| probe_error(table, &e))?,
                                data_type: row.try_get(1).map_err(|e| probe_error(table, &e))?,
                                primary_key: row
                                    .try_get::<String, _>(2)
                                    .map(|key| key == "PRI")
                                    .unwrap_or(false),
                            })
                        })
                        .collect::<EngineResult<Vec<_>>>()
                }
                SqlDialect::Sqlite => {
                    // table_info columns: cid, name, type, notnull, dflt_value, pk
                    let pragma = format!("PRAGMA table_info({})", self.quote_identifier(table));
                    let rows = sqlx::query(&pragma)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(|e| probe_error(table, &e))?;

                    rows.iter()
                        .map(|row| {
                            Ok(ColumnDef {
                                name: row.try_get(1).map_err(|e| probe_error(table, &e))?,
                                data_type: row.try_get(2).map_err(|e| probe_error(table, &e))?,
                                primary_key: row
                                    .try_get::<i64, _>(5)
                                    .map(|pk| pk > 0)
                                    .unwrap_or(false),
                            })
                        })
                        .collect::<EngineResult<Vec<_>>>()
                }
            }
        })?;

        Ok(TableSummary {
            table: table.to_string(),
            columns,
        })
    }

    /// Tab-separated sample block for the schema preview.
    fn sample_block(&self, rt: &Runtime, summary: &TableSummary) -> EngineResult<String> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            self.quote_identifier(&summary.table),
            SQL_SAMPLE_ROWS
        );
        let rows = rt
            .block_on(sqlx::query(&sql).fetch_all(&self.pool))
            .map_err(|e| probe_error(&summary.table, &e))?;

        if rows.is_empty() {
            return Ok("(no data in table)\n".to_string());
        }

        let mut out = String::from("SAMPLE DATA:\n");
        let names: Vec<&str> = summary.columns.iter().map(|c| c.name.as_str()).collect();
        out.push_str(&names.join("\t"));
        out.push('\n');
        for row in &rows {
            let values: Vec<String> = (0..row.columns().len())
                .map(|i| format::cell_text(&any_value_to_json(row, i)))
                .collect();
            out.push_str(&values.join("\t"));
            out.push('\n');
        }
        Ok(out)
    }

    /// Available-names context appended to execution failures.
    fn failure_context(&self, rt: &Runtime, query: &str) -> String {
        let available = self.list_names(rt).unwrap_or_default();
        let mut context = format!("\n\nAvailable tables: {}", available.join(", "));
        let missing: Vec<String> = guard::referenced_tables(query)
            .into_iter()
            .filter(|table| !available.contains(table))
            .collect();
        if !missing.is_empty() {
            context.push_str(&format!(
                "\n\nError details: Tables {} do not exist.",
                missing.join(", ")
            ));
        }
        context
    }

    /// Per-dialect description of supported functions, for the agent.
    pub fn capabilities(&self) -> String {
        match self.dialect {
            SqlDialect::Sqlite => "Database: SQLite\n\
                 Key features: strftime() for dates, basic aggregations (COUNT, SUM, AVG, MIN, MAX), GROUP_CONCAT\n\
                 Example: SELECT strftime('%Y', date_column) AS year, COUNT(*) FROM table GROUP BY year"
                .to_string(),
            SqlDialect::MySql => "Database: MySQL\n\
                 Key features: date functions (YEAR(), MONTH()), string functions (CONCAT, SUBSTRING), JSON functions, window functions\n\
                 Example: SELECT YEAR(date_column) AS year, COUNT(*) FROM table GROUP BY year"
                .to_string(),
        }
    }
}

impl Database for SqlAdapter {
    fn kind(&self) -> DbKind {
        DbKind::Relational
    }

    fn list_names(&self, rt: &Runtime) -> EngineResult<Vec<String>> {
        let sql = match self.dialect {
            SqlDialect::MySql => {
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name"
            }
            SqlDialect::Sqlite => {
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
        };
        rt.block_on(async {
            let rows = sqlx::query(sql)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| EngineError::Probe(format!("Error listing tables: {e}")))?;
            rows.iter()
                .map(|row| {
                    row.try_get::<String, _>(0)
                        .map_err(|e| EngineError::Probe(format!("Error listing tables: {e}")))
                })
                .collect()
        })
    }

    fn probe_schema(&self, rt: &Runtime, names: &str) -> EngineResult<String> {
        let requested: Vec<&str> = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        let available = self.list_names(rt)?;

        let unknown: Vec<&str> = requested
            .iter()
            .filter(|name| !available.iter().any(|t| t == *name))
            .copied()
            .collect();
        if !unknown.is_empty() {
            return Err(EngineError::Probe(format!(
                "The following tables do not exist: {}. Available tables are: {}",
                unknown.join(", "),
                available.join(", ")
            )));
        }

        let mut blocks = Vec::new();
        for table in requested {
            let block = self.cache.get_or_probe(table, || {
                let summary = self.table_summary(rt, table)?;
                let sample = self.sample_block(rt, &summary)?;
                Ok(format!(
                    "TABLE: {}\n{}\n{}",
                    table,
                    summary.create_table_sql(),
                    sample
                ))
            });
            match block {
                Ok(text) => blocks.push(text),
                Err(e) => blocks.push(format!("Error with table {table}: {e}")),
            }
        }
        Ok(blocks.join("\n\n"))
    }

    fn validate(&self, rt: &Runtime, input: &str) -> EngineResult<String> {
        self.guard
            .check(input)
            .map_err(EngineError::InvalidQuery)?;
        guard::dialect_gate(self.dialect, input).map_err(EngineError::InvalidQuery)?;

        let available = self.list_names(rt)?;
        let missing: Vec<String> = guard::referenced_tables(input)
            .into_iter()
            .filter(|table| !available.contains(table))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::InvalidQuery(format!(
                "The following tables do not exist: {}. Available tables are: {}",
                missing.join(", "),
                available.join(", ")
            )));
        }

        Ok(format!("```sql\n{input}\n```"))
    }

    fn execute(&self, rt: &Runtime, input: &str) -> EngineResult<ExecOutcome> {
        let query = input.trim();
        guard::require_select(query).map_err(EngineError::InvalidQuery)?;
        self.guard
            .check(query)
            .map_err(EngineError::InvalidQuery)?;
        guard::dialect_gate(self.dialect, query).map_err(EngineError::InvalidQuery)?;

        debug!("Executing SQL query: {query}");
        // The table-reference check stays advisory: execution is always
        // attempted, unknown names only enrich a failure.
        match rt.block_on(sqlx::query(query).fetch_all(&self.pool)) {
            Ok(rows) if rows.is_empty() => Ok(ExecOutcome::Empty {
                message: "(no rows returned)",
            }),
            Ok(rows) => {
                // Projection order from the result set, not sorted.
                let columns: Vec<String> = rows[0]
                    .columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect();
                let json_rows: Vec<Vec<Value>> = rows
                    .iter()
                    .map(|row| {
                        (0..row.columns().len())
                            .map(|i| any_value_to_json(row, i))
                            .collect()
                    })
                    .collect();
                let result = ResultSet {
                    columns,
                    rows: json_rows,
                };
                let rendered = format::markdown_table(&result.columns, &result.rows);
                Ok(ExecOutcome::Table { rendered, result })
            }
            Err(e) => {
                warn!("SQL execution failed: {e}");
                Err(EngineError::Execution {
                    message: format!("Error executing SQL query: {e}"),
                    context: self.failure_context(rt, query),
                })
            }
        }
    }
}

fn probe_error(table: &str, error: &dyn std::fmt::Display) -> EngineError {
    EngineError::Probe(format!("Error caching schema for table {table}: {error}"))
}

/// Convert one column of an `Any` row to JSON, steered by the reported
/// type name and falling back through the decodes the driver supports.
fn any_value_to_json(row: &AnyRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_info().name().to_uppercase();

    if type_name.contains("INT") {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Value::from(v);
        }
    }
    if ["REAL", "FLOAT", "DOUBLE", "NUMERIC", "DECIMAL"]
        .iter()
        .any(|t| type_name.contains(t))
    {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return serde_json::Number::from_f64(v)
                .map(Value::Number)
                .unwrap_or(Value::Null);
        }
    }
    if type_name.contains("BOOL") {
        if let Ok(v) = row.try_get::<bool, _>(idx) {
            return Value::Bool(v);
        }
    }

    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return Value::Bool(v);
    }
    Value::Null
}
