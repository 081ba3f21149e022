//! Database tools exposed to the model through native function calling.
//!
//! One registry serves both backends; a tool aimed at the inactive
//! backend returns a redirect message instead of executing, so the model
//! can switch with `set_database` and retry.

use askdb_core::db::{DbKind, SqlDialect};
use askdb_engine::document::MongoAdapter;
use askdb_engine::relational::SqlAdapter;
use askdb_engine::session::SessionState;
use askdb_engine::{Database, ExecOutcome, chart};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::runtime::Runtime;
use tracing::debug;

/// All available tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    // Backend selection
    SetDatabase,

    // SQL tools
    ListTables,
    DescribeTables,
    CheckSql,
    RunSql,
    SqlCapabilities,

    // MongoDB tools
    ListCollections,
    DescribeCollections,
    CheckMongoQuery,
    RunMongoQuery,
    CountDocuments,

    // Visualization
    RenderPieChart,
    RenderBarChart,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetDatabase => "set_database",
            Self::ListTables => "list_tables",
            Self::DescribeTables => "describe_tables",
            Self::CheckSql => "check_sql",
            Self::RunSql => "run_sql",
            Self::SqlCapabilities => "sql_capabilities",
            Self::ListCollections => "list_collections",
            Self::DescribeCollections => "describe_collections",
            Self::CheckMongoQuery => "check_mongo_query",
            Self::RunMongoQuery => "run_mongo_query",
            Self::CountDocuments => "count_documents",
            Self::RenderPieChart => "render_pie_chart",
            Self::RenderBarChart => "render_bar_chart",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "set_database" => Some(Self::SetDatabase),
            "list_tables" => Some(Self::ListTables),
            "describe_tables" => Some(Self::DescribeTables),
            "check_sql" => Some(Self::CheckSql),
            "run_sql" => Some(Self::RunSql),
            "sql_capabilities" => Some(Self::SqlCapabilities),
            "list_collections" => Some(Self::ListCollections),
            "describe_collections" => Some(Self::DescribeCollections),
            "check_mongo_query" => Some(Self::CheckMongoQuery),
            "run_mongo_query" => Some(Self::RunMongoQuery),
            "count_documents" => Some(Self::CountDocuments),
            "render_pie_chart" => Some(Self::RenderPieChart),
            "render_bar_chart" => Some(Self::RenderBarChart),
            _ => None,
        }
    }
}

/// Tool definitions in the shape the LLM client wraps for the API.
pub fn definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "set_database",
            "description": "Switch the active database backend. Valid kinds are 'mongo' and 'sql'.",
            "parameters": {
                "type": "object",
                "properties": {
                    "kind": {"type": "string", "enum": ["mongo", "sql"]}
                },
                "required": ["kind"]
            }
        }),
        json!({
            "name": "list_tables",
            "description": "List all tables in the SQL database.",
            "parameters": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "describe_tables",
            "description": "Get schema and sample rows for SQL tables. Pass a comma-separated list of table names.",
            "parameters": {
                "type": "object",
                "properties": {
                    "tables": {"type": "string", "description": "e.g. \"customers,orders\""}
                },
                "required": ["tables"]
            }
        }),
        json!({
            "name": "check_sql",
            "description": "Validate a SQL SELECT statement before executing it: safety, dialect functions, table names.",
            "parameters": {
                "type": "object",
                "properties": {"sql": {"type": "string"}},
                "required": ["sql"]
            }
        }),
        json!({
            "name": "run_sql",
            "description": "Execute a SQL SELECT statement and return the results as a table. Only SELECT is permitted.",
            "parameters": {
                "type": "object",
                "properties": {"sql": {"type": "string"}},
                "required": ["sql"]
            }
        }),
        json!({
            "name": "sql_capabilities",
            "description": "Describe the connected SQL engine's supported functions and syntax.",
            "parameters": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "list_collections",
            "description": "List all collections in the MongoDB database.",
            "parameters": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "describe_collections",
            "description": "Get inferred schema and a sample document for MongoDB collections. Pass a comma-separated list of collection names.",
            "parameters": {
                "type": "object",
                "properties": {
                    "collections": {"type": "string", "description": "e.g. \"students,courses\""}
                },
                "required": ["collections"]
            }
        }),
        json!({
            "name": "check_mongo_query",
            "description": "Validate a MongoDB query document (JSON) before executing it.",
            "parameters": {
                "type": "object",
                "properties": {"query": {"type": "string", "description": "The query as a JSON string"}},
                "required": ["query"]
            }
        }),
        json!({
            "name": "run_mongo_query",
            "description": "Execute a MongoDB find or aggregation. Provide 'collection' plus either find options (filter, projection, sort, skip, limit) or a 'pipeline'. Find limit defaults to 5; 0 means unbounded.",
            "parameters": {
                "type": "object",
                "properties": {
                    "collection": {"type": "string"},
                    "filter": {"type": "object"},
                    "projection": {"type": "object"},
                    "sort": {"type": "object"},
                    "skip": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "pipeline": {"type": "array", "items": {"type": "object"}}
                },
                "required": ["collection"]
            }
        }),
        json!({
            "name": "count_documents",
            "description": "Count documents in a MongoDB collection, optionally matching a filter.",
            "parameters": {
                "type": "object",
                "properties": {
                    "collection": {"type": "string"},
                    "filter": {"type": "object"}
                },
                "required": ["collection"]
            }
        }),
        json!({
            "name": "render_pie_chart",
            "description": "Render a pie chart from the last query result. Use values_column 'count' for occurrence counts.",
            "parameters": {
                "type": "object",
                "properties": {
                    "labels_column": {"type": "string"},
                    "values_column": {"type": "string"},
                    "title": {"type": "string"}
                },
                "required": ["labels_column", "values_column"]
            }
        }),
        json!({
            "name": "render_bar_chart",
            "description": "Render a bar chart from the last query result (x_column/y_column, y_column may be 'count'), or from literal 'labels' and 'values' arrays.",
            "parameters": {
                "type": "object",
                "properties": {
                    "x_column": {"type": "string"},
                    "y_column": {"type": "string"},
                    "title": {"type": "string"},
                    "labels": {"type": "array"},
                    "values": {"type": "array"}
                }
            }
        }),
    ]
}

/// Result of executing a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn err(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Everything a tool needs: the shared runtime, whichever backends
/// resolved at startup, the active backend, and the session's last
/// query result.
pub struct ToolContext<'a> {
    pub rt: &'a Runtime,
    pub relational: Option<&'a SqlAdapter>,
    pub document: Option<&'a MongoAdapter>,
    pub active: DbKind,
    pub session: SessionState,
}

impl<'a> ToolContext<'a> {
    pub fn new(
        rt: &'a Runtime,
        relational: Option<&'a SqlAdapter>,
        document: Option<&'a MongoAdapter>,
        active: DbKind,
    ) -> Self {
        Self {
            rt,
            relational,
            document,
            active,
            session: SessionState::default(),
        }
    }

    /// Resolve the backend a tool belongs to, or the message telling the
    /// model how to get there.
    fn require(&self, kind: DbKind) -> Result<&'a dyn Database, String> {
        if self.active != kind {
            return Err(format!(
                "Error: Currently connected to {}. Use 'set_database' to switch to {}.",
                self.active, kind
            ));
        }
        match kind {
            DbKind::Relational => self
                .relational
                .map(|adapter| adapter as &dyn Database)
                .ok_or_else(|| "Error: SQL database connection is not available.".to_string()),
            DbKind::Document => self
                .document
                .map(|adapter| adapter as &dyn Database)
                .ok_or_else(|| "Error: MongoDB connection is not available.".to_string()),
        }
    }

    /// One-line summary of the active backend for the system prompt.
    pub fn context_line(&self) -> String {
        match self.active {
            DbKind::Document => match self.document {
                Some(mongo) => match mongo.list_names(self.rt) {
                    Ok(names) => {
                        format!("MongoDB database with collections: {}", names.join(", "))
                    }
                    Err(e) => format!("MongoDB database (error retrieving collections: {e})"),
                },
                None => "MongoDB database (not connected)".to_string(),
            },
            DbKind::Relational => match self.relational {
                Some(sql) => {
                    let engine = match sql.dialect() {
                        SqlDialect::MySql => "MySQL",
                        SqlDialect::Sqlite => "SQLite",
                    };
                    match sql.list_names(self.rt) {
                        Ok(names) => {
                            format!("{engine} database with tables: {}", names.join(", "))
                        }
                        Err(e) => format!("{engine} database (error retrieving tables: {e})"),
                    }
                }
                None => "SQL database (not connected)".to_string(),
            },
        }
    }
}

fn string_arg(args: &Value, key: &str) -> Option<String> {
    match args.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        // Tolerate models passing structured JSON where a string was asked for.
        Some(other) if !other.is_null() => Some(other.to_string()),
        _ => None,
    }
}

/// Execute a tool call against the session's context.
pub fn execute(name: &str, args: &Value, ctx: &mut ToolContext) -> ToolResult {
    let Some(tool) = Tool::from_name(name) else {
        return ToolResult::err(format!("Unknown tool: {name}"));
    };
    debug!("Executing tool {name}");

    match tool {
        Tool::SetDatabase => set_database(args, ctx),

        Tool::ListTables => list_names(ctx, DbKind::Relational, "No tables found in database."),
        Tool::DescribeTables => {
            let Some(tables) = string_arg(args, "tables") else {
                return ToolResult::err("Error: 'tables' is required.");
            };
            probe(ctx, DbKind::Relational, &tables)
        }
        Tool::CheckSql => {
            let Some(sql) = string_arg(args, "sql") else {
                return ToolResult::err("Error: 'sql' is required.");
            };
            validate(ctx, DbKind::Relational, &sql)
        }
        Tool::RunSql => {
            let Some(sql) = string_arg(args, "sql") else {
                return ToolResult::err("Error: 'sql' is required.");
            };
            run_query(ctx, DbKind::Relational, &sql)
        }
        Tool::SqlCapabilities => {
            if ctx.active != DbKind::Relational {
                return ToolResult::err(
                    "Error: Currently connected to MongoDB. Use 'set_database' to switch to SQL.",
                );
            }
            match ctx.relational {
                Some(sql) => ToolResult::ok(sql.capabilities()),
                None => ToolResult::err("Error: SQL database connection is not available."),
            }
        }

        Tool::ListCollections => {
            list_names(ctx, DbKind::Document, "No MongoDB collections found.")
        }
        Tool::DescribeCollections => {
            let Some(collections) = string_arg(args, "collections") else {
                return ToolResult::err("Error: 'collections' is required.");
            };
            probe(ctx, DbKind::Document, &collections)
        }
        Tool::CheckMongoQuery => {
            let Some(query) = string_arg(args, "query") else {
                return ToolResult::err("Error: 'query' is required.");
            };
            validate(ctx, DbKind::Document, &query)
        }
        Tool::RunMongoQuery => run_query(ctx, DbKind::Document, &args.to_string()),
        Tool::CountDocuments => {
            if ctx.active != DbKind::Document {
                return ToolResult::err(
                    "Error: Currently connected to SQL. Use 'set_database' to switch to MongoDB.",
                );
            }
            let Some(mongo) = ctx.document else {
                return ToolResult::err("Error: MongoDB connection is not available.");
            };
            match mongo.count_documents(ctx.rt, &args.to_string()) {
                Ok(count) => ToolResult::ok(count.to_string()),
                Err(e) => ToolResult::err(e.to_string()),
            }
        }

        Tool::RenderPieChart => {
            match chart::render_pie(ctx.session.last_result(), &args.to_string()) {
                Ok(message) => ToolResult::ok(message),
                Err(e) => ToolResult::err(format!("Error: {e}")),
            }
        }
        Tool::RenderBarChart => {
            match chart::render_bar(ctx.session.last_result(), &args.to_string()) {
                Ok(message) => ToolResult::ok(message),
                Err(e) => ToolResult::err(format!("Error: {e}")),
            }
        }
    }
}

fn set_database(args: &Value, ctx: &mut ToolContext) -> ToolResult {
    let Some(kind) = args.get("kind").and_then(|v| v.as_str()) else {
        return ToolResult::err("Error: 'kind' is required. Valid options are 'mongo' or 'sql'.");
    };
    match kind.to_lowercase().as_str() {
        "mongo" | "mongodb" => {
            if ctx.document.is_none() {
                return ToolResult::err("Error: MongoDB connection is not available.");
            }
            ctx.active = DbKind::Document;
            ToolResult::ok("Database type set to: MongoDB")
        }
        "sql" | "relational" => {
            if ctx.relational.is_none() {
                return ToolResult::err("Error: SQL database connection is not available.");
            }
            ctx.active = DbKind::Relational;
            ToolResult::ok("Database type set to: SQL")
        }
        other => ToolResult::err(format!(
            "Error: Invalid database type '{other}'. Valid options are 'mongo' or 'sql'."
        )),
    }
}

fn list_names(ctx: &ToolContext, kind: DbKind, empty_message: &str) -> ToolResult {
    let backend = match ctx.require(kind) {
        Ok(backend) => backend,
        Err(message) => return ToolResult::err(message),
    };
    match backend.list_names(ctx.rt) {
        Ok(names) if names.is_empty() => ToolResult::ok(empty_message),
        Ok(names) => ToolResult::ok(names.join(", ")),
        Err(e) => ToolResult::err(e.to_string()),
    }
}

fn probe(ctx: &ToolContext, kind: DbKind, names: &str) -> ToolResult {
    let backend = match ctx.require(kind) {
        Ok(backend) => backend,
        Err(message) => return ToolResult::err(message),
    };
    match backend.probe_schema(ctx.rt, names) {
        Ok(rendered) => ToolResult::ok(rendered),
        Err(e) => ToolResult::err(format!("Error: {e}")),
    }
}

fn validate(ctx: &ToolContext, kind: DbKind, input: &str) -> ToolResult {
    let backend = match ctx.require(kind) {
        Ok(backend) => backend,
        Err(message) => return ToolResult::err(message),
    };
    match backend.validate(ctx.rt, input) {
        Ok(echoed) => ToolResult::ok(echoed),
        Err(e) => ToolResult::err(format!("Error: {e}")),
    }
}

/// Run a query and keep the session's last-result state in sync: a table
/// replaces it, an empty outcome or a failure clears it.
fn run_query(ctx: &mut ToolContext, kind: DbKind, input: &str) -> ToolResult {
    let outcome = {
        let backend = match ctx.require(kind) {
            Ok(backend) => backend,
            Err(message) => return ToolResult::err(message),
        };
        backend.execute(ctx.rt, input)
    };
    match outcome {
        Ok(ExecOutcome::Table { rendered, result }) => {
            ctx.session.record(result);
            ToolResult::ok(rendered)
        }
        Ok(ExecOutcome::Empty { message }) => {
            ctx.session.clear();
            ToolResult::ok(message)
        }
        Err(e) => {
            ctx.session.clear();
            ToolResult::err(format!("Error: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn every_definition_matches_a_registered_tool() {
        for def in definitions() {
            let name = def["name"].as_str().unwrap();
            let tool = Tool::from_name(name).expect("definition without a Tool variant");
            assert_eq!(tool.name(), name);
        }
    }

    #[test]
    fn unknown_tools_are_reported() {
        let rt = runtime();
        let mut ctx = ToolContext::new(&rt, None, None, DbKind::Relational);
        let result = execute("drop_everything", &json!({}), &mut ctx);
        assert!(!result.success);
        assert!(result.output.contains("Unknown tool"));
    }

    #[test]
    fn tools_for_the_inactive_backend_redirect() {
        let rt = runtime();
        let mut ctx = ToolContext::new(&rt, None, None, DbKind::Relational);
        let result = execute("list_collections", &json!({}), &mut ctx);
        assert!(!result.success);
        assert!(result.output.contains("Use 'set_database'"));
    }

    #[test]
    fn switching_to_an_unavailable_backend_fails() {
        let rt = runtime();
        let mut ctx = ToolContext::new(&rt, None, None, DbKind::Relational);
        let result = execute("set_database", &json!({"kind": "mongo"}), &mut ctx);
        assert!(!result.success);
        assert!(result.output.contains("MongoDB connection is not available"));

        let result = execute("set_database", &json!({"kind": "graph"}), &mut ctx);
        assert!(result.output.contains("Invalid database type 'graph'"));
    }

    #[test]
    fn chart_tools_demand_a_prior_query_result() {
        let rt = runtime();
        let mut ctx = ToolContext::new(&rt, None, None, DbKind::Relational);
        let result = execute(
            "render_pie_chart",
            &json!({"labels_column": "a", "values_column": "count"}),
            &mut ctx,
        );
        assert!(!result.success);
        assert!(result.output.contains("Run a query first"));
    }

    #[test]
    fn missing_required_string_args_are_reported() {
        let rt = runtime();
        let mut ctx = ToolContext::new(&rt, None, None, DbKind::Relational);
        let result = execute("run_sql", &json!({}), &mut ctx);
        assert!(!result.success);
        assert!(result.output.contains("'sql' is required"));
    }
}
