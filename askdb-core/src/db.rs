use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Supported backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbKind {
    Relational,
    Document,
}

impl std::fmt::Display for DbKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbKind::Relational => write!(f, "SQL"),
            DbKind::Document => write!(f, "MongoDB"),
        }
    }
}

/// Which SQL engine the relational connection resolved to. The fallback
/// engine accepts a different function vocabulary than the primary, so
/// validation needs to know which one it is talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlDialect {
    MySql,
    Sqlite,
}

/// A single column in a relational table, in physical column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// Declared type as reported by the engine (e.g. "INTEGER", "varchar(40)")
    pub data_type: String,
    pub primary_key: bool,
}

/// Structural summary of a relational table.
///
/// Column order matches the table's physical column order; the rendered
/// DDL is a pure function of the column sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSummary {
    /// Render a `CREATE TABLE`-style description of the column sequence.
    pub fn create_table_sql(&self) -> String {
        let col_lines: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                format!(
                    "{} {}{}",
                    col.name,
                    col.data_type,
                    if col.primary_key { " PRIMARY KEY" } else { "" }
                )
            })
            .collect();
        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.table,
            col_lines.join(",\n    ")
        )
    }
}

/// Inferred type descriptor for one document field.
///
/// Starts single-typed; when sampled documents disagree, every newly
/// observed type name is appended in first-seen order. Once multi-typed a
/// field never collapses back, even if later samples all agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub types: Vec<String>,
    /// Example value taken from the first document that exhibited the field
    pub example: Value,
}

impl FieldDescriptor {
    pub fn new(type_name: impl Into<String>, example: Value) -> Self {
        Self {
            types: vec![type_name.into()],
            example,
        }
    }

    /// Record another observation of this field. Appends the type name if
    /// it has not been seen before; the example is never replaced.
    pub fn observe(&mut self, type_name: &str) {
        if !self.types.iter().any(|t| t == type_name) {
            self.types.push(type_name.to_string());
        }
    }

    /// Human-readable type label, e.g. `int32` or `int32 or string`.
    pub fn type_label(&self) -> String {
        self.types.join(" or ")
    }
}

/// Structural summary of a document collection: field name (the identity
/// field excluded) to inferred type descriptor, in first-seen field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub collection: String,
    pub fields: IndexMap<String, FieldDescriptor>,
    /// First sampled document, for the schema preview
    pub sample: Option<Value>,
}

impl CollectionSummary {
    /// True when the sample contained zero documents -- a distinguished
    /// outcome, not an error.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.sample.is_none()
    }
}

/// Wire format for a document-store query: a single JSON object.
///
/// When `pipeline` is present the query runs as an aggregation and every
/// find option is ignored -- aggregation stages are the caller's sole
/// mechanism for filtering, sorting and limiting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuerySpec {
    pub collection: String,
    pub filter: Option<Value>,
    pub projection: Option<Value>,
    pub sort: Option<Value>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub pipeline: Option<Vec<Value>>,
}

impl QuerySpec {
    /// Effective cap for a find: omitted means 5, an explicit 0 means
    /// unbounded. The two cases must not be conflated.
    pub fn find_limit(&self) -> Option<i64> {
        match self.limit {
            None => Some(5),
            Some(0) => None,
            Some(n) => Some(n),
        }
    }

    /// Whether the projection explicitly requests the identity field.
    pub fn projects_identity(&self) -> bool {
        self.projection
            .as_ref()
            .and_then(|p| p.as_object())
            .and_then(|obj| obj.get("_id"))
            .map(|v| v != &Value::from(0) && v != &Value::Bool(false))
            .unwrap_or(false)
    }
}

/// The most recent query's raw records aligned to its resolved column
/// list. Held by the session between an execution and its one consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    /// One entry per record, values aligned to `columns`
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_table_rendering_preserves_physical_order() {
        let summary = TableSummary {
            table: "users".to_string(),
            columns: vec![
                ColumnDef {
                    name: "id".to_string(),
                    data_type: "INTEGER".to_string(),
                    primary_key: true,
                },
                ColumnDef {
                    name: "name".to_string(),
                    data_type: "TEXT".to_string(),
                    primary_key: false,
                },
            ],
        };
        assert_eq!(
            summary.create_table_sql(),
            "CREATE TABLE users (\n    id INTEGER PRIMARY KEY,\n    name TEXT\n)"
        );
    }

    #[test]
    fn descriptor_appends_new_types_in_first_seen_order() {
        let mut desc = FieldDescriptor::new("int32", json!(1));
        desc.observe("int32");
        assert_eq!(desc.types, vec!["int32"]);

        desc.observe("string");
        desc.observe("int32");
        desc.observe("string");
        assert_eq!(desc.types, vec!["int32", "string"]);
        assert_eq!(desc.example, json!(1));
        assert_eq!(desc.type_label(), "int32 or string");
    }

    #[test]
    fn find_limit_distinguishes_omitted_from_zero() {
        let omitted: QuerySpec = serde_json::from_str(r#"{"collection": "c"}"#).unwrap();
        assert_eq!(omitted.find_limit(), Some(5));

        let unbounded: QuerySpec =
            serde_json::from_str(r#"{"collection": "c", "limit": 0}"#).unwrap();
        assert_eq!(unbounded.find_limit(), None);

        let capped: QuerySpec =
            serde_json::from_str(r#"{"collection": "c", "limit": 20}"#).unwrap();
        assert_eq!(capped.find_limit(), Some(20));
    }

    #[test]
    fn projection_identity_detection() {
        let spec: QuerySpec = serde_json::from_str(
            r#"{"collection": "c", "projection": {"_id": 1, "name": 1}}"#,
        )
        .unwrap();
        assert!(spec.projects_identity());

        let spec: QuerySpec = serde_json::from_str(
            r#"{"collection": "c", "projection": {"_id": 0, "name": 1}}"#,
        )
        .unwrap();
        assert!(!spec.projects_identity());

        let spec: QuerySpec =
            serde_json::from_str(r#"{"collection": "c", "projection": {"name": 1}}"#).unwrap();
        assert!(!spec.projects_identity());
    }
}
