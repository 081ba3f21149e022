//! Document-store adapter backed by MongoDB.

use std::collections::BTreeSet;

use askdb_core::db::{CollectionSummary, DbKind, FieldDescriptor, QuerySpec, ResultSet};
use futures_util::StreamExt;
use indexmap::IndexMap;
use mongodb::Client;
use mongodb::bson::{self, Bson, Document, doc};
use serde_json::Value;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::format;
use crate::schema_cache::SchemaCache;
use crate::{Database, ExecOutcome};

/// Aggregation stages that write; never forwarded to the server.
const WRITE_STAGES: [&str; 2] = ["$out", "$merge"];

/// Comparison operators the query checker flags when they appear without
/// their `$` prefix.
const BARE_OPERATORS: [&str; 8] = ["gt", "gte", "lt", "lte", "eq", "ne", "in", "nin"];

/// Example values in the schema preview are clipped to this length.
const SCHEMA_EXAMPLE_LEN: usize = 30;

pub struct MongoAdapter {
    client: Client,
    db_name: String,
    sample_size: usize,
    cache: SchemaCache,
}

impl MongoAdapter {
    pub fn new(client: Client, db_name: String, sample_size: usize) -> Self {
        Self {
            client,
            db_name,
            sample_size,
            cache: SchemaCache::new(),
        }
    }

    fn database(&self) -> mongodb::Database {
        self.client.database(&self.db_name)
    }

    /// Sample up to the configured number of documents from a collection.
    /// No sort is applied, so the inferred schema follows natural order --
    /// a best-effort heuristic, not a guarantee.
    fn sample_documents(&self, rt: &Runtime, collection: &str) -> EngineResult<Vec<Document>> {
        rt.block_on(async {
            let mut cursor = self
                .database()
                .collection::<Document>(collection)
                .find(doc! {})
                .limit(self.sample_size as i64)
                .await
                .map_err(|e| {
                    EngineError::Probe(format!(
                        "Error caching schema for collection {collection}: {e}"
                    ))
                })?;

            let mut documents = Vec::new();
            while let Some(result) = cursor.next().await {
                match result {
                    Ok(document) => documents.push(document),
                    Err(e) => warn!("Error reading document: {e}"),
                }
            }
            Ok(documents)
        })
    }

    /// Count documents matching a filter. Input is a JSON object with
    /// `collection` and an optional `filter`.
    pub fn count_documents(&self, rt: &Runtime, input: &str) -> EngineResult<u64> {
        let params: Value = serde_json::from_str(input).map_err(|_| {
            EngineError::InvalidQuery(format!("Invalid JSON in count input: {input}"))
        })?;
        let collection = params
            .get("collection")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::InvalidQuery("Collection name is required".to_string()))?
            .to_string();
        let filter = match params.get("filter") {
            Some(value) => json_to_document(value.clone())?,
            None => Document::new(),
        };

        rt.block_on(async {
            self.database()
                .collection::<Document>(&collection)
                .count_documents(filter)
                .await
                .map_err(|e| EngineError::Execution {
                    message: format!("Error counting MongoDB documents: {e}"),
                    context: String::new(),
                })
        })
    }

    fn failure_context(&self, rt: &Runtime) -> String {
        let available = self.list_names(rt).unwrap_or_default();
        format!("\n\nAvailable collections: {}", available.join(", "))
    }
}

impl Database for MongoAdapter {
    fn kind(&self) -> DbKind {
        DbKind::Document
    }

    fn list_names(&self, rt: &Runtime) -> EngineResult<Vec<String>> {
        rt.block_on(async {
            let mut names = self
                .database()
                .list_collection_names()
                .await
                .map_err(|e| EngineError::Probe(format!("Error listing collections: {e}")))?;
            names.sort();
            Ok(names)
        })
    }

    fn probe_schema(&self, rt: &Runtime, names: &str) -> EngineResult<String> {
        let requested: Vec<&str> = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();

        let mut blocks = Vec::new();
        for collection in requested {
            let block = self.cache.get_or_probe(collection, || {
                let documents = self.sample_documents(rt, collection)?;
                let summary = infer_collection_schema(collection, &documents);
                Ok(render_collection_schema(&summary))
            });
            match block {
                Ok(text) => blocks.push(text),
                Err(e) => blocks.push(format!("Error with collection {collection}: {e}")),
            }
        }
        Ok(blocks.join("\n\n"))
    }

    fn validate(&self, _rt: &Runtime, input: &str) -> EngineResult<String> {
        let query: Value = serde_json::from_str(input).map_err(|_| {
            EngineError::InvalidQuery(format!(
                "Invalid JSON in query. Please check the syntax: {input}"
            ))
        })?;

        if let Some(object) = query.as_object() {
            for key in object.keys() {
                if BARE_OPERATORS.contains(&key.as_str()) {
                    return Err(EngineError::InvalidQuery(format!(
                        "Operator '{key}' should be '${key}'."
                    )));
                }
            }
        }

        let pretty = serde_json::to_string_pretty(&query).unwrap_or_else(|_| query.to_string());
        Ok(format!("```json\n{pretty}\n```"))
    }

    fn execute(&self, rt: &Runtime, input: &str) -> EngineResult<ExecOutcome> {
        let spec: QuerySpec = serde_json::from_str(input).map_err(|_| {
            EngineError::InvalidQuery(format!("Invalid JSON in query input: {input}"))
        })?;
        if spec.collection.is_empty() {
            return Err(EngineError::InvalidQuery(
                "Collection name is required".to_string(),
            ));
        }

        let is_pipeline = spec.pipeline.is_some();
        let documents = if let Some(stages) = &spec.pipeline {
            // Aggregation: the pipeline is the sole mechanism for
            // filtering, sorting and limiting; find options are ignored.
            let pipeline: Vec<Document> = stages
                .iter()
                .map(|stage| json_to_document(stage.clone()))
                .collect::<EngineResult<_>>()?;
            for stage in &pipeline {
                if let Some(key) = stage.keys().next() {
                    if WRITE_STAGES.contains(&key.as_str()) {
                        return Err(EngineError::InvalidQuery(format!(
                            "Pipeline stage '{key}' writes to the database and is not permitted."
                        )));
                    }
                }
            }
            debug!("Executing MongoDB aggregation on {}", spec.collection);
            self.run_aggregate(rt, &spec.collection, pipeline)?
        } else {
            debug!("Executing MongoDB find on {}", spec.collection);
            self.run_find(rt, &spec)?
        };

        if documents.is_empty() {
            return Ok(ExecOutcome::Empty {
                message: "(no documents returned)",
            });
        }

        // Column list: union of keys across the returned documents,
        // lexicographically sorted; `_id` is dropped for finds unless the
        // projection asked for it.
        let mut keys: BTreeSet<String> = documents
            .iter()
            .flat_map(|document| document.keys().cloned())
            .collect();
        if !is_pipeline && !spec.projects_identity() {
            keys.remove("_id");
        }
        let columns: Vec<String> = keys.into_iter().collect();

        let rows: Vec<Vec<Value>> = documents
            .iter()
            .map(|document| {
                columns
                    .iter()
                    .map(|column| {
                        document
                            .get(column)
                            .map(bson_to_json)
                            .unwrap_or(Value::Null)
                    })
                    .collect()
            })
            .collect();

        let result = ResultSet { columns, rows };
        let rendered = format::markdown_table(&result.columns, &result.rows);
        Ok(ExecOutcome::Table { rendered, result })
    }
}

impl MongoAdapter {
    fn run_find(&self, rt: &Runtime, spec: &QuerySpec) -> EngineResult<Vec<Document>> {
        let filter = match &spec.filter {
            Some(value) => json_to_document(value.clone())?,
            None => Document::new(),
        };
        let projection = spec
            .projection
            .clone()
            .map(json_to_document)
            .transpose()?;
        let sort = spec.sort.clone().map(json_to_document).transpose()?;

        rt.block_on(async {
            let collection = self.database().collection::<Document>(&spec.collection);
            let mut find = collection.find(filter);
            if let Some(projection) = projection {
                find = find.projection(projection);
            }
            if let Some(sort) = sort {
                find = find.sort(sort);
            }
            find = find.skip(spec.skip.unwrap_or(0));
            if let Some(limit) = spec.find_limit() {
                find = find.limit(limit);
            }

            let mut cursor = match find.await {
                Ok(cursor) => cursor,
                Err(e) => {
                    warn!("MongoDB find failed: {e}");
                    return Err(EngineError::Execution {
                        message: format!("Error executing MongoDB query: {e}"),
                        context: self.failure_context_async().await,
                    });
                }
            };

            let mut documents = Vec::new();
            while let Some(result) = cursor.next().await {
                match result {
                    Ok(document) => documents.push(document),
                    Err(e) => warn!("Error reading document: {e}"),
                }
            }
            Ok(documents)
        })
    }

    fn run_aggregate(
        &self,
        rt: &Runtime,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> EngineResult<Vec<Document>> {
        rt.block_on(async {
            let aggregate = self
                .database()
                .collection::<Document>(collection)
                .aggregate(pipeline)
                .await;
            let mut cursor = match aggregate {
                Ok(cursor) => cursor,
                Err(e) => {
                    warn!("MongoDB aggregation failed: {e}");
                    return Err(EngineError::Execution {
                        message: format!("Error executing MongoDB query: {e}"),
                        context: self.failure_context_async().await,
                    });
                }
            };

            let mut documents = Vec::new();
            while let Some(result) = cursor.next().await {
                match result {
                    Ok(document) => documents.push(document),
                    Err(e) => warn!("Error reading document: {e}"),
                }
            }
            Ok(documents)
        })
    }

    async fn failure_context_async(&self) -> String {
        let mut names = self
            .database()
            .list_collection_names()
            .await
            .unwrap_or_default();
        names.sort();
        format!("\n\nAvailable collections: {}", names.join(", "))
    }
}

fn json_to_document(value: Value) -> EngineResult<Document> {
    bson::to_document(&value)
        .map_err(|e| EngineError::InvalidQuery(format!("Invalid query document: {e}")))
}

/// Accumulate field type descriptors over sampled documents. The
/// identity field is skipped; the recorded example comes from the first
/// document exhibiting the field, and multi-typed fields never collapse.
pub(crate) fn infer_collection_schema(
    collection: &str,
    documents: &[Document],
) -> CollectionSummary {
    let mut fields: IndexMap<String, FieldDescriptor> = IndexMap::new();
    for document in documents {
        for (field, value) in document {
            if field == "_id" {
                continue;
            }
            let type_name = bson_type_name(value);
            match fields.get_mut(field) {
                Some(descriptor) => descriptor.observe(type_name),
                None => {
                    fields.insert(
                        field.clone(),
                        FieldDescriptor::new(type_name, bson_to_json(value)),
                    );
                }
            }
        }
    }

    CollectionSummary {
        collection: collection.to_string(),
        fields,
        sample: documents
            .first()
            .map(|document| bson_to_json(&Bson::Document(document.clone()))),
    }
}

/// Markdown schema preview: field table with clipped example values --
/// nested values show a placeholder here, unlike result tables -- plus
/// the first sampled document as JSON.
pub(crate) fn render_collection_schema(summary: &CollectionSummary) -> String {
    if summary.is_empty() {
        return format!("## Collection: {}\n\nNo documents found.", summary.collection);
    }

    let mut md = format!("## Collection: {}\n\n### Schema:\n\n", summary.collection);
    md.push_str("| Field | Type | Example |\n");
    md.push_str("|-------|------|--------|\n");
    for (field, descriptor) in &summary.fields {
        let example = match &descriptor.example {
            Value::Array(_) | Value::Object(_) => "complex structure".to_string(),
            other => format::clip(&format::cell_text(other), SCHEMA_EXAMPLE_LEN),
        };
        md.push_str(&format!(
            "| {} | {} | {} |\n",
            field,
            descriptor.type_label(),
            example
        ));
    }

    if let Some(sample) = &summary.sample {
        md.push_str(&format!("\n### Sample Document:\n\n```json\n{sample}\n```\n"));
    }
    md
}

/// Convert a BSON value to JSON for rendering and charting.
fn bson_to_json(bson: &Bson) -> Value {
    match bson {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::Number((*i).into()),
        Bson::Int64(i) => Value::Number((*i).into()),
        Bson::Double(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s.clone()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(dt.to_string()),
        Bson::Array(array) => Value::Array(array.iter().map(bson_to_json).collect()),
        Bson::Document(document) => Value::Object(
            document
                .iter()
                .map(|(k, v)| (k.clone(), bson_to_json(v)))
                .collect(),
        ),
        Bson::Binary(binary) => Value::String(format!("<binary {} bytes>", binary.bytes.len())),
        Bson::RegularExpression(regex) => {
            Value::String(format!("/{}/{}", regex.pattern, regex.options))
        }
        Bson::Timestamp(ts) => Value::String(format!("Timestamp({}, {})", ts.time, ts.increment)),
        other => Value::String(format!("{other:?}")),
    }
}

/// Human-readable type name for a BSON value.
fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Null => "null",
        Bson::Boolean(_) => "bool",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::ObjectId(_) => "ObjectId",
        Bson::DateTime(_) => "DateTime",
        Bson::Array(_) => "Array",
        Bson::Document(_) => "Document",
        Bson::Binary(_) => "Binary",
        Bson::RegularExpression(_) => "Regex",
        Bson::Timestamp(_) => "Timestamp",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn disagreeing_samples_produce_multi_type_descriptor_in_first_seen_order() {
        let documents = vec![doc! { "a": 1 }, doc! { "a": "x" }];
        let summary = infer_collection_schema("events", &documents);

        let descriptor = &summary.fields["a"];
        assert_eq!(descriptor.types, vec!["int32", "string"]);
        assert_eq!(descriptor.example, json!(1));
    }

    #[test]
    fn identity_field_is_excluded_from_inference() {
        let documents = vec![doc! { "_id": 7, "name": "x" }];
        let summary = infer_collection_schema("users", &documents);
        assert!(!summary.fields.contains_key("_id"));
        assert!(summary.fields.contains_key("name"));
    }

    #[test]
    fn empty_sample_is_a_distinguished_outcome() {
        let summary = infer_collection_schema("empty", &[]);
        assert!(summary.is_empty());
        assert_eq!(
            render_collection_schema(&summary),
            "## Collection: empty\n\nNo documents found."
        );
    }

    #[test]
    fn schema_preview_shows_placeholder_for_nested_examples() {
        let documents = vec![doc! { "address": { "city": "Pune" }, "tags": ["a", "b"] }];
        let rendered = render_collection_schema(&infer_collection_schema("users", &documents));
        assert!(rendered.contains("| address | Document | complex structure |"));
        assert!(rendered.contains("| tags | Array | complex structure |"));
        assert!(rendered.contains("### Sample Document:"));
    }

    #[test]
    fn long_example_values_are_clipped_in_the_preview() {
        let documents = vec![doc! { "bio": "b".repeat(60) }];
        let rendered = render_collection_schema(&infer_collection_schema("users", &documents));
        assert!(rendered.contains(&format!("{}...", "b".repeat(27))));
    }

    #[test]
    fn checker_flags_bare_comparison_operators() {
        let rt = runtime();
        let adapter = test_adapter(&rt);

        let err = adapter
            .validate(&rt, r#"{"gt": 5}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("'gt' should be '$gt'"));

        let ok = adapter.validate(&rt, r#"{"age": {"$gt": 5}}"#).unwrap();
        assert!(ok.starts_with("```json"));
    }

    #[test]
    fn checker_rejects_malformed_json() {
        let rt = runtime();
        let err = test_adapter(&rt)
            .validate(&rt, "{not json")
            .unwrap_err()
            .to_string();
        assert!(err.contains("Invalid JSON"));
    }

    #[test]
    fn write_stages_are_rejected_before_reaching_the_server() {
        let rt = runtime();
        let input = r#"{"collection": "users", "pipeline": [{"$match": {}}, {"$out": "copy"}]}"#;
        let err = test_adapter(&rt)
            .execute(&rt, input)
            .unwrap_err()
            .to_string();
        assert!(err.contains("$out"));
        assert!(err.contains("not permitted"));
    }

    #[test]
    fn malformed_query_input_is_a_distinguished_error() {
        let rt = runtime();
        let err = test_adapter(&rt)
            .execute(&rt, "{oops")
            .unwrap_err()
            .to_string();
        assert!(err.contains("Invalid JSON in query input"));
    }

    #[test]
    fn missing_collection_name_is_rejected() {
        let rt = runtime();
        let err = test_adapter(&rt)
            .execute(&rt, r#"{"collection": ""}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("Collection name is required"));
    }

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    /// Adapter over a lazily-connecting client. Constructing it never
    /// touches the network, so it serves the code paths that fail before
    /// any server round-trip.
    fn test_adapter(rt: &Runtime) -> MongoAdapter {
        let client = rt
            .block_on(Client::with_uri_str("mongodb://localhost:27017"))
            .unwrap();
        MongoAdapter::new(client, "test".to_string(), 100)
    }
}
