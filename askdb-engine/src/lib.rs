//! Database core for askdb.
//!
//! Two backend adapters -- relational (MySQL with an embedded SQLite
//! fallback) and document (MongoDB) -- behind one capability trait, plus
//! the schema cache, the textual query guard, result rendering and chart
//! output. The agent shell sees only this surface.

pub mod chart;
pub mod connect;
pub mod document;
pub mod error;
pub mod format;
pub mod guard;
pub mod relational;
pub mod schema_cache;
pub mod session;

pub use error::{EngineError, EngineResult};

use askdb_core::db::{DbKind, ResultSet};
use tokio::runtime::Runtime;

/// Outcome of a successful query execution.
#[derive(Debug)]
pub enum ExecOutcome {
    /// Rendered table plus the raw records for downstream consumers.
    Table { rendered: String, result: ResultSet },
    /// Distinguished zero-record outcome; any held result must be dropped.
    Empty { message: &'static str },
}

/// Capability surface shared by the two backend adapters.
///
/// All methods are blocking: adapters hold async drivers and drive them
/// with `block_on` on the supplied runtime. One user question is in
/// flight at a time; nothing here suspends, retries or times out.
pub trait Database: Send + Sync {
    fn kind(&self) -> DbKind;

    /// Names of the tables or collections visible on this backend.
    fn list_names(&self, rt: &Runtime) -> EngineResult<Vec<String>>;

    /// Structural summaries for a comma-separated list of names, served
    /// from the schema cache within its staleness window.
    fn probe_schema(&self, rt: &Runtime, names: &str) -> EngineResult<String>;

    /// Check a statement or query document without executing it.
    fn validate(&self, rt: &Runtime, input: &str) -> EngineResult<String>;

    /// Execute a read-only query.
    fn execute(&self, rt: &Runtime, input: &str) -> EngineResult<ExecOutcome>;
}
