//! Session-scoped query state.

use askdb_core::db::ResultSet;

/// Holds the most recent execution's result between a query and its one
/// consumer (result formatter or chart renderer).
///
/// Overwritten in full on every execution -- failed and empty executions
/// clear it. Owned by the interactive session, so concurrent sessions
/// each get their own; nothing here is process-global.
#[derive(Debug, Default)]
pub struct SessionState {
    last_result: Option<ResultSet>,
}

impl SessionState {
    pub fn record(&mut self, result: ResultSet) {
        self.last_result = Some(result);
    }

    pub fn clear(&mut self) {
        self.last_result = None;
    }

    pub fn last_result(&self) -> Option<&ResultSet> {
        self.last_result.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_execution_replaces_the_held_result() {
        let mut session = SessionState::default();
        assert!(session.last_result().is_none());

        session.record(ResultSet {
            columns: vec!["a".to_string()],
            rows: vec![vec![serde_json::json!(1)]],
        });
        assert_eq!(session.last_result().unwrap().columns, vec!["a"]);

        session.clear();
        assert!(session.last_result().is_none());
    }
}
