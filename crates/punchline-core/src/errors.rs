use thiserror::Error;

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A UNIQUE constraint rejected the write. Callers that race on inserts
    /// recover by re-reading the winning row.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(inner, msg) = &e {
            if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return StoreError::Conflict(msg.clone().unwrap_or_else(|| inner.to_string()));
            }
        }
        StoreError::Database(e)
    }
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Errors surfaced by the competition API.
///
/// Only `InvalidInput` and `NotFound` are meant for clients. Backend failures
/// never appear here: they are recorded as completed results carrying an
/// error marker.
#[derive(Debug, Error)]
pub enum CompetitionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl CompetitionError {
    pub fn game_not_found(id: &str) -> Self {
        CompetitionError::NotFound {
            kind: "game",
            id: id.to_string(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CompetitionError::InvalidInput(_) | CompetitionError::NotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn unique_violation_maps_to_conflict() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (w TEXT NOT NULL UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        let mapped = StoreError::from(err);
        assert!(mapped.is_conflict(), "got {mapped:?}");
    }

    #[test]
    fn other_failures_stay_database_errors() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("INSERT INTO missing VALUES (1)", []).unwrap_err();
        assert!(matches!(StoreError::from(err), StoreError::Database(_)));
    }

    #[test]
    fn only_input_and_lookup_errors_are_client_facing() {
        assert!(CompetitionError::InvalidInput("x".into()).is_client_error());
        assert!(CompetitionError::game_not_found("g").is_client_error());
        assert!(!CompetitionError::Storage(StoreError::Corrupt("bad".into())).is_client_error());
    }
}
