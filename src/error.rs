//! Engine-level error type.
//!
//! Storage faults stay in `DatabaseError`; this enum adds the request-level
//! kinds callers branch on. Permission errors are the calling layer's
//! problem, not this engine's.

use crate::db::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Database(DatabaseError::from(e))
    }
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_entity_and_id() {
        let id = uuid::Uuid::new_v4();
        let err = EngineError::not_found("prescription", id);
        assert_eq!(err.to_string(), format!("prescription not found: {id}"));
        assert!(matches!(err, EngineError::NotFound { entity: "prescription", .. }));
    }

    #[test]
    fn database_error_converts() {
        let err = EngineError::from(rusqlite::Error::InvalidQuery);
        assert!(matches!(err, EngineError::Database(_)));
    }
}
