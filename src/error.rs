use thiserror::Error;

use crate::db::DatabaseError;

/// Errors surfaced by engine operations. Validation and lookup failures are
/// the caller's to fix; `Database` is an internal fault.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Database(DatabaseError),
}

impl EngineError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity_type: &str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<DatabaseError> for EngineError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => EngineError::NotFound { entity_type, id },
            other if other.is_unique_violation() => EngineError::Conflict(other.to_string()),
            other => EngineError::Database(other),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        DatabaseError::from(err).into()
    }
}
