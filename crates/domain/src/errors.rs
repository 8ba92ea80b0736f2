use cqrs_es::{persist::PersistenceError, AggregateError};
use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Cannot {action}: {entity} is {actual}, expected {expected}")]
    InvalidState {
        entity: String,
        action: String,
        expected: String,
        actual: String,
    },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Authentication required")]
    Unauthorized,

    #[error("{entity} was modified concurrently, retry the request")]
    Concurrency { entity: String },

    #[error("Storage error: {message}")]
    Store { message: String },
}

impl Error {
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn insufficient_stock(medicine: &str, available: u32, requested: u32) -> Self {
        Self::Conflict {
            message: format!(
                "Insufficient stock for {medicine}. Available: {available}, Requested: {requested}"
            ),
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }

    /// Folds a framework error back into the domain taxonomy.
    pub fn from_aggregate(entity: &str, err: AggregateError<Error>) -> Self {
        match err {
            AggregateError::UserError(err) => err,
            AggregateError::AggregateConflict => Self::Concurrency {
                entity: entity.to_string(),
            },
            other => Self::store(other),
        }
    }
}

impl From<PersistenceError> for Error {
    fn from(err: PersistenceError) -> Self {
        Self::store(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::store(err)
    }
}

impl From<serde_dynamo::Error> for Error {
    fn from(err: serde_dynamo::Error) -> Self {
        Self::store(err)
    }
}
