//! Error types for entity API
use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;

use sea_orm::error::{DbErr, SqlErr};

/// Errors while executing operations related to meetings and sessions.
/// Split into two broad groups:
///  * Errors about the data itself. Ex DbErr::RecordNotFound
///  * Errors talking to the database. Ex DbErr::Conn
#[derive(Debug, PartialEq)]
pub struct Error {
    // Underlying error emitted from seaORM internals
    pub source: Option<DbErr>,
    // Enum representing which category of error
    pub error_kind: EntityApiErrorKind,
}

#[derive(Debug, PartialEq, Serialize)]
pub enum EntityApiErrorKind {
    // Record not found
    RecordNotFound,
    // Update matched no row
    RecordNotUpdated,
    // A unique constraint rejected the write (e.g. a reused session uid)
    UniqueViolation,
    // Stored data could not be decoded into the entity
    InvalidData,
    // Errors related to interactions with the database itself. Ex DbErr::Conn
    SystemError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Entity API Error ({:?}): {}", self.error_kind, source),
            None => write!(f, "Entity API Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
            return Error {
                source: Some(err),
                error_kind: EntityApiErrorKind::UniqueViolation,
            };
        }

        let error_kind = match err {
            DbErr::RecordNotFound(_) => EntityApiErrorKind::RecordNotFound,
            DbErr::RecordNotUpdated => EntityApiErrorKind::RecordNotUpdated,
            DbErr::Json(_) | DbErr::TryIntoErr { .. } | DbErr::Type(_) => {
                EntityApiErrorKind::InvalidData
            }
            _ => EntityApiErrorKind::SystemError,
        };

        Error {
            source: Some(err),
            error_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_not_updated_maps_to_its_own_kind() {
        let error: Error = DbErr::RecordNotUpdated.into();
        assert_eq!(error.error_kind, EntityApiErrorKind::RecordNotUpdated);
        assert!(error.source.is_some());
    }

    #[test]
    fn connection_failures_are_system_errors() {
        let error: Error = DbErr::Custom("connection reset".to_string()).into();
        assert_eq!(error.error_kind, EntityApiErrorKind::SystemError);
    }

    #[test]
    fn decode_failures_are_invalid_data() {
        let error: Error = DbErr::Json("expected object".to_string()).into();
        assert_eq!(error.error_kind, EntityApiErrorKind::InvalidData);
    }
}
