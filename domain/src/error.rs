//! Error types for the `domain` layer.
use entity_api::error::{EntityApiErrorKind, Error as EntityApiError};
use sea_orm::DbErr;
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors in the Domain layer are modeled as a tree structure
/// with `domain::error::Error` as the root type holding a tree of `error_kind`
/// enums that represent the kinds of errors that can occur in the domain layer or
/// in lower layers. The `source` field holds the original error that caused
/// the domain error. `web` maps the `error_kind`s to HTTP status codes without
/// depending on `entity_api` or `bot_runtime` directly.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

/// Enum representing the various kinds of internal errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Entity(EntityErrorKind),
    Config,
    /// The caller already runs as many bots as allowed
    LimitExceeded,
    Other(String),
}

/// Entity errors reduced to what the `domain` layer and its callers care about.
#[derive(Debug, PartialEq)]
pub enum EntityErrorKind {
    NotFound,
    Invalid,
    /// The record exists but is in a state that does not allow the operation
    Conflict,
    DbTransaction,
    Other(String),
}

/// Enum representing the various kinds of external errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    Network,
    /// The bot runtime backend failed or could not be reached
    Runtime,
    Other(String),
}

impl Error {
    pub(crate) fn with_message(error_kind: DomainErrorKind, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Error {
            source: Some(message.into()),
            error_kind,
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(
            DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound)),
            message,
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::with_message(
            DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::Invalid)),
            message,
        )
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::with_message(
            DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::Conflict)),
            message,
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.error_kind
            == DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Domain Error ({:?}): {source}", self.error_kind),
            None => write!(f, "Domain Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

// This is where we translate errors from the `entity_api` layer to the `domain` layer.
impl From<EntityApiError> for Error {
    fn from(err: EntityApiError) -> Self {
        let entity_error_kind = match err.error_kind {
            EntityApiErrorKind::RecordNotFound => EntityErrorKind::NotFound,
            EntityApiErrorKind::InvalidData => EntityErrorKind::Invalid,
            EntityApiErrorKind::UniqueViolation => EntityErrorKind::Conflict,
            EntityApiErrorKind::RecordNotUpdated | EntityApiErrorKind::SystemError => {
                EntityErrorKind::DbTransaction
            }
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: DomainErrorKind::Internal(InternalErrorKind::Entity(entity_error_kind)),
        }
    }
}

// Transactions are opened directly in the domain layer.
impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        EntityApiError::from(err).into()
    }
}

impl From<bot_runtime::Error> for Error {
    fn from(err: bot_runtime::Error) -> Self {
        let error_kind = match &err {
            bot_runtime::Error::Configuration(_) => DomainErrorKind::Internal(InternalErrorKind::Config),
            bot_runtime::Error::NotFound(_) => {
                DomainErrorKind::Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))
            }
            _ => DomainErrorKind::External(ExternalErrorKind::Runtime),
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}
