use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use domain::error::{
    DomainErrorKind, EntityErrorKind, Error as DomainError, ExternalErrorKind, InternalErrorKind,
};

extern crate log;
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(DomainError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match &self.0.error_kind {
            DomainErrorKind::Internal(internal_error_kind) => match internal_error_kind {
                InternalErrorKind::Entity(entity_error_kind) => match entity_error_kind {
                    EntityErrorKind::NotFound => StatusCode::NOT_FOUND,
                    EntityErrorKind::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
                    EntityErrorKind::Conflict => StatusCode::CONFLICT,
                    EntityErrorKind::DbTransaction | EntityErrorKind::Other(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                },
                InternalErrorKind::LimitExceeded => StatusCode::FORBIDDEN,
                InternalErrorKind::Config | InternalErrorKind::Other(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            DomainErrorKind::External(external_error_kind) => match external_error_kind {
                ExternalErrorKind::Network | ExternalErrorKind::Runtime => StatusCode::BAD_GATEWAY,
                ExternalErrorKind::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("{}", self.0);
            // Internal details stay in the log.
            let reason = status.canonical_reason().unwrap_or("INTERNAL SERVER ERROR");
            return (status, reason.to_uppercase()).into_response();
        }

        debug!("{}", self.0);
        let detail = match self.0.source.as_ref() {
            Some(source) => source.to_string(),
            None => status
                .canonical_reason()
                .unwrap_or_default()
                .to_uppercase(),
        };
        (status, detail).into_response()
    }
}

impl<E> From<E> for Error
where
    E: Into<DomainError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_for(error_kind: DomainErrorKind) -> StatusCode {
        Error(DomainError {
            source: None,
            error_kind,
        })
        .into_response()
        .status()
    }

    #[test]
    fn domain_errors_map_to_http_statuses() {
        use DomainErrorKind::*;

        assert_eq!(
            status_for(Internal(InternalErrorKind::Entity(EntityErrorKind::NotFound))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(Internal(InternalErrorKind::Entity(EntityErrorKind::Invalid))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(Internal(InternalErrorKind::Entity(EntityErrorKind::Conflict))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(Internal(InternalErrorKind::LimitExceeded)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(External(ExternalErrorKind::Runtime)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(Internal(InternalErrorKind::Entity(EntityErrorKind::DbTransaction))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
