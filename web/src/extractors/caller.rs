use crate::extractors::RejectionType;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use log::*;

/// Header the upstream gateway sets after authenticating the caller.
pub(crate) const USER_ID_HEADER: &str = "x-user-id";

/// The user a request is made on behalf of.
pub(crate) struct Caller(pub String);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match user_id {
            Some(user_id) => Ok(Caller(user_id.to_string())),
            None => {
                debug!("Rejecting request without a {USER_ID_HEADER} header");
                Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))
            }
        }
    }
}
