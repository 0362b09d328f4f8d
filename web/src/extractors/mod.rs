pub(crate) mod caller;

use axum::http::StatusCode;

type RejectionType = (StatusCode, String);
