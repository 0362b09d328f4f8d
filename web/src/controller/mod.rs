use serde::Serialize;
pub(crate) mod bot_controller;
pub(crate) mod callback_controller;
pub(crate) mod health_check_controller;

/// Envelope for every bot endpoint body: the HTTP status echoed back, plus the payload
/// when there is one.
#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status_code: u16, data: T) -> Self {
        Self {
            status_code,
            data: Some(data),
        }
    }

    /// For accepted commands, which have nothing to report until the bot acts on them.
    pub fn status_only(status_code: u16) -> ApiResponse<()> {
        ApiResponse {
            status_code,
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[test]
    fn created_meeting_is_wrapped_under_data() {
        let response = ApiResponse::new(
            StatusCode::CREATED.into(),
            json!({"platform": "google_meet", "status": "requested"}),
        );

        let body: Value = serde_json::to_value(&response).unwrap();

        assert_eq!(
            body,
            json!({
                "status_code": 201,
                "data": {"platform": "google_meet", "status": "requested"}
            })
        );
    }

    #[test]
    fn accepted_command_carries_no_data_key() {
        let response = ApiResponse::<()>::status_only(StatusCode::ACCEPTED.into());

        let body: Value = serde_json::to_value(&response).unwrap();

        assert_eq!(body, json!({"status_code": 202}));
        assert!(body.get("data").is_none());
    }
}
