//! Bodies posted by running bots. Bots identify themselves by `connection_id`, the
//! session uid they were started with.

use domain::callback::{ExitReport, StatusReport};
use domain::{CompletionReason, FailureStage, MeetingStatus};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

/// Unified status change report.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusChangeParams {
    pub connection_id: String,
    pub status: MeetingStatus,
    pub container_id: Option<String>,
    pub reason: Option<String>,
    pub exit_code: Option<i32>,
    pub completion_reason: Option<CompletionReason>,
    pub failure_stage: Option<FailureStage>,
    #[schema(value_type = Option<Object>)]
    pub error_details: Option<Value>,
    pub platform_specific_error: Option<String>,
}

impl From<StatusChangeParams> for StatusReport {
    fn from(params: StatusChangeParams) -> Self {
        StatusReport {
            runtime_instance_id: params.container_id,
            reason: params.reason,
            exit_code: params.exit_code,
            completion_reason: params.completion_reason,
            failure_stage: params.failure_stage,
            error_details: params.error_details,
            platform_specific_error: params.platform_specific_error,
            ..StatusReport::new(params.connection_id, params.status)
        }
    }
}

/// Joining, awaiting admission and started reports.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProgressParams {
    pub connection_id: String,
    pub container_id: Option<String>,
    pub reason: Option<String>,
}

impl ProgressParams {
    pub fn into_report(self, status: MeetingStatus) -> StatusReport {
        StatusReport {
            runtime_instance_id: self.container_id,
            reason: self.reason,
            ..StatusReport::new(self.connection_id, status)
        }
    }
}

/// Sent by the bot as its process exits.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExitedParams {
    pub connection_id: String,
    pub exit_code: i32,
    pub reason: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub error_details: Option<Value>,
    pub platform_specific_error: Option<String>,
    pub completion_reason: Option<CompletionReason>,
    pub failure_stage: Option<FailureStage>,
}

impl From<ExitedParams> for ExitReport {
    fn from(params: ExitedParams) -> Self {
        ExitReport {
            session_uid: params.connection_id,
            exit_code: params.exit_code,
            reason: params.reason,
            error_details: params.error_details,
            platform_specific_error: params.platform_specific_error,
            completion_reason: params.completion_reason,
            failure_stage: params.failure_stage,
        }
    }
}
