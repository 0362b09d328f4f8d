//! Ingestion of lifecycle reports posted by running bots.
//!
//! Bots only know their own connection id, so every report is resolved through the
//! meeting session table before it reaches the transition engine.

use crate::context::LifecycleContext;
use crate::error::Error;
use crate::transition::{apply_transition, TransitionOutcome, TransitionRequest, TransitionSource};
use crate::Id;
use entity::meeting_data::LastError;
use entity::{CompletionReason, FailureStage, MeetingStatus};
use entity_api::{meeting, meeting_session};
use log::*;
use serde::Serialize;
use serde_json::Value;

/// A status report from a bot.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub session_uid: String,
    pub status: MeetingStatus,
    /// Container id or other handle the bot runs under
    pub runtime_instance_id: Option<String>,
    pub reason: Option<String>,
    pub exit_code: Option<i32>,
    pub completion_reason: Option<CompletionReason>,
    pub failure_stage: Option<FailureStage>,
    pub error_details: Option<Value>,
    pub platform_specific_error: Option<String>,
}

impl StatusReport {
    pub fn new(session_uid: impl Into<String>, status: MeetingStatus) -> Self {
        Self {
            session_uid: session_uid.into(),
            status,
            runtime_instance_id: None,
            reason: None,
            exit_code: None,
            completion_reason: None,
            failure_stage: None,
            error_details: None,
            platform_specific_error: None,
        }
    }
}

/// The report a bot sends when its process exits.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitReport {
    pub session_uid: String,
    pub exit_code: i32,
    pub reason: Option<String>,
    pub error_details: Option<Value>,
    pub platform_specific_error: Option<String>,
    pub completion_reason: Option<CompletionReason>,
    pub failure_stage: Option<FailureStage>,
}

impl From<ExitReport> for StatusReport {
    fn from(exit: ExitReport) -> Self {
        if exit.exit_code == 0 {
            return StatusReport {
                completion_reason: Some(exit.completion_reason.unwrap_or(CompletionReason::Stopped)),
                reason: exit.reason,
                exit_code: Some(0),
                error_details: exit.error_details,
                platform_specific_error: exit.platform_specific_error,
                ..StatusReport::new(exit.session_uid, MeetingStatus::Completed)
            };
        }

        let reason = exit.reason.as_deref().unwrap_or("unknown");
        let error_details = exit.error_details.unwrap_or_else(|| {
            Value::String(format!(
                "Bot exited with code {}; reason: {reason}",
                exit.exit_code
            ))
        });

        StatusReport {
            failure_stage: Some(exit.failure_stage.unwrap_or(FailureStage::Active)),
            completion_reason: exit.completion_reason,
            exit_code: Some(exit.exit_code),
            error_details: Some(error_details),
            platform_specific_error: exit.platform_specific_error,
            reason: exit.reason,
            ..StatusReport::new(exit.session_uid, MeetingStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Accepted,
    Ignored,
    /// The report asked for a transition the lifecycle does not allow
    Error,
}

/// What the bot gets back for a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackAck {
    pub status: AckStatus,
    pub meeting_id: Id,
    pub meeting_status: MeetingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CallbackAck {
    fn new(status: AckStatus, meeting_id: Id, meeting_status: MeetingStatus) -> Self {
        Self {
            status,
            meeting_id,
            meeting_status,
            detail: None,
        }
    }

    fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Applies a bot's status report to its meeting.
///
/// Unknown sessions and meetings are errors; rejected transitions are acknowledged with
/// [`AckStatus::Error`] and the meeting's current status. Exit-style reports always
/// trigger post-lifecycle dispatch, even when the meeting was already finalized.
pub async fn handle_status_report(
    ctx: &LifecycleContext,
    report: StatusReport,
) -> Result<CallbackAck, Error> {
    let status = report.status;
    if matches!(status, MeetingStatus::Requested | MeetingStatus::Stopping) {
        return Err(Error::invalid(format!(
            "Bots cannot report status '{status}'"
        )));
    }

    let session = meeting_session::find_by_session_uid(ctx.db(), &report.session_uid)
        .await?
        .ok_or_else(|| {
            warn!("Callback for unknown session {}", report.session_uid);
            Error::not_found(format!("No meeting session for '{}'", report.session_uid))
        })?;
    let meeting_id = session.meeting_id;
    let current = meeting::find_by_id(ctx.db(), meeting_id).await?;
    debug!(
        "Callback '{status}' for meeting {meeting_id} (currently '{}')",
        current.status
    );

    let handle = report
        .runtime_instance_id
        .clone()
        .or_else(|| current.runtime_instance_id.clone());
    let schedule_failed_exit_stop =
        status == MeetingStatus::Failed && report.exit_code != Some(0) && handle.is_some();

    let request = build_request(report, current.status());
    let outcome = apply_transition(ctx.db(), meeting_id, request).await?;

    let ack = match &outcome {
        TransitionOutcome::Applied { meeting, .. } => {
            ctx.publish_status(meeting).await;
            CallbackAck::new(AckStatus::Accepted, meeting_id, meeting.status())
        }
        TransitionOutcome::Unchanged(meeting) => {
            CallbackAck::new(AckStatus::Accepted, meeting_id, meeting.status())
        }
        TransitionOutcome::Suppressed(meeting) => {
            warn!("Ignoring '{status}' callback for meeting {meeting_id}: stop requested");
            CallbackAck::new(AckStatus::Ignored, meeting_id, meeting.status())
                .detail("Stop requested for this meeting")
        }
        TransitionOutcome::Rejected { meeting, requested } => {
            let stored = meeting.status();
            if stored.is_terminal() && requested.is_terminal() {
                info!("Meeting {meeting_id} already '{stored}'; duplicate '{requested}' report ignored");
                CallbackAck::new(AckStatus::Ignored, meeting_id, stored)
                    .detail(format!("Meeting already '{stored}'"))
            } else {
                CallbackAck::new(AckStatus::Error, meeting_id, stored).detail(format!(
                    "Transition from '{stored}' to '{requested}' is not allowed"
                ))
            }
        }
    };

    if status.is_terminal() {
        ctx.schedule_post_lifecycle(meeting_id);
    }

    if schedule_failed_exit_stop && !matches!(outcome, TransitionOutcome::Suppressed(_)) {
        if let Some(handle) = handle {
            ctx.schedule_delayed_stop(meeting_id, handle, ctx.settings.failed_exit_stop);
        }
    }

    Ok(ack)
}

fn build_request(report: StatusReport, current: MeetingStatus) -> TransitionRequest {
    let status = report.status;
    let mut request = TransitionRequest::new(status)
        .source(TransitionSource::BotCallback)
        .respect_stop_request();

    if let Some(reason) = &report.reason {
        request = request.reason(reason.clone());
    }
    if let Some(exit_code) = report.exit_code {
        request = request.metadata("exit_code", exit_code);
    }
    if let Some(platform_error) = &report.platform_specific_error {
        request = request.metadata("platform_specific_error", platform_error.clone());
    }
    if let Some(handle) = &report.runtime_instance_id {
        if status == MeetingStatus::Active {
            request = request.runtime_instance_id(handle.clone());
        } else {
            request = request.metadata("container_id", handle.clone());
        }
    }

    match status {
        MeetingStatus::Completed => {
            request = request
                .completion_reason(report.completion_reason.unwrap_or(CompletionReason::Stopped));
            if let Some(details) = report.error_details {
                request = request.error_details(details);
            }
        }
        MeetingStatus::Failed => {
            request = request.failure_stage(
                report
                    .failure_stage
                    .unwrap_or_else(|| FailureStage::from_status(current)),
            );
            if let Some(reason) = report.completion_reason {
                request = request.completion_reason(reason);
            }
            if report.error_details.is_some() || report.platform_specific_error.is_some() {
                request = request.last_error(LastError {
                    exit_code: report.exit_code,
                    reason: report.reason,
                    timestamp: chrono::Utc::now(),
                    error_details: report.error_details.clone(),
                    platform_specific_error: report.platform_specific_error,
                });
            }
            if let Some(details) = report.error_details {
                request = request.error_details(details);
            }
        }
        _ => {}
    }

    request
}
