//! Internal endpoints the bots report their progress to.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::params::callback::{ExitedParams, ProgressParams, StatusChangeParams};
use crate::{AppState, Error};
use domain::callback::{self as CallbackApi, AckStatus, CallbackAck, ExitReport, StatusReport};
use domain::MeetingStatus;
use log::*;

/// POST a unified status change from a bot
#[utoipa::path(
    post,
    path = "/bots/internal/callback/status_change",
    request_body = StatusChangeParams,
    responses(
        (status = 200, description = "Report accepted or ignored"),
        (status = 404, description = "Unknown connection id"),
        (status = 409, description = "The lifecycle does not allow this transition"),
        (status = 422, description = "Bots cannot report this status")
    )
)]
pub async fn status_change(
    State(app_state): State<AppState>,
    Json(params): Json<StatusChangeParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST status change: {params:?}");
    acknowledge(&app_state, params.into()).await
}

/// POST the bot is joining the meeting
#[utoipa::path(
    post,
    path = "/bots/internal/callback/joining",
    request_body = ProgressParams,
    responses(
        (status = 200, description = "Report accepted or ignored"),
        (status = 404, description = "Unknown connection id"),
        (status = 409, description = "The lifecycle does not allow this transition")
    )
)]
pub async fn joining(
    State(app_state): State<AppState>,
    Json(params): Json<ProgressParams>,
) -> Result<impl IntoResponse, Error> {
    acknowledge(&app_state, params.into_report(MeetingStatus::Joining)).await
}

/// POST the bot is waiting in the lobby
#[utoipa::path(
    post,
    path = "/bots/internal/callback/awaiting_admission",
    request_body = ProgressParams,
    responses(
        (status = 200, description = "Report accepted or ignored"),
        (status = 404, description = "Unknown connection id"),
        (status = 409, description = "The lifecycle does not allow this transition")
    )
)]
pub async fn awaiting_admission(
    State(app_state): State<AppState>,
    Json(params): Json<ProgressParams>,
) -> Result<impl IntoResponse, Error> {
    acknowledge(
        &app_state,
        params.into_report(MeetingStatus::AwaitingAdmission),
    )
    .await
}

/// POST the bot was admitted and is recording
#[utoipa::path(
    post,
    path = "/bots/internal/callback/started",
    request_body = ProgressParams,
    responses(
        (status = 200, description = "Report accepted or ignored"),
        (status = 404, description = "Unknown connection id"),
        (status = 409, description = "The lifecycle does not allow this transition")
    )
)]
pub async fn started(
    State(app_state): State<AppState>,
    Json(params): Json<ProgressParams>,
) -> Result<impl IntoResponse, Error> {
    acknowledge(&app_state, params.into_report(MeetingStatus::Active)).await
}

/// POST the bot process is exiting
#[utoipa::path(
    post,
    path = "/bots/internal/callback/exited",
    request_body = ExitedParams,
    responses(
        (status = 200, description = "Report accepted or ignored"),
        (status = 404, description = "Unknown connection id"),
        (status = 409, description = "The lifecycle does not allow this transition")
    )
)]
pub async fn exited(
    State(app_state): State<AppState>,
    Json(params): Json<ExitedParams>,
) -> Result<impl IntoResponse, Error> {
    info!(
        "Bot {} exited with code {}",
        params.connection_id, params.exit_code
    );
    let report = StatusReport::from(ExitReport::from(params));
    acknowledge(&app_state, report).await
}

async fn acknowledge(
    app_state: &AppState,
    report: StatusReport,
) -> Result<(StatusCode, Json<CallbackAck>), Error> {
    let ack = CallbackApi::handle_status_report(&app_state.lifecycle, report).await?;

    let status = match ack.status {
        AckStatus::Accepted | AckStatus::Ignored => StatusCode::OK,
        AckStatus::Error => StatusCode::CONFLICT,
    };
    Ok((status, Json(ack)))
}
