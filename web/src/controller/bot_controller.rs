use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::controller::ApiResponse;
use crate::extractors::caller::Caller;
use crate::params::bot::{ReconfigureParams, RequestBotParams};
use crate::{AppState, Error};
use domain::bot_request::{self as BotApi, BotRequest};
use domain::stop as StopApi;
use log::*;

/// POST request a bot for a meeting
#[utoipa::path(
    post,
    path = "/bots",
    request_body = RequestBotParams,
    responses(
        (status = 201, description = "Bot requested; the meeting starts in `requested`", body = domain::meetings::Model),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Concurrent bot limit reached"),
        (status = 422, description = "Unsupported platform or invalid meeting id"),
        (status = 502, description = "The bot runtime failed to start the bot")
    ),
    security(
        ("user_id" = [])
    )
)]
pub async fn create(
    Caller(user_id): Caller,
    State(app_state): State<AppState>,
    Json(params): Json<RequestBotParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("POST request bot for {user_id}: {params:?}");

    let request = BotRequest::try_from(params)?;
    let meeting = BotApi::request_bot(&app_state.lifecycle, &user_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(StatusCode::CREATED.into(), meeting)),
    ))
}

/// GET the bots currently running for the caller
#[utoipa::path(
    get,
    path = "/bots/status",
    responses(
        (status = 200, description = "Running bot instances owned by the caller"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "The bot runtime could not be queried")
    ),
    security(
        ("user_id" = [])
    )
)]
pub async fn status(
    Caller(user_id): Caller,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, Error> {
    let bots = BotApi::running_bots(&app_state.lifecycle, &user_id).await?;
    debug!("Found {} running bots for {user_id}", bots.len());

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), bots)))
}

/// GET the latest meeting for a platform meeting id
#[utoipa::path(
    get,
    path = "/bots/{platform}/{native_meeting_id}",
    params(
        ("platform" = String, Path, description = "google_meet, teams or zoom"),
        ("native_meeting_id" = String, Path, description = "The platform's meeting id")
    ),
    responses(
        (status = 200, description = "The most recent meeting for the key", body = domain::meetings::Model),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No meeting for the key")
    ),
    security(
        ("user_id" = [])
    )
)]
pub async fn read(
    Caller(user_id): Caller,
    State(app_state): State<AppState>,
    Path((platform, native_meeting_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    let meeting =
        BotApi::current_meeting(&app_state.lifecycle, &user_id, &platform, &native_meeting_id)
            .await?;

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), meeting)))
}

/// PUT new transcription settings for an active bot
#[utoipa::path(
    put,
    path = "/bots/{platform}/{native_meeting_id}/config",
    params(
        ("platform" = String, Path, description = "google_meet, teams or zoom"),
        ("native_meeting_id" = String, Path, description = "The platform's meeting id")
    ),
    request_body = ReconfigureParams,
    responses(
        (status = 202, description = "Reconfigure command sent to the bot"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No meeting for the key"),
        (status = 409, description = "The meeting is not active")
    ),
    security(
        ("user_id" = [])
    )
)]
pub async fn reconfigure(
    Caller(user_id): Caller,
    State(app_state): State<AppState>,
    Path((platform, native_meeting_id)): Path<(String, String)>,
    Json(params): Json<ReconfigureParams>,
) -> Result<impl IntoResponse, Error> {
    debug!("PUT reconfigure {platform}/{native_meeting_id}: {params:?}");

    let meeting = BotApi::reconfigure_bot(
        &app_state.lifecycle,
        &user_id,
        &platform,
        &native_meeting_id,
        params.language,
        params.task,
    )
    .await?;
    debug!("Reconfigure command published for meeting {}", meeting.id);

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::status_only(StatusCode::ACCEPTED.into())),
    ))
}

/// DELETE (stop) the bot of a meeting
#[utoipa::path(
    delete,
    path = "/bots/{platform}/{native_meeting_id}",
    params(
        ("platform" = String, Path, description = "google_meet, teams or zoom"),
        ("native_meeting_id" = String, Path, description = "The platform's meeting id")
    ),
    responses(
        (status = 202, description = "Stop accepted; it completes in the background"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No meeting for the key")
    ),
    security(
        ("user_id" = [])
    )
)]
pub async fn delete(
    Caller(user_id): Caller,
    State(app_state): State<AppState>,
    Path((platform, native_meeting_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, Error> {
    info!("DELETE stop bot {platform}/{native_meeting_id} for {user_id}");

    let outcome =
        StopApi::stop_meeting(&app_state.lifecycle, &user_id, &platform, &native_meeting_id)
            .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(StatusCode::ACCEPTED.into(), outcome)),
    ))
}
