use domain::bot_request::{BotRequest, Platform};
use domain::error::Error as DomainError;
use serde::Deserialize;
use utoipa::ToSchema;

/// Body of `POST /bots`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestBotParams {
    /// `google_meet`, `teams` or `zoom`
    pub platform: String,
    pub native_meeting_id: String,
    pub passcode: Option<String>,
    pub bot_name: Option<String>,
    pub language: Option<String>,
    pub task: Option<String>,
}

impl TryFrom<RequestBotParams> for BotRequest {
    type Error = DomainError;

    fn try_from(params: RequestBotParams) -> Result<Self, Self::Error> {
        Ok(BotRequest {
            platform: params.platform.parse::<Platform>()?,
            native_meeting_id: params.native_meeting_id,
            passcode: params.passcode,
            bot_name: params.bot_name,
            language: params.language,
            task: params.task,
        })
    }
}

/// Body of `PUT /bots/{platform}/{native_meeting_id}/config`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReconfigureParams {
    pub language: Option<String>,
    pub task: Option<String>,
}
