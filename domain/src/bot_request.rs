//! Launching, reconfiguring and looking up bots on behalf of a user.

use crate::context::LifecycleContext;
use crate::error::{DomainErrorKind, Error, ExternalErrorKind, InternalErrorKind};
use crate::transition::{apply_transition, TransitionOutcome, TransitionRequest, TransitionSource};
use bot_runtime::{JoinParameters, RunningInstance};
use entity::meeting_data::MeetingData;
use entity::meetings::Model;
use entity::{FailureStage, MeetingStatus};
use entity_api::meeting::{self, NewMeeting};
use entity_api::meeting_session;
use events::{BotCommand, DomainEvent};
use log::*;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Meeting platforms a bot can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    GoogleMeet,
    Teams,
    Zoom,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GoogleMeet => "google_meet",
            Platform::Teams => "teams",
            Platform::Zoom => "zoom",
        }
    }

    /// Builds the join URL, rejecting ids that cannot belong to this platform.
    pub fn meeting_url(&self, native_meeting_id: &str, passcode: Option<&str>) -> Result<String, Error> {
        let id = native_meeting_id.trim();
        let valid = match self {
            // abc-defg-hij
            Platform::GoogleMeet => {
                let parts: Vec<&str> = id.split('-').collect();
                parts.len() == 3
                    && parts
                        .iter()
                        .zip([3, 4, 3])
                        .all(|(part, len)| part.len() == len && part.chars().all(|c| c.is_ascii_lowercase()))
            }
            Platform::Teams => (10..=15).contains(&id.len()) && id.chars().all(|c| c.is_ascii_digit()),
            Platform::Zoom => (9..=11).contains(&id.len()) && id.chars().all(|c| c.is_ascii_digit()),
        };

        if !valid {
            return Err(Error::invalid(format!(
                "'{native_meeting_id}' is not a valid {self} meeting id"
            )));
        }

        let passcode = passcode.map(str::trim).filter(|p| !p.is_empty());
        Ok(match (self, passcode) {
            (Platform::GoogleMeet, _) => format!("https://meet.google.com/{id}"),
            (Platform::Teams, Some(passcode)) => format!("https://teams.live.com/meet/{id}?p={passcode}"),
            (Platform::Teams, None) => format!("https://teams.live.com/meet/{id}"),
            (Platform::Zoom, Some(passcode)) => format!("https://zoom.us/j/{id}?pwd={passcode}"),
            (Platform::Zoom, None) => format!("https://zoom.us/j/{id}"),
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "google_meet" => Ok(Platform::GoogleMeet),
            "teams" => Ok(Platform::Teams),
            "zoom" => Ok(Platform::Zoom),
            other => Err(Error::invalid(format!("Unsupported platform '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotRequest {
    pub platform: Platform,
    pub native_meeting_id: String,
    pub passcode: Option<String>,
    pub bot_name: Option<String>,
    pub language: Option<String>,
    pub task: Option<String>,
}

/// Creates a meeting for `user_id` and starts a bot for it.
///
/// An unfinished earlier meeting for the same key is failed and its bot stopped so the
/// new launch is never blocked by stale state. STOPPING meetings are left to finish.
pub async fn request_bot(
    ctx: &LifecycleContext,
    user_id: &str,
    request: BotRequest,
) -> Result<Model, Error> {
    let platform = request.platform;
    let native_meeting_id = request.native_meeting_id.trim().to_string();
    let meeting_url = platform.meeting_url(&native_meeting_id, request.passcode.as_deref())?;
    info!("Bot requested by {user_id} for {platform}/{native_meeting_id}");

    retire_previous(ctx, user_id, platform.as_str(), &native_meeting_id).await?;

    if let Some(limit) = ctx.settings.max_concurrent_bots {
        let running = meeting::count_active_for_user(ctx.db(), user_id).await?;
        if running >= u64::from(limit) {
            warn!("User {user_id} reached the concurrent bot limit ({running}/{limit})");
            return Err(Error::with_message(
                DomainErrorKind::Internal(InternalErrorKind::LimitExceeded),
                format!("User has reached the maximum concurrent bot limit ({limit})"),
            ));
        }
    }

    let mut data = MeetingData::default();
    if let Some(passcode) = &request.passcode {
        data.other
            .insert("passcode".to_string(), Value::String(passcode.clone()));
    }

    let created = meeting::create(
        ctx.db(),
        NewMeeting {
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            native_meeting_id: native_meeting_id.clone(),
            data,
        },
    )
    .await?;
    let meeting_id = created.id;
    ctx.publish_status(&created).await;

    let params = JoinParameters {
        meeting_id,
        user_id: user_id.to_string(),
        platform: platform.to_string(),
        native_meeting_id,
        meeting_url: Some(meeting_url),
        bot_name: request
            .bot_name
            .unwrap_or_else(|| ctx.settings.default_bot_name.clone()),
        language: request.language,
        task: request.task,
        callback_url: ctx.settings.callback_base_url.clone(),
        command_channel: events::command_channel(meeting_id),
    };

    let started = match ctx.runtime.start(params).await {
        Ok(started) => started,
        Err(err) => {
            error!("Failed to start bot for meeting {meeting_id}: {err}");
            let request = TransitionRequest::failed(FailureStage::Requested)
                .source(TransitionSource::System)
                .reason("runtime_start_failed")
                .error_details(err.to_string());
            if let TransitionOutcome::Applied { meeting, .. } =
                apply_transition(ctx.db(), meeting_id, request).await?
            {
                ctx.publish_status(&meeting).await;
            }
            return Err(Error {
                source: Some(Box::new(err)),
                error_kind: DomainErrorKind::External(ExternalErrorKind::Runtime),
            });
        }
    };
    info!(
        "Started bot {} for meeting {meeting_id} (session {})",
        started.handle, started.session_uid
    );

    meeting_session::create(ctx.db(), meeting_id, &started.session_uid).await?;

    // Callbacks may already have moved the meeting on, so the handle is written on its own
    // under the row lock rather than through a status transition.
    let txn = ctx.db().begin().await?;
    let meeting = meeting::set_runtime_instance_id(&txn, meeting_id, &started.handle).await?;
    txn.commit().await?;

    if meeting.is_terminal() {
        warn!(
            "Meeting {meeting_id} became '{}' during launch; stopping bot {}",
            meeting.status, started.handle
        );
        if let Err(err) = ctx.runtime.stop(&started.handle).await {
            warn!("Could not stop bot {}: {err}", started.handle);
        }
    }
    Ok(meeting)
}

async fn retire_previous(
    ctx: &LifecycleContext,
    user_id: &str,
    platform: &str,
    native_meeting_id: &str,
) -> Result<(), Error> {
    let previous = meeting::find_by_natural_key(ctx.db(), user_id, platform, native_meeting_id)
        .await?
        .into_iter()
        .filter(|m| !m.is_terminal() && m.status() != MeetingStatus::Stopping);

    for old in previous {
        info!(
            "Failing meeting {} ('{}') to make room for a new launch",
            old.id, old.status
        );
        let request = TransitionRequest::failed(FailureStage::from_status(old.status()))
            .source(TransitionSource::System)
            .reason("stopped_for_new_launch");
        if let TransitionOutcome::Applied { meeting, .. } =
            apply_transition(ctx.db(), old.id, request).await?
        {
            ctx.publish_status(&meeting).await;
        }

        if let Some(handle) = old.runtime_instance_id {
            if let Err(err) = ctx.runtime.stop(&handle).await {
                warn!("Could not stop bot {handle} of meeting {}: {err}", old.id);
            }
        }
    }

    Ok(())
}

/// Sends new transcription settings to the bot of an ACTIVE meeting.
pub async fn reconfigure_bot(
    ctx: &LifecycleContext,
    user_id: &str,
    platform: &str,
    native_meeting_id: &str,
    language: Option<String>,
    task: Option<String>,
) -> Result<Model, Error> {
    let meeting = current_meeting(ctx, user_id, platform, native_meeting_id).await?;

    if meeting.status() != MeetingStatus::Active {
        return Err(Error::conflict(format!(
            "Meeting {} is '{}'; only active bots can be reconfigured",
            meeting.id, meeting.status
        )));
    }

    info!("Reconfiguring bot of meeting {}", meeting.id);
    ctx.events
        .publish(DomainEvent::BotCommand {
            meeting_id: meeting.id,
            command: BotCommand::Reconfigure { language, task },
        })
        .await;

    Ok(meeting)
}

/// The most recent meeting for the key, whatever its status.
pub async fn current_meeting(
    ctx: &LifecycleContext,
    user_id: &str,
    platform: &str,
    native_meeting_id: &str,
) -> Result<Model, Error> {
    meeting::find_latest_by_natural_key(ctx.db(), user_id, platform, native_meeting_id, None)
        .await?
        .ok_or_else(|| {
            Error::not_found(format!(
                "No meeting found for {platform}/{native_meeting_id}"
            ))
        })
}

/// A meeting by id, hidden from everyone but its owner.
pub async fn find_meeting(
    ctx: &LifecycleContext,
    user_id: &str,
    meeting_id: crate::Id,
) -> Result<Model, Error> {
    let meeting = meeting::find_by_id(ctx.db(), meeting_id).await?;
    if meeting.user_id != user_id {
        return Err(Error::not_found(format!("No meeting {meeting_id}")));
    }
    Ok(meeting)
}

pub async fn running_bots(
    ctx: &LifecycleContext,
    user_id: &str,
) -> Result<Vec<RunningInstance>, Error> {
    Ok(ctx.runtime.list_running(Some(user_id)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use async_trait::async_trait;
    use bot_runtime::{InMemoryRuntime, RuntimeAdapter, StartedInstance};
    use events::bus::ChannelBus;
    use events::EventPublisher;
    use sea_orm::DatabaseConnection;
    use serde_json::json;
    use std::sync::Arc;

    /// Starts bots in memory, then applies `on_start` to the meeting before returning,
    /// the way a fast bot's first callback can beat the launcher.
    struct CallbackFirstRuntime {
        inner: Arc<InMemoryRuntime>,
        db: Arc<DatabaseConnection>,
        on_start: fn() -> TransitionRequest,
    }

    #[async_trait]
    impl RuntimeAdapter for CallbackFirstRuntime {
        async fn start(&self, params: JoinParameters) -> Result<StartedInstance, bot_runtime::Error> {
            let meeting_id = params.meeting_id;
            let started = self.inner.start(params).await?;
            apply_transition(&self.db, meeting_id, (self.on_start)())
                .await
                .unwrap();
            Ok(started)
        }

        async fn stop(&self, handle: &str) -> Result<(), bot_runtime::Error> {
            self.inner.stop(handle).await
        }

        async fn is_running(&self, handle: &str) -> Result<bool, bot_runtime::Error> {
            self.inner.is_running(handle).await
        }

        async fn list_running(
            &self,
            owner: Option<&str>,
        ) -> Result<Vec<RunningInstance>, bot_runtime::Error> {
            self.inner.list_running(owner).await
        }

        fn runtime_id(&self) -> &str {
            self.inner.runtime_id()
        }
    }

    async fn callback_first_context(
        on_start: fn() -> TransitionRequest,
    ) -> (LifecycleContext, Arc<InMemoryRuntime>) {
        let db = Arc::new(test_db().await);
        let inner = Arc::new(InMemoryRuntime::new());
        let runtime = Arc::new(CallbackFirstRuntime {
            inner: inner.clone(),
            db: db.clone(),
            on_start,
        });
        let events = EventPublisher::new().with_handler(Arc::new(ChannelBus::new()));
        let ctx = LifecycleContext::new(
            db,
            runtime,
            events,
            Arc::new(CountingDispatcher::default()),
            test_settings(),
        );
        (ctx, inner)
    }

    fn meet_request() -> BotRequest {
        BotRequest {
            platform: Platform::GoogleMeet,
            native_meeting_id: "abc-defg-hij".to_string(),
            passcode: None,
            bot_name: None,
            language: Some("en".to_string()),
            task: None,
        }
    }

    #[test]
    fn meeting_urls_follow_each_platform() {
        assert_eq!(
            Platform::GoogleMeet.meeting_url("abc-defg-hij", None).unwrap(),
            "https://meet.google.com/abc-defg-hij"
        );
        assert_eq!(
            Platform::Zoom.meeting_url("1234567890", Some("xyz")).unwrap(),
            "https://zoom.us/j/1234567890?pwd=xyz"
        );
        assert_eq!(
            Platform::Teams.meeting_url("9876543210123", None).unwrap(),
            "https://teams.live.com/meet/9876543210123"
        );
        assert!(Platform::GoogleMeet.meeting_url("abc-defg", None).is_err());
        assert!(Platform::Zoom.meeting_url("12ab", None).is_err());
    }

    #[test]
    fn platforms_parse_from_their_wire_names() {
        assert_eq!("google_meet".parse::<Platform>().unwrap(), Platform::GoogleMeet);
        assert_eq!(" Zoom ".parse::<Platform>().unwrap(), Platform::Zoom);
        assert!("webex".parse::<Platform>().is_err());
    }

    #[tokio::test]
    async fn launching_a_bot_records_its_instance_and_session() {
        let harness = Harness::new().await;

        let meeting = request_bot(&harness.ctx, "user-1", meet_request())
            .await
            .unwrap();

        assert_eq!(meeting.status(), MeetingStatus::Requested);
        let handle = meeting.runtime_instance_id.clone().unwrap();
        assert!(harness.runtime.is_alive(&handle));
        let params = harness.runtime.join_parameters(&handle).unwrap();
        assert_eq!(params.meeting_url.as_deref(), Some("https://meet.google.com/abc-defg-hij"));
        assert_eq!(params.bot_name, "Test Bot");
        assert_eq!(params.command_channel, events::command_channel(meeting.id));

        let sessions = meeting_session::find_by_meeting_id(harness.db(), meeting.id)
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn handle_is_recorded_when_the_bot_reports_joining_during_launch() {
        let (ctx, runtime) = callback_first_context(|| {
            TransitionRequest::new(MeetingStatus::Joining).source(TransitionSource::BotCallback)
        })
        .await;

        let meeting = request_bot(&ctx, "user-1", meet_request()).await.unwrap();

        assert_eq!(meeting.status(), MeetingStatus::Joining);
        let handle = meeting.runtime_instance_id.clone().unwrap();
        assert!(runtime.is_alive(&handle));
        assert_eq!(runtime.stop_count(&handle), 0);
        assert_eq!(runtime.running_count(), 1);

        let stored = reload(ctx.db(), meeting.id).await;
        assert_eq!(stored.status(), MeetingStatus::Joining);
        assert_eq!(stored.runtime_instance_id.as_deref(), Some(handle.as_str()));
    }

    #[tokio::test]
    async fn bot_is_stopped_when_the_meeting_finished_during_launch() {
        let (ctx, runtime) = callback_first_context(|| {
            TransitionRequest::failed(FailureStage::Requested).reason("stopped_during_launch")
        })
        .await;

        let meeting = request_bot(&ctx, "user-1", meet_request()).await.unwrap();

        assert_eq!(meeting.status(), MeetingStatus::Failed);
        let handle = meeting.runtime_instance_id.clone().unwrap();
        assert!(!runtime.is_alive(&handle));
        assert_eq!(runtime.stop_count(&handle), 1);
        assert_eq!(runtime.running_count(), 0);
    }

    #[tokio::test]
    async fn relaunch_fails_the_previous_meeting() {
        let harness = Harness::new().await;
        let first = request_bot(&harness.ctx, "user-1", meet_request())
            .await
            .unwrap();
        let first_handle = first.runtime_instance_id.clone().unwrap();

        let second = request_bot(&harness.ctx, "user-1", meet_request())
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        let stored = reload(harness.db(), first.id).await;
        assert_eq!(stored.status(), MeetingStatus::Failed);
        assert_eq!(
            stored.data.last_transition().unwrap().reason.as_deref(),
            Some("stopped_for_new_launch")
        );
        assert!(!harness.runtime.is_alive(&first_handle));
    }

    #[tokio::test]
    async fn concurrent_bot_limit_is_enforced() {
        let mut settings = test_settings();
        settings.max_concurrent_bots = Some(1);
        let harness = Harness::with_settings(settings).await;
        request_bot(&harness.ctx, "user-1", meet_request())
            .await
            .unwrap();

        let mut zoom = meet_request();
        zoom.platform = Platform::Zoom;
        zoom.native_meeting_id = "1234567890".to_string();
        let err = request_bot(&harness.ctx, "user-1", zoom).await.unwrap_err();

        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::LimitExceeded)
        );
    }

    #[tokio::test]
    async fn start_failure_fails_the_meeting() {
        let harness = Harness::new().await;
        harness.runtime.fail_next_start();

        let err = request_bot(&harness.ctx, "user-1", meet_request())
            .await
            .unwrap_err();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::Runtime)
        );

        let meeting = current_meeting(&harness.ctx, "user-1", "google_meet", "abc-defg-hij")
            .await
            .unwrap();
        assert_eq!(meeting.status(), MeetingStatus::Failed);
        assert_eq!(meeting.data.failure_stage.as_deref(), Some("requested"));
        assert_eq!(
            meeting.data.last_transition().unwrap().source,
            "system"
        );
    }

    #[tokio::test]
    async fn reconfigure_requires_an_active_meeting() {
        let harness = Harness::new().await;

        let missing = reconfigure_bot(&harness.ctx, "user-1", "google_meet", "abc-defg-hij", None, None)
            .await
            .unwrap_err();
        assert!(missing.is_not_found());

        insert_meeting(harness.db(), "user-1", MeetingStatus::Joining).await;
        let not_active = reconfigure_bot(&harness.ctx, "user-1", "google_meet", "abc-defg-hij", None, None)
            .await
            .unwrap_err();
        assert_eq!(
            not_active.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Entity(
                crate::error::EntityErrorKind::Conflict
            ))
        );
    }

    #[tokio::test]
    async fn reconfigure_publishes_on_the_command_channel() {
        let harness = Harness::new().await;
        let (meeting, _) = harness.running_meeting(MeetingStatus::Active).await;
        let mut commands = harness.bus.subscribe(&events::command_channel(meeting.id));

        reconfigure_bot(
            &harness.ctx,
            "user-1",
            "google_meet",
            "abc-defg-hij",
            Some("de".to_string()),
            Some("translate".to_string()),
        )
        .await
        .unwrap();

        let command: Value = serde_json::from_str(&commands.try_recv().unwrap()).unwrap();
        assert_eq!(command["action"], json!("reconfigure"));
        assert_eq!(command["language"], json!("de"));
        assert_eq!(command["meeting_id"], json!(meeting.id));
    }

    #[tokio::test]
    async fn running_bots_are_filtered_by_owner() {
        let harness = Harness::new().await;
        request_bot(&harness.ctx, "user-1", meet_request())
            .await
            .unwrap();
        request_bot(&harness.ctx, "user-2", meet_request())
            .await
            .unwrap();

        let bots = running_bots(&harness.ctx, "user-1").await.unwrap();

        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].user_id(), Some("user-1"));
    }
}
