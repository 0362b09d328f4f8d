//! Everything a lifecycle operation needs, bundled so it can be cloned into background tasks.

use crate::tasks::{PostLifecycleDispatcher, TaskScheduler};
use crate::Id;
use bot_runtime::RuntimeAdapter;
use entity::meetings;
use events::{DomainEvent, EventPublisher};
use log::*;
use sea_orm::DatabaseConnection;
use service::config::Config;
use std::sync::Arc;
use std::time::Duration;

/// Timings and limits of the bot lifecycle.
#[derive(Clone, Debug)]
pub struct LifecycleSettings {
    /// Meetings younger than this are stopped without waiting for a graceful leave
    pub fast_stop_threshold: Duration,
    pub delayed_stop: Duration,
    pub failed_exit_stop: Duration,
    pub finalize_grace: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_backoff: Duration,
    pub max_concurrent_bots: Option<u32>,
    pub callback_base_url: String,
    pub default_bot_name: String,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            fast_stop_threshold: Duration::from_secs(5),
            delayed_stop: Duration::from_secs(30),
            failed_exit_stop: Duration::from_secs(10),
            finalize_grace: Duration::from_secs(1),
            reconcile_interval: Duration::from_secs(300),
            reconcile_backoff: Duration::from_secs(60),
            max_concurrent_bots: None,
            callback_base_url: "http://127.0.0.1:8080/bots/internal/callback".to_string(),
            default_bot_name: "Notetaker".to_string(),
        }
    }
}

impl From<&Config> for LifecycleSettings {
    fn from(config: &Config) -> Self {
        Self {
            fast_stop_threshold: config.fast_stop_threshold(),
            delayed_stop: config.delayed_stop(),
            failed_exit_stop: config.failed_exit_stop(),
            finalize_grace: config.finalize_grace(),
            reconcile_interval: config.reconcile_interval(),
            reconcile_backoff: config.reconcile_backoff(),
            max_concurrent_bots: config.max_concurrent_bots(),
            callback_base_url: config.callback_base_url.clone(),
            default_bot_name: config.default_bot_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct LifecycleContext {
    pub db: Arc<DatabaseConnection>,
    pub runtime: Arc<dyn RuntimeAdapter>,
    pub events: EventPublisher,
    pub tasks: TaskScheduler,
    pub post_lifecycle: Arc<dyn PostLifecycleDispatcher>,
    pub settings: Arc<LifecycleSettings>,
}

impl LifecycleContext {
    pub fn new(
        db: Arc<DatabaseConnection>,
        runtime: Arc<dyn RuntimeAdapter>,
        events: EventPublisher,
        post_lifecycle: Arc<dyn PostLifecycleDispatcher>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            db,
            runtime,
            events,
            tasks: TaskScheduler::new(),
            post_lifecycle,
            settings: Arc::new(settings),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Announces the meeting's current status on its status channel.
    pub async fn publish_status(&self, meeting: &meetings::Model) {
        self.events
            .publish(DomainEvent::MeetingStatusChanged {
                meeting_id: meeting.id,
                user_id: meeting.user_id.clone(),
                platform: meeting.platform.clone(),
                native_meeting_id: meeting.native_meeting_id.clone(),
                status: meeting.status().to_string(),
                timestamp: chrono::Utc::now(),
            })
            .await;
    }

    /// Fire-and-forget hand-off to the post-lifecycle task runner.
    pub fn schedule_post_lifecycle(&self, meeting_id: Id) {
        debug!("Scheduling post-lifecycle tasks for meeting {meeting_id}");
        let dispatcher = Arc::clone(&self.post_lifecycle);
        self.tasks.spawn(async move {
            dispatcher.dispatch(meeting_id).await;
        });
    }

    /// Schedules the stop-then-finalize safety net for a meeting's runtime instance.
    pub fn schedule_delayed_stop(&self, meeting_id: Id, handle: String, delay: Duration) {
        info!("Scheduling stop of runtime instance {handle} (meeting {meeting_id}) in {delay:?}");
        let ctx = self.clone();
        self.tasks.spawn(async move {
            crate::stop::delayed_stop(ctx, meeting_id, handle, delay).await;
        });
    }
}
