//! Fixtures shared by the lifecycle tests: an in-memory SQLite store built from the
//! entities, the in-memory runtime and a real channel bus.

use crate::context::{LifecycleContext, LifecycleSettings};
use crate::tasks::PostLifecycleDispatcher;
use crate::Id;
use async_trait::async_trait;
use bot_runtime::InMemoryRuntime;
use entity::meeting_data::MeetingData;
use entity::{meeting_sessions, meetings, MeetingStatus};
use entity_api::meeting::{self, NewMeeting};
use events::bus::ChannelBus;
use events::EventPublisher;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) async fn test_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    // A second pooled connection would open a second, empty database.
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    db.execute(backend.build(&schema.create_table_from_entity(meetings::Entity)))
        .await
        .unwrap();
    db.execute(backend.build(&schema.create_table_from_entity(meeting_sessions::Entity)))
        .await
        .unwrap();
    db
}

/// Inserts a meeting and forces it into `status`, bypassing the transition engine.
pub(crate) async fn insert_meeting(
    db: &DatabaseConnection,
    user_id: &str,
    status: MeetingStatus,
) -> meetings::Model {
    insert_meeting_for(db, user_id, "google_meet", "abc-defg-hij", status).await
}

pub(crate) async fn insert_meeting_for(
    db: &DatabaseConnection,
    user_id: &str,
    platform: &str,
    native_meeting_id: &str,
    status: MeetingStatus,
) -> meetings::Model {
    let mut created = meeting::create(
        db,
        NewMeeting {
            user_id: user_id.to_string(),
            platform: platform.to_string(),
            native_meeting_id: native_meeting_id.to_string(),
            data: MeetingData::default(),
        },
    )
    .await
    .unwrap();
    if status == MeetingStatus::Requested {
        return created;
    }
    created.status = status.to_string();
    meeting::update(db, created).await.unwrap()
}

pub(crate) async fn reload(db: &DatabaseConnection, meeting_id: Id) -> meetings::Model {
    meeting::find_by_id(db, meeting_id).await.unwrap()
}

/// Records every post-lifecycle dispatch instead of performing it.
#[derive(Default)]
pub(crate) struct CountingDispatcher {
    dispatched: Mutex<Vec<Id>>,
}

impl CountingDispatcher {
    pub(crate) fn count_for(&self, meeting_id: Id) -> usize {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .filter(|id| **id == meeting_id)
            .count()
    }

    pub(crate) fn total(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }
}

#[async_trait]
impl PostLifecycleDispatcher for CountingDispatcher {
    async fn dispatch(&self, meeting_id: Id) {
        self.dispatched.lock().unwrap().push(meeting_id);
    }
}

/// Short timings so background work finishes within a test. The fast stop path is off
/// unless a test turns it on.
pub(crate) fn test_settings() -> LifecycleSettings {
    LifecycleSettings {
        fast_stop_threshold: Duration::ZERO,
        delayed_stop: Duration::from_millis(30),
        failed_exit_stop: Duration::from_millis(10),
        finalize_grace: Duration::from_millis(5),
        reconcile_interval: Duration::from_millis(20),
        reconcile_backoff: Duration::from_millis(10),
        max_concurrent_bots: None,
        callback_base_url: "http://127.0.0.1:8080/bots/internal/callback".to_string(),
        default_bot_name: "Test Bot".to_string(),
    }
}

pub(crate) struct Harness {
    pub ctx: LifecycleContext,
    pub runtime: Arc<InMemoryRuntime>,
    pub bus: Arc<ChannelBus>,
    pub dispatcher: Arc<CountingDispatcher>,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        Self::with_settings(test_settings()).await
    }

    pub(crate) async fn with_settings(settings: LifecycleSettings) -> Self {
        Self::with_runtime(settings, Arc::new(InMemoryRuntime::new())).await
    }

    pub(crate) async fn with_runtime(
        settings: LifecycleSettings,
        runtime: Arc<InMemoryRuntime>,
    ) -> Self {
        let db = Arc::new(test_db().await);
        let bus = Arc::new(ChannelBus::new());
        let dispatcher = Arc::new(CountingDispatcher::default());
        let events = EventPublisher::new().with_handler(bus.clone());
        let ctx = LifecycleContext::new(db, runtime.clone(), events, dispatcher.clone(), settings);

        Self {
            ctx,
            runtime,
            bus,
            dispatcher,
        }
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        self.ctx.db()
    }

    /// A meeting in `status` with a live runtime instance and a registered session.
    pub(crate) async fn running_meeting(&self, status: MeetingStatus) -> (meetings::Model, String) {
        let mut meeting = insert_meeting(self.db(), "user-1", status).await;
        let handle = self.runtime.spawn_unmanaged(
            [
                (
                    bot_runtime::MEETING_ID_LABEL.to_string(),
                    meeting.id.to_string(),
                ),
                (bot_runtime::USER_ID_LABEL.to_string(), "user-1".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        meeting.runtime_instance_id = Some(handle.clone());
        let meeting = meeting::update(self.db(), meeting).await.unwrap();

        let session_uid = format!("session-{}", meeting.id);
        entity_api::meeting_session::create(self.db(), meeting.id, &session_uid)
            .await
            .unwrap();
        (meeting, session_uid)
    }

    pub(crate) async fn settle(&self) {
        self.ctx.tasks.wait_idle().await;
    }
}
