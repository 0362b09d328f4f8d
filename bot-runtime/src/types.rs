//! Values passed to and returned from runtime adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Label carrying the meeting a runtime instance serves.
pub const MEETING_ID_LABEL: &str = "bot_manager.meeting_id";

/// Label carrying the owner of a runtime instance.
pub const USER_ID_LABEL: &str = "bot_manager.user_id";

/// Everything a bot needs to join a meeting and report back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinParameters {
    pub meeting_id: Uuid,
    pub user_id: String,
    pub platform: String,
    pub native_meeting_id: String,
    pub meeting_url: Option<String>,
    pub bot_name: String,
    pub language: Option<String>,
    pub task: Option<String>,
    /// Base URL the bot posts lifecycle callbacks to
    pub callback_url: String,
    /// Channel the bot should listen on for leave/reconfigure commands
    pub command_channel: String,
}

impl JoinParameters {
    /// The labels every adapter attaches to the instance it starts.
    pub fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (MEETING_ID_LABEL.to_string(), self.meeting_id.to_string()),
            (USER_ID_LABEL.to_string(), self.user_id.clone()),
        ])
    }
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedInstance {
    /// Opaque handle used for every later stop / liveness call
    pub handle: String,
    /// Connection id the bot will identify itself with in callbacks
    pub session_uid: String,
}

/// An instance the backend reports as running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningInstance {
    pub handle: String,
    pub labels: HashMap<String, String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl RunningInstance {
    pub fn meeting_id(&self) -> Option<&str> {
        self.labels.get(MEETING_ID_LABEL).map(String::as_str)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.labels.get(USER_ID_LABEL).map(String::as_str)
    }
}
