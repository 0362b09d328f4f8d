//! Typed view over the open-ended `meetings.data` JSON column.
//!
//! Known keys are modelled as fields; anything else written by other services is kept
//! in `other` so that a read-modify-write never drops data it does not understand.

use chrono::{DateTime, Utc};
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys of a transition log entry that callers may never supply through metadata.
pub const RESERVED_TRANSITION_KEYS: [&str; 8] = [
    "from",
    "to",
    "timestamp",
    "source",
    "reason",
    "completion_reason",
    "failure_stage",
    "error_details",
];

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize, FromJsonQueryResult)]
pub struct MeetingData {
    /// Append-only audit trail, in the order transitions were applied.
    #[serde(default)]
    pub status_transition: Vec<TransitionLogEntry>,

    /// Set the moment a user stop is accepted.
    #[serde(default)]
    pub stop_requested: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl MeetingData {
    pub fn last_transition(&self) -> Option<&TransitionLogEntry> {
        self.status_transition.last()
    }
}

/// One applied status change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,

    /// Caller-supplied metadata. Never contains a reserved key.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TransitionLogEntry {
    /// Copies `metadata` into `extra`, skipping reserved keys and keys already present.
    pub fn merge_metadata(&mut self, metadata: &Map<String, Value>) {
        for (key, value) in metadata {
            if RESERVED_TRANSITION_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Details of the most recent non-zero bot exit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub exit_code: Option<i32>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_specific_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> TransitionLogEntry {
        TransitionLogEntry {
            from: "active".to_string(),
            to: "completed".to_string(),
            timestamp: Utc::now(),
            source: "bot_callback".to_string(),
            reason: None,
            completion_reason: Some("stopped".to_string()),
            failure_stage: None,
            error_details: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn merge_metadata_never_overwrites_reserved_keys() {
        let mut entry = entry();
        let metadata = json!({
            "to": "failed",
            "source": "forged",
            "exit_code": 0,
        });

        entry.merge_metadata(metadata.as_object().unwrap());

        assert_eq!(entry.to, "completed");
        assert_eq!(entry.source, "bot_callback");
        assert!(!entry.extra.contains_key("to"));
        assert_eq!(entry.extra.get("exit_code"), Some(&json!(0)));
    }

    #[test]
    fn merge_metadata_keeps_existing_extra_values() {
        let mut entry = entry();
        entry
            .extra
            .insert("container_id".to_string(), json!("abc"));

        entry.merge_metadata(json!({"container_id": "xyz"}).as_object().unwrap());

        assert_eq!(entry.extra.get("container_id"), Some(&json!("abc")));
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let raw = json!({
            "stop_requested": true,
            "bot_name": "Notetaker",
            "webhook_delivered": {"status": 200},
        });

        let data: MeetingData = serde_json::from_value(raw).unwrap();
        assert!(data.stop_requested);
        assert!(data.status_transition.is_empty());

        let back = serde_json::to_value(&data).unwrap();
        assert_eq!(back["bot_name"], json!("Notetaker"));
        assert_eq!(back["webhook_delivered"]["status"], json!(200));
    }

    #[test]
    fn empty_object_deserializes_to_default() {
        let data: MeetingData = serde_json::from_value(json!({})).unwrap();
        assert_eq!(data, MeetingData::default());
    }
}
