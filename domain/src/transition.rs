//! The status transition engine: the only writer of `meetings.status`.
//!
//! Every status change, whatever its origin (bot callbacks, user stops, the delayed-stop
//! finalizer, reconciliation, bot requests), goes through [`apply_transition`]. It loads
//! the meeting under a row lock, validates the edge against
//! [`MeetingStatus::can_transition_to`], enriches the record and appends to the
//! transition log, all in one transaction. Two racing finalizations therefore serialize:
//! the first applies, the second sees a terminal status and is rejected without
//! touching any field.

use crate::error::Error;
use crate::Id;
use entity::meeting_data::{LastError, TransitionLogEntry};
use entity::meetings::Model;
use entity::{CompletionReason, FailureStage, MeetingStatus};
use entity_api::meeting;
use log::*;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Which subsystem drove a transition. Recorded in the transition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionSource {
    BotCallback,
    User,
    System,
    Reconciliation,
    DelayedStopFinalizer,
}

impl TransitionSource {
    /// Best guess at the origin of a transition from its endpoints alone.
    pub fn derive(from: MeetingStatus, to: MeetingStatus) -> Self {
        match (from, to) {
            (_, MeetingStatus::Stopping) => TransitionSource::User,
            (MeetingStatus::Requested, MeetingStatus::Completed) => TransitionSource::User,
            (MeetingStatus::Requested, MeetingStatus::Failed) => TransitionSource::System,
            _ => TransitionSource::BotCallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionSource::BotCallback => "bot_callback",
            TransitionSource::User => "user",
            TransitionSource::System => "system",
            TransitionSource::Reconciliation => "reconciliation",
            TransitionSource::DelayedStopFinalizer => "delayed_stop_finalizer",
        }
    }
}

impl fmt::Display for TransitionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A requested status change plus the enrichment that goes with it.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub target: MeetingStatus,
    pub completion_reason: Option<CompletionReason>,
    pub failure_stage: Option<FailureStage>,
    pub error_details: Option<Value>,
    pub reason: Option<String>,
    pub metadata: Map<String, Value>,
    pub source: Option<TransitionSource>,
    pub runtime_instance_id: Option<String>,
    pub mark_stop_requested: bool,
    pub respect_stop_request: bool,
    pub last_error: Option<LastError>,
}

impl TransitionRequest {
    pub fn new(target: MeetingStatus) -> Self {
        Self {
            target,
            completion_reason: None,
            failure_stage: None,
            error_details: None,
            reason: None,
            metadata: Map::new(),
            source: None,
            runtime_instance_id: None,
            mark_stop_requested: false,
            respect_stop_request: false,
            last_error: None,
        }
    }

    pub fn completed(reason: CompletionReason) -> Self {
        Self::new(MeetingStatus::Completed).completion_reason(reason)
    }

    pub fn failed(stage: FailureStage) -> Self {
        Self::new(MeetingStatus::Failed).failure_stage(stage)
    }

    pub fn completion_reason(mut self, reason: CompletionReason) -> Self {
        self.completion_reason = Some(reason);
        self
    }

    pub fn failure_stage(mut self, stage: FailureStage) -> Self {
        self.failure_stage = Some(stage);
        self
    }

    pub fn error_details(mut self, details: impl Into<Value>) -> Self {
        self.error_details = Some(details.into());
        self
    }

    /// Free-text reason recorded in the transition log.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn source(mut self, source: TransitionSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Also record the runtime instance handle, even on a same-status write.
    pub fn runtime_instance_id(mut self, handle: impl Into<String>) -> Self {
        self.runtime_instance_id = Some(handle.into());
        self
    }

    /// Set `stop_requested` in the same write as the transition.
    pub fn mark_stop_requested(mut self) -> Self {
        self.mark_stop_requested = true;
        self
    }

    /// Drop the request if a user stop is pending and the target is positive progress.
    pub fn respect_stop_request(mut self) -> Self {
        self.respect_stop_request = true;
        self
    }

    pub fn last_error(mut self, last_error: LastError) -> Self {
        self.last_error = Some(last_error);
        self
    }
}

/// What [`apply_transition`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The status changed from `from` to the requested one.
    Applied { meeting: Model, from: MeetingStatus },
    /// Same-status write on a non-terminal meeting; only the runtime handle and
    /// stop flag may have been refreshed.
    Unchanged(Model),
    /// Not an edge of the lifecycle graph; nothing was written.
    Rejected {
        meeting: Model,
        requested: MeetingStatus,
    },
    /// A user stop is pending and the request was late startup progress.
    Suppressed(Model),
}

impl TransitionOutcome {
    pub fn meeting(&self) -> &Model {
        match self {
            TransitionOutcome::Applied { meeting, .. }
            | TransitionOutcome::Unchanged(meeting)
            | TransitionOutcome::Rejected { meeting, .. }
            | TransitionOutcome::Suppressed(meeting) => meeting,
        }
    }

    pub fn into_meeting(self) -> Model {
        match self {
            TransitionOutcome::Applied { meeting, .. }
            | TransitionOutcome::Unchanged(meeting)
            | TransitionOutcome::Rejected { meeting, .. }
            | TransitionOutcome::Suppressed(meeting) => meeting,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }

    /// Applied or a permitted same-status write.
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            TransitionOutcome::Applied { .. } | TransitionOutcome::Unchanged(_)
        )
    }
}

/// Validates and applies one status change atomically.
///
/// Illegal transitions are an expected result of duplicate and out-of-order reports and
/// come back as [`TransitionOutcome::Rejected`]; `Err` is reserved for store failures,
/// in which case nothing was written.
pub async fn apply_transition(
    db: &DatabaseConnection,
    meeting_id: Id,
    request: TransitionRequest,
) -> Result<TransitionOutcome, Error> {
    let txn = db.begin().await?;
    let mut meeting = meeting::find_by_id_for_update(&txn, meeting_id).await?;

    let (current, normalized) = MeetingStatus::parse_or_failed(&meeting.status);
    if normalized {
        warn!(
            "Meeting {meeting_id} has unknown status '{}', normalizing to '{}'",
            meeting.status, current
        );
        meeting.status = current.to_string();
        meeting = meeting::update(&txn, meeting).await?;
    }

    let target = request.target;

    if request.respect_stop_request && meeting.data.stop_requested && target.is_positive_progress()
    {
        txn.commit().await?;
        info!("Meeting {meeting_id} has a pending stop; ignoring '{target}' report");
        return Ok(TransitionOutcome::Suppressed(meeting));
    }

    if !current.can_transition_to(target) {
        txn.commit().await?;
        warn!("Rejected transition for meeting {meeting_id}: '{current}' -> '{target}'");
        return Ok(TransitionOutcome::Rejected {
            meeting,
            requested: target,
        });
    }

    if current == target {
        let mut changed = false;
        if let Some(handle) = request.runtime_instance_id {
            if meeting.runtime_instance_id.as_deref() != Some(handle.as_str()) {
                meeting.runtime_instance_id = Some(handle);
                changed = true;
            }
        }
        if request.mark_stop_requested && !meeting.data.stop_requested {
            meeting.data.stop_requested = true;
            changed = true;
        }
        if changed {
            meeting = meeting::update(&txn, meeting).await?;
        }
        txn.commit().await?;
        debug!("Meeting {meeting_id} already '{current}'; refreshed runtime details");
        return Ok(TransitionOutcome::Unchanged(meeting));
    }

    let now = chrono::Utc::now();
    let source = request
        .source
        .unwrap_or_else(|| TransitionSource::derive(current, target));

    meeting.status = target.to_string();

    if let Some(handle) = request.runtime_instance_id {
        meeting.runtime_instance_id = Some(handle);
    }
    if target == MeetingStatus::Active && meeting.start_time.is_none() {
        meeting.start_time = Some(now.into());
    }
    if target.is_terminal() {
        meeting.end_time = Some(now.into());
        if let Some(reason) = request.completion_reason {
            meeting.data.completion_reason = Some(reason.to_string());
        }
        if let Some(stage) = request.failure_stage {
            meeting.data.failure_stage = Some(stage.to_string());
        }
        if let Some(details) = &request.error_details {
            meeting.data.error_details = Some(details.clone());
        }
    }
    if request.mark_stop_requested {
        meeting.data.stop_requested = true;
    }
    if let Some(last_error) = request.last_error {
        meeting.data.last_error = Some(last_error);
    }

    let mut entry = TransitionLogEntry {
        from: current.to_string(),
        to: target.to_string(),
        timestamp: now,
        source: source.to_string(),
        reason: request.reason,
        completion_reason: request.completion_reason.map(|r| r.to_string()),
        failure_stage: request.failure_stage.map(|s| s.to_string()),
        error_details: request.error_details,
        extra: Map::new(),
    };
    entry.merge_metadata(&request.metadata);
    meeting.data.status_transition.push(entry);

    let meeting = meeting::update(&txn, meeting).await?;
    txn.commit().await?;

    info!("Meeting {meeting_id}: '{current}' -> '{target}' (source: {source})");
    Ok(TransitionOutcome::Applied {
        meeting,
        from: current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use serde_json::json;

    #[tokio::test]
    async fn applies_legal_transition_and_logs_it() {
        let db = test_db().await;
        let meeting = insert_meeting(&db, "user-1", MeetingStatus::Requested).await;

        let outcome = apply_transition(
            &db,
            meeting.id,
            TransitionRequest::new(MeetingStatus::Joining).reason("bot navigating"),
        )
        .await
        .unwrap();

        assert!(outcome.is_applied());
        let stored = reload(&db, meeting.id).await;
        assert_eq!(stored.status(), MeetingStatus::Joining);
        let entry = stored.data.last_transition().unwrap();
        assert_eq!(entry.from, "requested");
        assert_eq!(entry.to, "joining");
        assert_eq!(entry.source, "bot_callback");
        assert_eq!(entry.reason.as_deref(), Some("bot navigating"));
    }

    #[tokio::test]
    async fn rejects_regressions_without_touching_the_record() {
        let db = test_db().await;
        let meeting = insert_meeting(&db, "user-1", MeetingStatus::Active).await;

        let outcome = apply_transition(
            &db,
            meeting.id,
            TransitionRequest::new(MeetingStatus::AwaitingAdmission),
        )
        .await
        .unwrap();

        assert!(matches!(
            outcome,
            TransitionOutcome::Rejected {
                requested: MeetingStatus::AwaitingAdmission,
                ..
            }
        ));
        let stored = reload(&db, meeting.id).await;
        assert_eq!(stored.status(), MeetingStatus::Active);
        assert!(stored.data.status_transition.is_empty());
        assert_eq!(stored.updated_at, meeting.updated_at);
    }

    #[tokio::test]
    async fn terminal_transition_stamps_end_time_and_enrichment() {
        let db = test_db().await;
        let meeting = insert_meeting(&db, "user-1", MeetingStatus::Active).await;

        apply_transition(
            &db,
            meeting.id,
            TransitionRequest::failed(FailureStage::Active)
                .error_details("Bot exited with code 1")
                .metadata("exit_code", 1),
        )
        .await
        .unwrap();

        let stored = reload(&db, meeting.id).await;
        assert_eq!(stored.status(), MeetingStatus::Failed);
        assert!(stored.end_time.is_some());
        assert_eq!(stored.data.failure_stage.as_deref(), Some("active"));
        assert_eq!(
            stored.data.error_details,
            Some(json!("Bot exited with code 1"))
        );
        let entry = stored.data.last_transition().unwrap();
        assert_eq!(entry.extra.get("exit_code"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn repeated_finalization_is_a_no_op() {
        let db = test_db().await;
        let meeting = insert_meeting(&db, "user-1", MeetingStatus::Active).await;

        let first = apply_transition(
            &db,
            meeting.id,
            TransitionRequest::completed(CompletionReason::Stopped),
        )
        .await
        .unwrap();
        let end_time = first.meeting().end_time;

        let second = apply_transition(
            &db,
            meeting.id,
            TransitionRequest::failed(FailureStage::Active),
        )
        .await
        .unwrap();

        assert!(first.is_applied());
        assert!(matches!(second, TransitionOutcome::Rejected { .. }));
        let stored = reload(&db, meeting.id).await;
        assert_eq!(stored.status(), MeetingStatus::Completed);
        assert_eq!(stored.end_time, end_time);
        assert_eq!(stored.data.status_transition.len(), 1);
    }

    #[tokio::test]
    async fn racing_finalizations_apply_exactly_once() {
        // The test store has one SQLite connection, so these transactions queue up whole
        // and this only checks that later finalizers see the first one's write. The
        // Postgres row lock is asserted in `transition_locks_the_row_inside_its_transaction`.
        let db = std::sync::Arc::new(test_db().await);
        let meeting = insert_meeting(&db, "user-1", MeetingStatus::Stopping).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                apply_transition(
                    &db,
                    meeting.id,
                    TransitionRequest::completed(CompletionReason::Stopped),
                )
                .await
                .unwrap()
                .is_applied()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(reload(&db, meeting.id).await.data.status_transition.len(), 1);
    }

    #[tokio::test]
    async fn unknown_stored_status_is_normalized_to_failed_first() {
        let db = test_db().await;
        let mut meeting = insert_meeting(&db, "user-1", MeetingStatus::Active).await;
        meeting.status = "error".to_string();
        let meeting = meeting::update(&db, meeting).await.unwrap();

        let outcome = apply_transition(
            &db,
            meeting.id,
            TransitionRequest::completed(CompletionReason::Stopped),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, TransitionOutcome::Rejected { .. }));
        let stored = reload(&db, meeting.id).await;
        assert_eq!(stored.status, "failed");
    }

    #[tokio::test]
    async fn pending_stop_suppresses_positive_progress_only() {
        let db = test_db().await;
        let mut meeting = insert_meeting(&db, "user-1", MeetingStatus::Joining).await;
        meeting.data.stop_requested = true;
        let meeting = meeting::update(&db, meeting).await.unwrap();

        let late = apply_transition(
            &db,
            meeting.id,
            TransitionRequest::new(MeetingStatus::Active).respect_stop_request(),
        )
        .await
        .unwrap();
        assert!(matches!(late, TransitionOutcome::Suppressed(_)));

        let exit = apply_transition(
            &db,
            meeting.id,
            TransitionRequest::completed(CompletionReason::Stopped).respect_stop_request(),
        )
        .await
        .unwrap();
        assert!(exit.is_applied());
    }

    #[tokio::test]
    async fn same_status_write_refreshes_runtime_handle() {
        let db = test_db().await;
        let meeting = insert_meeting(&db, "user-1", MeetingStatus::Active).await;

        let outcome = apply_transition(
            &db,
            meeting.id,
            TransitionRequest::new(MeetingStatus::Active).runtime_instance_id("restarted-bot"),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, TransitionOutcome::Unchanged(_)));
        let stored = reload(&db, meeting.id).await;
        assert_eq!(stored.runtime_instance_id.as_deref(), Some("restarted-bot"));
        assert!(stored.data.status_transition.is_empty());
    }

    #[tokio::test]
    async fn first_activation_sets_start_time_once() {
        let db = test_db().await;
        let meeting = insert_meeting(&db, "user-1", MeetingStatus::AwaitingAdmission).await;

        apply_transition(&db, meeting.id, TransitionRequest::new(MeetingStatus::Active))
            .await
            .unwrap();
        let started = reload(&db, meeting.id).await.start_time;
        assert!(started.is_some());

        apply_transition(&db, meeting.id, TransitionRequest::new(MeetingStatus::Active))
            .await
            .unwrap();
        assert_eq!(reload(&db, meeting.id).await.start_time, started);
    }

    #[tokio::test]
    async fn caller_metadata_cannot_forge_reserved_keys() {
        let db = test_db().await;
        let meeting = insert_meeting(&db, "user-1", MeetingStatus::Active).await;

        apply_transition(
            &db,
            meeting.id,
            TransitionRequest::new(MeetingStatus::Stopping)
                .metadata("source", "forged")
                .metadata("requested_by", "user-1"),
        )
        .await
        .unwrap();

        let stored = reload(&db, meeting.id).await;
        let entry = stored.data.last_transition().unwrap();
        assert_eq!(entry.source, "user");
        assert_eq!(entry.extra.get("requested_by"), Some(&json!("user-1")));
        assert!(!entry.extra.contains_key("source"));
    }

    #[test]
    fn source_is_derived_from_the_transition_endpoints() {
        use MeetingStatus::*;
        assert_eq!(TransitionSource::derive(Active, Stopping), TransitionSource::User);
        assert_eq!(TransitionSource::derive(Requested, Completed), TransitionSource::User);
        assert_eq!(TransitionSource::derive(Requested, Failed), TransitionSource::System);
        assert_eq!(
            TransitionSource::derive(Joining, AwaitingAdmission),
            TransitionSource::BotCallback
        );
    }
}
