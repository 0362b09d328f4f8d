use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Lifecycle status of a meeting bot.
///
/// Stored as plain text in the `meetings.status` column rather than as a database
/// enum so that rows written by older deployments (e.g. a legacy `error` value) can
/// still be loaded and normalized instead of failing to decode.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    /// A bot was requested; the runtime instance may not exist yet
    Requested,
    /// The bot is navigating into the meeting
    Joining,
    /// The bot is sitting in the meeting's waiting room
    AwaitingAdmission,
    /// The bot has been admitted and is capturing the meeting
    Active,
    /// A user asked the bot to leave; waiting for it to exit
    Stopping,
    /// Terminal: the bot left the meeting normally
    Completed,
    /// Terminal: the bot could not join or crashed
    Failed,
}

#[derive(Debug, PartialEq, Eq)]
pub struct MeetingStatusParseError(pub String);

impl fmt::Display for MeetingStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown meeting status '{}'", self.0)
    }
}

impl std::error::Error for MeetingStatusParseError {}

impl MeetingStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [MeetingStatus; 7] = [
        MeetingStatus::Requested,
        MeetingStatus::Joining,
        MeetingStatus::AwaitingAdmission,
        MeetingStatus::Active,
        MeetingStatus::Stopping,
        MeetingStatus::Completed,
        MeetingStatus::Failed,
    ];

    /// Statuses from which the meeting can still move.
    pub const NON_TERMINAL: [MeetingStatus; 5] = [
        MeetingStatus::Requested,
        MeetingStatus::Joining,
        MeetingStatus::AwaitingAdmission,
        MeetingStatus::Active,
        MeetingStatus::Stopping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Requested => "requested",
            MeetingStatus::Joining => "joining",
            MeetingStatus::AwaitingAdmission => "awaiting_admission",
            MeetingStatus::Active => "active",
            MeetingStatus::Stopping => "stopping",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Failed => "failed",
        }
    }

    /// COMPLETED and FAILED never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MeetingStatus::Completed | MeetingStatus::Failed)
    }

    /// Statuses a bot reports while it is still making its way into the meeting.
    /// A pending user stop suppresses these.
    pub fn is_positive_progress(&self) -> bool {
        matches!(
            self,
            MeetingStatus::Joining | MeetingStatus::AwaitingAdmission | MeetingStatus::Active
        )
    }

    /// Statuses that precede admission to the meeting.
    pub fn is_pre_active(&self) -> bool {
        matches!(
            self,
            MeetingStatus::Requested | MeetingStatus::Joining | MeetingStatus::AwaitingAdmission
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph. Self-transitions on
    /// non-terminal statuses are allowed; terminal statuses have no outgoing edges.
    pub fn can_transition_to(&self, next: MeetingStatus) -> bool {
        use MeetingStatus::*;

        if *self == next {
            return !self.is_terminal();
        }

        match self {
            Requested => matches!(
                next,
                Joining | AwaitingAdmission | Active | Failed | Completed | Stopping
            ),
            Joining => matches!(
                next,
                AwaitingAdmission | Active | Failed | Completed | Stopping
            ),
            AwaitingAdmission => matches!(next, Active | Failed | Completed | Stopping),
            Active => matches!(next, Failed | Completed | Stopping),
            Stopping => matches!(next, Completed | Failed),
            Completed | Failed => false,
        }
    }

    /// Parses a stored status, mapping anything unrecognized to `Failed`.
    /// Returns the status and whether normalization took place.
    pub fn parse_or_failed(value: &str) -> (MeetingStatus, bool) {
        match value.parse::<MeetingStatus>() {
            Ok(status) => (status, false),
            Err(_) => (MeetingStatus::Failed, true),
        }
    }
}

impl FromStr for MeetingStatus {
    type Err = MeetingStatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "requested" => Ok(MeetingStatus::Requested),
            "joining" => Ok(MeetingStatus::Joining),
            "awaiting_admission" => Ok(MeetingStatus::AwaitingAdmission),
            "active" => Ok(MeetingStatus::Active),
            "stopping" => Ok(MeetingStatus::Stopping),
            "completed" => Ok(MeetingStatus::Completed),
            "failed" => Ok(MeetingStatus::Failed),
            _ => Err(MeetingStatusParseError(value.to_string())),
        }
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}

/// Why a meeting reached COMPLETED.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    Stopped,
    ValidationError,
    AwaitingAdmissionTimeout,
    AwaitingAdmissionRejected,
    LeftAlone,
    Evicted,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionReason::Stopped => write!(fmt, "stopped"),
            CompletionReason::ValidationError => write!(fmt, "validation_error"),
            CompletionReason::AwaitingAdmissionTimeout => write!(fmt, "awaiting_admission_timeout"),
            CompletionReason::AwaitingAdmissionRejected => {
                write!(fmt, "awaiting_admission_rejected")
            }
            CompletionReason::LeftAlone => write!(fmt, "left_alone"),
            CompletionReason::Evicted => write!(fmt, "evicted"),
        }
    }
}

/// The lifecycle stage a meeting was in when it FAILED.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Requested,
    Joining,
    AwaitingAdmission,
    Active,
}

impl FailureStage {
    /// Best-effort stage for a meeting that fails while in `status`.
    pub fn from_status(status: MeetingStatus) -> Self {
        match status {
            MeetingStatus::Requested => FailureStage::Requested,
            MeetingStatus::Joining => FailureStage::Joining,
            MeetingStatus::AwaitingAdmission => FailureStage::AwaitingAdmission,
            _ => FailureStage::Active,
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Requested => write!(fmt, "requested"),
            FailureStage::Joining => write!(fmt, "joining"),
            FailureStage::AwaitingAdmission => write!(fmt, "awaiting_admission"),
            FailureStage::Active => write!(fmt, "active"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in MeetingStatus::ALL {
            assert_eq!(status.as_str().parse::<MeetingStatus>(), Ok(status));
        }
    }

    #[test]
    fn parse_or_failed_normalizes_legacy_values() {
        assert_eq!(
            MeetingStatus::parse_or_failed("error"),
            (MeetingStatus::Failed, true)
        );
        assert_eq!(
            MeetingStatus::parse_or_failed("ACTIVE"),
            (MeetingStatus::Active, false)
        );
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        let terminal: Vec<_> = MeetingStatus::ALL
            .into_iter()
            .filter(MeetingStatus::is_terminal)
            .collect();
        assert_eq!(
            terminal,
            vec![MeetingStatus::Completed, MeetingStatus::Failed]
        );
        assert!(MeetingStatus::NON_TERMINAL.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn late_progress_callbacks_cannot_regress_status() {
        assert!(!MeetingStatus::Active.can_transition_to(MeetingStatus::AwaitingAdmission));
        assert!(!MeetingStatus::Active.can_transition_to(MeetingStatus::Joining));
        assert!(!MeetingStatus::Stopping.can_transition_to(MeetingStatus::Active));
        assert!(MeetingStatus::Requested.can_transition_to(MeetingStatus::Active));
        assert!(MeetingStatus::Stopping.can_transition_to(MeetingStatus::Completed));
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for next in MeetingStatus::ALL {
            assert!(!MeetingStatus::Completed.can_transition_to(next));
            assert!(!MeetingStatus::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn non_terminal_self_transitions_are_allowed() {
        for status in MeetingStatus::NON_TERMINAL {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&MeetingStatus::AwaitingAdmission).unwrap();
        assert_eq!(json, "\"awaiting_admission\"");
        let reason = serde_json::to_string(&CompletionReason::LeftAlone).unwrap();
        assert_eq!(reason, "\"left_alone\"");
    }
}
