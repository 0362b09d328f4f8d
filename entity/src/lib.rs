use uuid::Uuid;

pub mod meeting_data;
pub mod meeting_sessions;
pub mod meeting_status;
pub mod meetings;

pub use meeting_status::{CompletionReason, FailureStage, MeetingStatus};

/// A type alias that represents any Entity's internal id field data type.
/// Aliased so that it's easy to change the underlying type if necessary.
pub type Id = Uuid;
