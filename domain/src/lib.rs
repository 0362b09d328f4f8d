//! The bot lifecycle: status transitions, callback ingestion, stops, reconciliation
//! and bot launches.
//!
//! Consumers of the `domain` crate get the entity types re-exported here so that they
//! do not need to depend on `entity_api` directly.

pub use entity::{meeting_data, CompletionReason, FailureStage, MeetingStatus};
pub use entity_api::{meeting_sessions, meetings, Id};

pub mod bot_request;
pub mod callback;
pub mod context;
pub mod error;
pub mod reconciliation;
pub mod stop;
pub mod tasks;
pub mod transition;

pub use context::{LifecycleContext, LifecycleSettings};

#[cfg(test)]
pub(crate) mod test_support;
