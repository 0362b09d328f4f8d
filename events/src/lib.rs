//! Event system for the bot manager.
//!
//! This crate lets the lifecycle engine announce what happened without knowing who is
//! listening (the in-process channel bus, SSE streams, post-lifecycle dispatch).
//!
//! # Architecture
//!
//! - **DomainEvent**: every notification or command the lifecycle engine emits
//! - **EventHandler**: trait for anything that reacts to events
//! - **EventPublisher**: fans events out to registered handlers
//! - **ChannelBus**: named pub/sub channels carrying the JSON wire payloads
//!
//! This crate has no dependencies on internal crates (entity, domain, etc.), avoiding
//! circular dependencies. Statuses travel as their string form.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub mod bus;

pub use bus::ChannelBus;

/// A type alias that represents any Entity's internal id field data type.
/// This matches the definition in the entity crate to maintain compatibility.
pub type Id = Uuid;

/// Instructions a running bot listens for on its command channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BotCommand {
    /// Leave the meeting gracefully and report the exit
    Leave,
    /// Switch transcription language and/or task without rejoining
    Reconfigure {
        language: Option<String>,
        task: Option<String>,
    },
}

/// Events emitted by the meeting lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A status transition was applied to a meeting.
    MeetingStatusChanged {
        meeting_id: Id,
        user_id: String,
        platform: String,
        native_meeting_id: String,
        status: String,
        timestamp: DateTime<Utc>,
    },
    /// A command addressed to the bot serving a meeting.
    BotCommand { meeting_id: Id, command: BotCommand },
    /// The meeting reached a terminal status; post-lifecycle work may run.
    MeetingFinalized { meeting_id: Id },
}

impl DomainEvent {
    /// The pub/sub channel this event is addressed to.
    pub fn channel(&self) -> String {
        match self {
            DomainEvent::MeetingStatusChanged { meeting_id, .. } => status_channel(*meeting_id),
            DomainEvent::BotCommand { meeting_id, .. } => command_channel(*meeting_id),
            DomainEvent::MeetingFinalized { .. } => FINALIZED_CHANNEL.to_string(),
        }
    }

    /// JSON body published on [`DomainEvent::channel`].
    pub fn payload(&self) -> Value {
        match self {
            DomainEvent::MeetingStatusChanged {
                meeting_id,
                user_id,
                platform,
                native_meeting_id,
                status,
                timestamp,
            } => json!({
                "type": "meeting.status",
                "meeting": {
                    "id": meeting_id,
                    "user_id": user_id,
                    "platform": platform,
                    "native_id": native_meeting_id,
                },
                "payload": { "status": status },
                "ts": timestamp.to_rfc3339(),
            }),
            DomainEvent::BotCommand {
                meeting_id,
                command,
            } => {
                let mut body = serde_json::to_value(command).unwrap_or_else(|_| json!({}));
                if let Some(object) = body.as_object_mut() {
                    object.insert("meeting_id".to_string(), json!(meeting_id));
                }
                body
            }
            DomainEvent::MeetingFinalized { meeting_id } => json!({
                "type": "meeting.finalized",
                "meeting_id": meeting_id,
            }),
        }
    }

    pub fn meeting_id(&self) -> Id {
        match self {
            DomainEvent::MeetingStatusChanged { meeting_id, .. }
            | DomainEvent::BotCommand { meeting_id, .. }
            | DomainEvent::MeetingFinalized { meeting_id } => *meeting_id,
        }
    }
}

/// Channel carrying status notifications for one meeting.
pub fn status_channel(meeting_id: Id) -> String {
    format!("bm:meeting:{meeting_id}:status")
}

/// Channel the bot serving a meeting listens on for commands.
pub fn command_channel(meeting_id: Id) -> String {
    format!("bot_commands:meeting:{meeting_id}")
}

pub const FINALIZED_CHANNEL: &str = "bm:meetings:finalized";

/// Failure reported by an [`EventHandler`]. Never escalated past the publisher.
#[derive(Debug)]
pub struct HandlerError(pub String);

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event handler error: {}", self.0)
    }
}

impl std::error::Error for HandlerError {}

/// Trait for handling domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// A failing handler is logged and skipped; publishing never fails the caller.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            if let Err(err) = handler.handle(&event).await {
                warn!("Failed to publish to '{}': {err}", event.channel());
            }
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
