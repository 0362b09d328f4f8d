//! In-process pub/sub keyed by channel name.
//!
//! Delivery is at-most-once: a message published while nobody is subscribed is dropped,
//! and a subscriber that falls more than `capacity` messages behind loses the oldest.

use crate::{DomainEvent, EventHandler, HandlerError};
use async_trait::async_trait;
use dashmap::DashMap;
use log::*;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

pub struct ChannelBus {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to every message published on `channel` from now on.
    ///
    /// Channels left without subscribers are dropped first, so the map stays bounded by
    /// the live subscriptions even when nothing is ever published on them again.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.prune();
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish a raw message. Returns how many subscribers received it.
    pub fn publish(&self, channel: &str, message: String) -> usize {
        let delivered = match self.channels.get(channel) {
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            // Drop channels whose subscribers have all gone away.
            self.channels
                .remove_if(channel, |_, sender| sender.receiver_count() == 0);
        }

        trace!("Published on '{channel}' to {delivered} subscriber(s)");
        delivered
    }

    fn prune(&self) {
        let before = self.channels.len();
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
        let pruned = before.saturating_sub(self.channels.len());
        if pruned > 0 {
            trace!("Pruned {pruned} abandoned channel(s)");
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for ChannelBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for ChannelBus {
    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let body = serde_json::to_string(&event.payload())
            .map_err(|err| HandlerError(format!("failed to serialize event: {err}")))?;
        let channel = event.channel();
        let delivered = self.publish(&channel, body);
        debug!("Published {} on '{channel}' ({delivered} listening)", event_name(event));
        Ok(())
    }
}

fn event_name(event: &DomainEvent) -> &'static str {
    match event {
        DomainEvent::MeetingStatusChanged { .. } => "meeting.status",
        DomainEvent::BotCommand { .. } => "bot.command",
        DomainEvent::MeetingFinalized { .. } => "meeting.finalized",
    }
}
