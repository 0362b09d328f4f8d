//! Background work spawned by the lifecycle: delayed stops and post-lifecycle dispatch.

use crate::Id;
use async_trait::async_trait;
use events::{DomainEvent, EventPublisher};
use log::*;
use std::future::Future;
use tokio_util::task::TaskTracker;

/// Tracks fire-and-forget tasks so callers (tests in particular) can wait for them to drain.
#[derive(Clone, Default)]
pub struct TaskScheduler {
    tracker: TaskTracker,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
        }
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Number of tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every spawned task, including tasks spawned by those tasks, has
    /// finished. The scheduler keeps accepting work afterwards.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Hand-off to whatever runs after a meeting ends (webhooks, transcript aggregation).
///
/// Dispatch is attempted on every exit-style report; deduplication is the receiver's
/// concern.
#[async_trait]
pub trait PostLifecycleDispatcher: Send + Sync {
    async fn dispatch(&self, meeting_id: Id);
}

/// Announces finished meetings on the event bus for the external task runner.
pub struct EventDispatcher {
    events: EventPublisher,
}

impl EventDispatcher {
    pub fn new(events: EventPublisher) -> Self {
        Self { events }
    }
}

#[async_trait]
impl PostLifecycleDispatcher for EventDispatcher {
    async fn dispatch(&self, meeting_id: Id) {
        info!("Dispatching post-lifecycle tasks for meeting {meeting_id}");
        self.events
            .publish(DomainEvent::MeetingFinalized { meeting_id })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_idle_waits_for_nested_tasks() {
        let scheduler = TaskScheduler::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = scheduler.clone();
        let inner_done = done.clone();
        scheduler.spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let nested_done = inner_done.clone();
            inner_scheduler.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                nested_done.fetch_add(1, Ordering::SeqCst);
            });
            inner_done.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.wait_idle().await;

        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn the_scheduler_accepts_work_after_waiting() {
        let scheduler = TaskScheduler::new();
        scheduler.wait_idle().await;

        let done = Arc::new(AtomicUsize::new(0));
        let task_done = done.clone();
        scheduler.spawn(async move {
            task_done.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.wait_idle().await;

        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
