//! In-process runtime that only keeps a registry of "running" bots.
//!
//! Used for local demos and for exercising the lifecycle engine without a real backend.
//! The extra knobs (`kill`, `set_available`, `fail_next_start`) simulate the failure
//! modes reconciliation has to cope with.

use crate::adapter::RuntimeAdapter;
use crate::types::{JoinParameters, RunningInstance, StartedInstance};
use crate::Error;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use log::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

/// How the in-memory runtime names its instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStyle {
    /// `memory-bot-1`, `memory-bot-2`, ... (like container names)
    Named,
    /// `1`, `2`, ... (like PIDs or container ids)
    Numeric,
}

pub struct InMemoryRuntime {
    running: DashMap<String, RunningInstance>,
    stop_calls: DashMap<String, usize>,
    started: DashMap<String, JoinParameters>,
    next_id: AtomicU64,
    available: AtomicBool,
    fail_next_start: AtomicBool,
    handle_style: HandleStyle,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::with_handle_style(HandleStyle::Named)
    }

    pub fn with_handle_style(handle_style: HandleStyle) -> Self {
        Self {
            running: DashMap::new(),
            stop_calls: DashMap::new(),
            started: DashMap::new(),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
            fail_next_start: AtomicBool::new(false),
            handle_style,
        }
    }

    fn next_handle(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        match self.handle_style {
            HandleStyle::Named => format!("memory-bot-{n}"),
            HandleStyle::Numeric => n.to_string(),
        }
    }

    fn ensure_available(&self) -> Result<(), Error> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Unavailable("in-memory runtime switched off".to_string()))
        }
    }

    /// Makes the instance disappear without anyone calling `stop`, like a crash.
    pub fn kill(&self, handle: &str) -> bool {
        self.running.remove(handle).is_some()
    }

    /// Registers a running instance that was not started through `start`.
    pub fn spawn_unmanaged(&self, labels: HashMap<String, String>) -> String {
        let handle = self.next_handle();
        self.running.insert(
            handle.clone(),
            RunningInstance {
                handle: handle.clone(),
                labels,
                started_at: Some(Utc::now()),
            },
        );
        handle
    }

    /// While unavailable, every liveness and listing call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    pub fn is_alive(&self, handle: &str) -> bool {
        self.running.contains_key(handle)
    }

    /// How many times `stop` was called for `handle`.
    pub fn stop_count(&self, handle: &str) -> usize {
        self.stop_calls.get(handle).map(|count| *count).unwrap_or(0)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Join parameters `handle` was started with.
    pub fn join_parameters(&self, handle: &str) -> Option<JoinParameters> {
        self.started.get(handle).map(|params| params.clone())
    }
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeAdapter for InMemoryRuntime {
    async fn start(&self, params: JoinParameters) -> Result<StartedInstance, Error> {
        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(Error::Spawn("simulated start failure".to_string()));
        }
        self.ensure_available()?;

        let handle = self.next_handle();
        let session_uid = Uuid::new_v4().to_string();

        self.running.insert(
            handle.clone(),
            RunningInstance {
                handle: handle.clone(),
                labels: params.labels(),
                started_at: Some(Utc::now()),
            },
        );
        self.started.insert(handle.clone(), params);

        debug!("Started in-memory bot {handle} (session {session_uid})");
        Ok(StartedInstance {
            handle,
            session_uid,
        })
    }

    async fn stop(&self, handle: &str) -> Result<(), Error> {
        *self.stop_calls.entry(handle.to_string()).or_insert(0) += 1;

        if self.running.remove(handle).is_some() {
            debug!("Stopped in-memory bot {handle}");
        } else {
            debug!("In-memory bot {handle} already stopped");
        }
        Ok(())
    }

    async fn is_running(&self, handle: &str) -> Result<bool, Error> {
        self.ensure_available()?;
        Ok(self.running.contains_key(handle))
    }

    async fn list_running(&self, owner: Option<&str>) -> Result<Vec<RunningInstance>, Error> {
        self.ensure_available()?;
        Ok(self
            .running
            .iter()
            .filter(|entry| owner.map_or(true, |owner| entry.user_id() == Some(owner)))
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn runtime_id(&self) -> &str {
        "memory"
    }
}
