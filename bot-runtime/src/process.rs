//! Runs each bot as a child process of the bot manager.
//!
//! The join parameters are handed over as JSON in the `BOT_CONFIG` environment variable.
//! The handle is the child's PID.

use crate::adapter::RuntimeAdapter;
use crate::types::{JoinParameters, RunningInstance, StartedInstance};
use crate::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::*;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use uuid::Uuid;

const BOT_CONFIG_ENV: &str = "BOT_CONFIG";
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ProcessRuntimeConfig {
    /// Executable that runs one bot
    pub command: String,
    pub args: Vec<String>,
}

struct ProcessRecord {
    child: Mutex<Child>,
    labels: HashMap<String, String>,
    started_at: DateTime<Utc>,
}

pub struct ProcessRuntime {
    config: ProcessRuntimeConfig,
    processes: DashMap<String, Arc<ProcessRecord>>,
}

impl ProcessRuntime {
    pub fn new(config: ProcessRuntimeConfig) -> Result<Self, Error> {
        if config.command.trim().is_empty() {
            return Err(Error::Configuration(
                "the process runtime needs a bot command".to_string(),
            ));
        }

        Ok(Self {
            config,
            processes: DashMap::new(),
        })
    }

    fn record(&self, handle: &str) -> Option<Arc<ProcessRecord>> {
        self.processes.get(handle).map(|record| record.clone())
    }

    /// Polls the child; reaps and forgets it once it has exited.
    async fn poll(&self, handle: &str, record: &ProcessRecord) -> Result<bool, Error> {
        let exited = record.child.lock().await.try_wait()?;
        match exited {
            None => Ok(true),
            Some(status) => {
                debug!("Bot process {handle} exited with {status}");
                self.processes.remove(handle);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl RuntimeAdapter for ProcessRuntime {
    async fn start(&self, params: JoinParameters) -> Result<StartedInstance, Error> {
        let session_uid = Uuid::new_v4().to_string();

        let mut bot_config = serde_json::to_value(&params)?;
        if let Some(object) = bot_config.as_object_mut() {
            object.insert("connection_id".to_string(), session_uid.clone().into());
        }

        let child = Command::new(&self.config.command)
            .args(&self.config.args)
            .env(BOT_CONFIG_ENV, bot_config.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!("Failed to spawn bot command '{}': {err}", self.config.command);
                Error::Spawn(format!("{}: {err}", self.config.command))
            })?;

        let pid = child
            .id()
            .ok_or_else(|| Error::Spawn("bot process exited before it could be tracked".to_string()))?;
        let handle = pid.to_string();

        self.processes.insert(
            handle.clone(),
            Arc::new(ProcessRecord {
                child: Mutex::new(child),
                labels: params.labels(),
                started_at: Utc::now(),
            }),
        );

        info!(
            "Started bot process {handle} for meeting {} (session {session_uid})",
            params.meeting_id
        );
        Ok(StartedInstance {
            handle,
            session_uid,
        })
    }

    async fn stop(&self, handle: &str) -> Result<(), Error> {
        let Some(record) = self.record(handle) else {
            debug!("Bot process {handle} is not tracked; nothing to stop");
            return Ok(());
        };

        {
            let mut child = record.child.lock().await;
            if child.try_wait()?.is_none() {
                info!("Stopping bot process {handle}");
                child.start_kill()?;
                if tokio::time::timeout(STOP_TIMEOUT, child.wait()).await.is_err() {
                    warn!("Bot process {handle} did not exit within {STOP_TIMEOUT:?}");
                }
            }
        }

        self.processes.remove(handle);
        Ok(())
    }

    async fn is_running(&self, handle: &str) -> Result<bool, Error> {
        match self.record(handle) {
            Some(record) => self.poll(handle, &record).await,
            None => Ok(false),
        }
    }

    async fn list_running(&self, owner: Option<&str>) -> Result<Vec<RunningInstance>, Error> {
        let tracked: Vec<(String, Arc<ProcessRecord>)> = self
            .processes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut running = Vec::new();
        for (handle, record) in tracked {
            if !self.poll(&handle, &record).await? {
                continue;
            }
            let instance = RunningInstance {
                handle,
                labels: record.labels.clone(),
                started_at: Some(record.started_at),
            };
            if owner.map_or(true, |owner| instance.user_id() == Some(owner)) {
                running.push(instance);
            }
        }

        Ok(running)
    }

    fn runtime_id(&self) -> &str {
        "process"
    }
}
