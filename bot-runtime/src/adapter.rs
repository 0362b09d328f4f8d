//! The contract every bot runtime backend implements.

use crate::types::{JoinParameters, RunningInstance, StartedInstance};
use crate::Error;
use async_trait::async_trait;

/// Abstraction over where bots actually run: containers, scheduler jobs or local
/// processes. The lifecycle engine only ever talks to this trait.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Launch a bot for the meeting described by `params`.
    ///
    /// The returned session uid is handed to the bot, which uses it to identify itself
    /// in every callback.
    async fn start(&self, params: JoinParameters) -> Result<StartedInstance, Error>;

    /// Terminate an instance. Stopping an instance that is already gone succeeds.
    async fn stop(&self, handle: &str) -> Result<(), Error>;

    /// Whether the instance is still running. An `Err` means the backend could not
    /// answer, not that the instance is dead.
    async fn is_running(&self, handle: &str) -> Result<bool, Error>;

    /// Running instances, optionally only those labelled with `owner` as user.
    async fn list_running(&self, owner: Option<&str>) -> Result<Vec<RunningInstance>, Error>;

    /// Unique identifier for this backend (e.g. "process", "memory").
    fn runtime_id(&self) -> &str;
}
