//! Runtime adapter layer: where meeting bots actually run.
//!
//! The lifecycle engine needs exactly four things from a backend: start a bot, stop it,
//! ask whether it is still running, and list what is running. [`RuntimeAdapter`]
//! captures that contract so container engines, job schedulers and local processes are
//! interchangeable.

pub mod adapter;
pub mod error;
pub mod memory;
pub mod process;
pub mod types;

// Re-export commonly used types
pub use adapter::RuntimeAdapter;
pub use error::Error;
pub use memory::{HandleStyle, InMemoryRuntime};
pub use process::{ProcessRuntime, ProcessRuntimeConfig};
pub use types::{
    JoinParameters, RunningInstance, StartedInstance, MEETING_ID_LABEL, USER_ID_LABEL,
};
