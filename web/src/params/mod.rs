//! This module holds typed parameters for various endpoint inputs.
//!
//! By using typed parameters, inputs are validated (by type) and correctly formatted before
//! they reach the lifecycle engine. Payloads that do not deserialize are rejected by axum
//! before a handler runs.

pub(crate) mod bot;
pub(crate) mod callback;
