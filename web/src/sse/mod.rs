//! Server-sent event streams backed by the in-process channel bus.

pub(crate) mod handler;
