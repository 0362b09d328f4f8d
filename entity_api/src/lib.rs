pub use entity::{meeting_sessions, meetings, Id};

pub mod error;
pub mod meeting;
pub mod meeting_session;
