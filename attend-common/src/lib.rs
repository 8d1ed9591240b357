//! # Attend Common Library
//!
//! Shared code for the attendance capture crates including:
//! - Domain types (subject types, intents, session descriptors, logs)
//! - Event types (AttendanceEvent enum) and the EventBus
//! - Configuration loading
//! - Time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod types;

pub use error::{Error, Result};
pub use types::{AttendanceIntent, CampusId, SubjectType};
