//! # EchoVerse Common Library
//!
//! Shared code for the EchoVerse service and its tests:
//! - Error taxonomy (permission, auth, store, upload, playback)
//! - Configuration loading and root folder resolution
//! - Domain models (echoes, profiles, settings, identities)
//! - Event types and the EventBus used for change notifications
//! - SQLite schema initialization
//! - Time and human-readable duration helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod human_time;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SystemClock};
