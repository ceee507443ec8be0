//! # gitviz Common Library
//!
//! Shared code for the gitviz services:
//! - Error type wrapping database, IO and configuration failures
//! - Bootstrap configuration (TOML) and root folder resolution
//! - Import event bus for SSE broadcasting
//! - Clock abstraction used for pacing and deferred expiry

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
