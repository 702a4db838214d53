//! # xlio Common Library
//!
//! Shared code for the xlio spreadsheet import crates:
//! - Error type shared by configuration and wire decoding
//! - Bootstrap TOML configuration (discovery, load, atomic write)
//! - Progress-event wire model for the notification channel
//! - Lifecycle event types and the broadcast EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
