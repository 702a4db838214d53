//! xlio-import library interface
//!
//! Bulk spreadsheet import: validation, sheet selection, queued and
//! sequential import strategies, and the reconnecting progress channel.

pub mod channel;
pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod models;
pub mod orchestrator;
pub mod registry;

pub use crate::channel::{ChannelSignal, ChannelState, ProgressChannel, ReconnectPolicy, Subscription};
pub use crate::config::{ConfigOverrides, ImportConfig};
pub use crate::error::{ImportError, ImportResult};
pub use crate::executor::{select_strategy, ImportStrategy, TaskExecutor, TaskHandle};
pub use crate::gateway::{HttpGateway, ImportGateway};
pub use crate::orchestrator::{ImportEvent, ImportOrchestrator};
pub use crate::registry::SheetRegistry;
