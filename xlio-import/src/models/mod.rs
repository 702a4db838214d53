//! Data models for the import subsystem
//!
//! - Import session state machine
//! - Validated sheet descriptors and the selected file
//! - Import reports and per-sheet failures

pub mod import_report;
pub mod import_session;
pub mod sheet;

pub use crate::registry::SheetRegistry;
pub use import_report::{ImportReport, SheetImportFailure, StrategyKind};
pub use import_session::{FailureScope, ImportSession, ImportState, SessionSnapshot, StateTransition};
pub use sheet::{RowRecord, SelectedFile, SheetDescriptor};
