//! Error types for xlio-import
//!
//! Pre-network rejections (extension, size, empty workbook) never reach the
//! gateway or the notification channel. Gateway and task failures end the
//! attempt in a FAILED state. Per-sheet failures are not errors at all; see
//! [`crate::models::SheetImportFailure`].

use thiserror::Error;

use crate::channel::TransportError;
use crate::gateway::GatewayError;
use crate::models::{FailureScope, ImportState};

/// Import subsystem error type
#[derive(Debug, Error)]
pub enum ImportError {
    /// File extension not in the accepted set
    #[error("Unsupported file type '{extension}'; accepted: {accepted}")]
    UnsupportedExtension { extension: String, accepted: String },

    /// File larger than the configured ceiling
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    /// Local validation failure (empty workbook, nothing selected, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Sheet index outside the loaded sheets
    #[error("Sheet index {index} out of range (0..{len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Sheet name not present in the loaded workbook
    #[error("Unknown sheet: {0}")]
    UnknownSheet(String),

    /// Another session is validating or importing
    #[error("An import is already in progress")]
    ImportInProgress,

    /// Operation not allowed in the current state
    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: ImportState,
    },

    /// Validation or import endpoint failed
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Upload accepted but no task id came back
    #[error("The server did not return a task id")]
    NoTaskIdReturned,

    /// Server reported failure for a queued task
    #[error("Import task {task_id} failed: {detail}")]
    TaskFailed {
        task_id: String,
        detail: String,
        /// Some rows were reported processed before the failure
        partial: bool,
    },

    /// Notification channel spent its reconnect budget
    #[error("Notification channel unavailable after repeated reconnect attempts")]
    ChannelExhausted,

    /// Notification channel was closed while a task was running
    #[error("Notification channel closed while task {task_id} was running; outcome unknown")]
    ChannelClosed { task_id: String },

    /// The caller stopped waiting before the attempt finished
    #[error("Import was interrupted before it finished")]
    Interrupted,

    /// Transport failure on the notification channel
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// xlio-common error
    #[error("Common error: {0}")]
    Common(#[from] xlio_common::Error),
}

impl ImportError {
    /// Rejected locally, before any network call
    pub fn is_pre_network(&self) -> bool {
        matches!(
            self,
            ImportError::UnsupportedExtension { .. }
                | ImportError::FileTooLarge { .. }
                | ImportError::Validation(_)
                | ImportError::IndexOutOfRange { .. }
                | ImportError::UnknownSheet(_)
                | ImportError::ImportInProgress
                | ImportError::InvalidState { .. }
        )
    }

    /// How much data may have reached the store when this error ends an
    /// attempt. `task_started` is whether the server accepted any work.
    pub fn failure_scope(&self, task_started: bool) -> FailureScope {
        match self {
            ImportError::TaskFailed { partial: true, .. } => FailureScope::Partial,
            ImportError::Interrupted => FailureScope::Unknown,
            ImportError::ChannelExhausted | ImportError::ChannelClosed { .. } if task_started => {
                FailureScope::Unknown
            }
            _ => FailureScope::Total,
        }
    }

    /// Whether any data may have been committed
    pub fn commits_data(&self, task_started: bool) -> bool {
        self.failure_scope(task_started) != FailureScope::Total
    }
}

/// Result type for import operations
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_network_classification() {
        assert!(ImportError::FileTooLarge { size: 2, limit: 1 }.is_pre_network());
        assert!(ImportError::ImportInProgress.is_pre_network());
        assert!(!ImportError::NoTaskIdReturned.is_pre_network());
        assert!(!ImportError::ChannelExhausted.is_pre_network());
    }

    #[test]
    fn test_failure_scope() {
        let partial = ImportError::TaskFailed {
            task_id: "t".into(),
            detail: "boom".into(),
            partial: true,
        };
        assert_eq!(partial.failure_scope(true), FailureScope::Partial);
        assert!(partial.commits_data(true));

        assert_eq!(
            ImportError::NoTaskIdReturned.failure_scope(false),
            FailureScope::Total
        );
        assert_eq!(
            ImportError::ChannelClosed { task_id: "t".into() }.failure_scope(true),
            FailureScope::Unknown
        );
        assert_eq!(
            ImportError::ChannelExhausted.failure_scope(false),
            FailureScope::Total
        );
        assert_eq!(
            ImportError::Interrupted.failure_scope(false),
            FailureScope::Unknown
        );
    }
}
