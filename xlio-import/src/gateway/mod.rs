//! REST collaborators consumed by the import core
//!
//! - `POST /validate-excel` (multipart) → workbook structure, nothing committed
//! - `POST /upload-excel` (multipart) → `task_id` of a queued import
//! - `POST /import-validated-data` (`{sheet_name, data}`) → one sheet committed
//! - `GET /task-status/{task_id}` → current state of a queued import
//!
//! Every response uses the `{status, message, data}` envelope.

mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use xlio_common::events::SkippedRow;

use crate::models::{RowRecord, SelectedFile, SheetDescriptor};

/// Gateway errors
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP status or envelope status outside the success range
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// Validation answered, but with nothing the registry can load
    #[error("No usable sheets: {0}")]
    NoUsableSheets(String),

    #[error("Could not read file: {0}")]
    File(String),
}

/// `{status, message, data}` response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Envelope status is absent, a 2xx number, or "success"/"ok"
    pub fn is_success(&self) -> bool {
        match &self.status {
            None | Some(Value::Null) => true,
            Some(Value::Number(n)) => n.as_u64().map_or(false, |s| (200..300).contains(&s)),
            Some(Value::String(s)) => {
                let s = s.to_ascii_lowercase();
                s == "success" || s == "ok" || s.parse::<u16>().map_or(false, |c| (200..300).contains(&c))
            }
            Some(Value::Bool(b)) => *b,
            Some(_) => false,
        }
    }

    /// Numeric envelope status, when there is one
    pub fn status_code(&self) -> Option<u16> {
        match &self.status {
            Some(Value::Number(n)) => n.as_u64().and_then(|s| u16::try_from(s).ok()),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Validation result
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ValidatedWorkbook {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub sheets: Vec<SheetDescriptor>,
}

/// Queue acknowledgement; `task_id` may be missing on a misbehaving server
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct EnqueueReceipt {
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Per-sheet confirmed import result
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SheetImportReceipt {
    #[serde(default)]
    pub inserted: Option<u64>,
    #[serde(default)]
    pub skipped: Vec<SkippedRow>,
}

/// Queued task state as reported by the status endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Pending,
    Running { percent: u8 },
    Succeeded { inserted: Option<u64> },
    Failed { detail: String },
    Other(String),
}

/// REST collaborator for validation and import calls
#[async_trait]
pub trait ImportGateway: Send + Sync {
    /// Validate a workbook without committing anything
    async fn validate(&self, file: &SelectedFile) -> Result<ValidatedWorkbook, GatewayError>;

    /// Queue the whole file for server-side import
    async fn enqueue_import(&self, file: &SelectedFile) -> Result<EnqueueReceipt, GatewayError>;

    /// Commit one validated sheet synchronously
    async fn import_sheet(
        &self,
        sheet_name: &str,
        rows: &[RowRecord],
    ) -> Result<SheetImportReceipt, GatewayError>;

    /// Look up a queued task
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, GatewayError>;
}
