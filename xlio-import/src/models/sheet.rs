//! Validated workbook structure and the file handed to the import pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One row of a sheet, keyed by column name
pub type RowRecord = serde_json::Map<String, serde_json::Value>;

/// Structural description of one sheet, as produced by validation
///
/// Immutable once produced; exclusion is session state, not a field here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetDescriptor {
    /// Sheet name, unique within a workbook
    #[serde(rename = "sheet_name")]
    pub name: String,

    #[serde(rename = "total_rows", default)]
    pub total_rows: u64,

    #[serde(default)]
    pub columns: Vec<String>,

    /// First rows, for display
    #[serde(default)]
    pub preview: Vec<RowRecord>,

    /// Full row data, present when validation returned it
    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub full_data: Option<Vec<RowRecord>>,
}

impl SheetDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            total_rows: 0,
            columns,
            preview: Vec::new(),
            full_data: None,
        }
    }

    /// Attach full row data; preview and row count follow from it.
    pub fn with_rows(mut self, rows: Vec<RowRecord>, preview_len: usize) -> Self {
        self.total_rows = rows.len() as u64;
        self.preview = rows.iter().take(preview_len).cloned().collect();
        self.full_data = Some(rows);
        self
    }
}

#[derive(Debug, Clone)]
enum FileSource {
    Path(PathBuf),
    Memory(Arc<Vec<u8>>),
}

/// A spreadsheet file chosen by the user
///
/// Only metadata is read on selection; contents are loaded when a request
/// body is built.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    name: String,
    size_bytes: u64,
    source: FileSource,
}

impl SelectedFile {
    /// Reference a file on disk (reads metadata only)
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            size_bytes: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Wrap an in-memory file
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size_bytes: bytes.len() as u64,
            source: FileSource::Memory(Arc::new(bytes)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Lowercased extension without the dot
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    /// Load the file contents for upload
    pub async fn read_contents(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Path(path) => tokio::fs::read(path).await,
            FileSource::Memory(bytes) => Ok(bytes.as_ref().clone()),
        }
    }
}
