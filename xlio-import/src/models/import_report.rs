//! Import outcomes and per-sheet failures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xlio_common::events::SkippedRow;

/// A sheet whose confirmed import failed. Recorded, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetImportFailure {
    /// Sheet that failed
    pub sheet_name: String,

    /// Human-readable reason
    pub reason: String,

    /// When the failure was observed
    pub occurred_at: DateTime<Utc>,
}

impl SheetImportFailure {
    pub fn new(sheet_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            reason: reason.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Which execution strategy ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// One upload, progress via the notification channel
    Queued,
    /// One confirmed call per sheet, strictly in order
    Sequential,
}

/// Summary of a finished import attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub strategy: StrategyKind,

    /// Server task id (queued strategy only)
    pub task_id: Option<String>,

    /// Sheets attempted
    pub sheets_total: usize,

    /// Sheets whose import call succeeded
    pub sheets_succeeded: Vec<String>,

    /// Sheets whose import call failed
    pub failures: Vec<SheetImportFailure>,

    /// Rows committed, when the server reported it
    pub inserted: u64,

    /// Rows the server skipped
    pub skipped: Vec<SkippedRow>,
}

impl ImportReport {
    pub fn new(strategy: StrategyKind, sheets_total: usize) -> Self {
        Self {
            strategy,
            task_id: None,
            sheets_total,
            sheets_succeeded: Vec::new(),
            failures: Vec::new(),
            inserted: 0,
            skipped: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Sheets processed so far, success or failure
    pub fn completed_sheets(&self) -> usize {
        self.sheets_succeeded.len() + self.failures.len()
    }

    /// Final user-facing message
    pub fn summary_message(&self) -> String {
        let mut message = match self.strategy {
            StrategyKind::Queued => "Import completed".to_string(),
            StrategyKind::Sequential => format!(
                "Imported {} of {} sheet(s)",
                self.sheets_succeeded.len(),
                self.sheets_total
            ),
        };

        if self.inserted > 0 || !self.skipped.is_empty() {
            message.push_str(&format!(
                ": {} row(s) inserted, {} skipped",
                self.inserted,
                self.skipped.len()
            ));
        }

        if self.has_failures() {
            let failed: Vec<String> = self
                .failures
                .iter()
                .map(|f| format!("'{}' ({})", f.sheet_name, f.reason))
                .collect();
            message.push_str(&format!(". Failed sheet(s): {}", failed.join(", ")));
            if !self.sheets_succeeded.is_empty() {
                message.push_str(". Data from the other sheets was committed");
            }
        }

        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_names_failed_sheets() {
        let mut report = ImportReport::new(StrategyKind::Sequential, 3);
        report.sheets_succeeded = vec!["A".into(), "C".into()];
        report.failures.push(SheetImportFailure::new("B", "HTTP 500"));

        let message = report.summary_message();
        assert!(message.starts_with("Imported 2 of 3 sheet(s)"));
        assert!(message.contains("'B' (HTTP 500)"));
        assert!(message.contains("committed"));
        assert_eq!(report.completed_sheets(), 3);
    }

    #[test]
    fn test_queued_summary_counts_rows() {
        let mut report = ImportReport::new(StrategyKind::Queued, 1);
        report.inserted = 12;
        report.skipped.push(SkippedRow {
            row: 4,
            sheet: "Users".into(),
            reason: "Duplicado".into(),
        });
        assert_eq!(
            report.summary_message(),
            "Import completed: 12 row(s) inserted, 1 skipped"
        );
    }
}
