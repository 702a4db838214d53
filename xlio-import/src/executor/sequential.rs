//! Sequential confirmed import
//!
//! One confirmed call per sheet. Call N+1 is issued only after call N has
//! answered. A failed sheet is recorded and the loop moves on; there is no
//! automatic retry.

use std::sync::Arc;
use tracing::{info, warn};

use super::{ExecutorUpdate, TaskHandle, UpdateSink};
use crate::error::ImportResult;
use crate::gateway::ImportGateway;
use crate::models::{ImportReport, SheetDescriptor, SheetImportFailure, StrategyKind};

pub struct SequentialConfirmedImport {
    gateway: Arc<dyn ImportGateway>,
    sheets: Vec<SheetDescriptor>,
}

impl SequentialConfirmedImport {
    pub fn new(gateway: Arc<dyn ImportGateway>, sheets: Vec<SheetDescriptor>) -> Self {
        Self { gateway, sheets }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub async fn run(self, updates: &UpdateSink) -> ImportResult<ImportReport> {
        let total = self.sheets.len();
        let mut report = ImportReport::new(StrategyKind::Sequential, total);

        for (index, sheet) in self.sheets.iter().enumerate() {
            let _ = updates.send(ExecutorUpdate::Started(TaskHandle::Sequential {
                index,
                sheet_name: sheet.name.clone(),
            }));

            let failure = match sheet.full_data.as_deref() {
                None => Some("no validated row data for this sheet".to_string()),
                Some(rows) => {
                    info!(sheet = %sheet.name, rows = rows.len(), index, total, "Importing sheet");
                    match self.gateway.import_sheet(&sheet.name, rows).await {
                        Ok(receipt) => {
                            report.inserted += receipt.inserted.unwrap_or(0);
                            report.skipped.extend(receipt.skipped);
                            None
                        }
                        Err(e) => Some(e.to_string()),
                    }
                }
            };

            match &failure {
                None => report.sheets_succeeded.push(sheet.name.clone()),
                Some(reason) => {
                    warn!(sheet = %sheet.name, reason = %reason, "Sheet import failed; continuing");
                    report
                        .failures
                        .push(SheetImportFailure::new(sheet.name.clone(), reason.clone()));
                }
            }

            let completed = index + 1;
            let _ = updates.send(ExecutorUpdate::SheetFinished {
                sheet_name: sheet.name.clone(),
                completed,
                total,
                failure,
            });
            let _ = updates.send(ExecutorUpdate::Progress {
                percent: ((completed * 100) / total.max(1)) as u8,
                message: format!("Imported {} of {} sheet(s)", completed, total),
            });
        }

        info!(
            succeeded = report.sheets_succeeded.len(),
            failed = report.failures.len(),
            total,
            "Sequential import finished"
        );

        Ok(report)
    }
}
