//! Queued single-task import
//!
//! Upload the raw file, receive a task id, then follow the task on the
//! notification channel until it completes or fails. The subscription is
//! opened before the upload so events racing the upload response are not
//! lost.

use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use xlio_common::events::ProgressKind;

use super::{ExecutorUpdate, TaskHandle, UpdateSink};
use crate::channel::{ChannelSignal, ProgressChannel};
use crate::error::{ImportError, ImportResult};
use crate::gateway::{ImportGateway, TaskStatus};
use crate::models::{ImportReport, SelectedFile, StrategyKind};

pub struct QueuedTask {
    gateway: Arc<dyn ImportGateway>,
    channel: ProgressChannel,
    file: SelectedFile,
    sheet_name: String,
    watchdog: Duration,
}

impl QueuedTask {
    pub fn new(
        gateway: Arc<dyn ImportGateway>,
        channel: ProgressChannel,
        file: SelectedFile,
        sheet_name: String,
        watchdog: Duration,
    ) -> Self {
        Self {
            gateway,
            channel,
            file,
            sheet_name,
            watchdog,
        }
    }

    pub async fn run(self, updates: &UpdateSink) -> ImportResult<ImportReport> {
        self.channel.connect()?;

        // Until the id is known every event is buffered; foreign ones are skipped below
        let expected: Arc<OnceLock<String>> = Arc::new(OnceLock::new());
        let filter_id = Arc::clone(&expected);
        let mut subscription = self
            .channel
            .subscribe(move |event| filter_id.get().map_or(true, |id| *id == event.task_id));

        let receipt = self.gateway.enqueue_import(&self.file).await?;
        let task_id = receipt
            .task_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ImportError::NoTaskIdReturned)?;
        let _ = expected.set(task_id.clone());

        info!(task_id = %task_id, file = %self.file.name(), "Import task queued");
        let _ = updates.send(ExecutorUpdate::Started(TaskHandle::Queued {
            task_id: task_id.clone(),
        }));

        let mut report = ImportReport::new(StrategyKind::Queued, 1);
        report.task_id = Some(task_id.clone());

        let mut rows_seen = false;
        let mut stalled = false;

        loop {
            let signal = match tokio::time::timeout(self.watchdog, subscription.recv()).await {
                Ok(signal) => signal,
                Err(_) => {
                    if !stalled {
                        stalled = true;
                        warn!(
                            task_id = %task_id,
                            watchdog_secs = self.watchdog.as_secs(),
                            "No response for import task"
                        );
                        let _ = updates.send(ExecutorUpdate::Stalled {
                            task_id: task_id.clone(),
                        });
                    }

                    match self.gateway.task_status(&task_id).await {
                        Ok(TaskStatus::Succeeded { inserted }) => {
                            info!(task_id = %task_id, "Task status probe reports success");
                            report.inserted = inserted.unwrap_or(0);
                            report.sheets_succeeded.push(self.sheet_name.clone());
                            return Ok(report);
                        }
                        Ok(TaskStatus::Failed { detail }) => {
                            return Err(ImportError::TaskFailed {
                                task_id,
                                detail,
                                partial: rows_seen,
                            });
                        }
                        Ok(status) => debug!(task_id = %task_id, ?status, "Task still pending"),
                        Err(e) => warn!(task_id = %task_id, error = %e, "Task status probe failed"),
                    }
                    continue;
                }
            };

            let event = match signal {
                Some(ChannelSignal::Event(event)) => event,
                Some(ChannelSignal::Exhausted) => return Err(ImportError::ChannelExhausted),
                Some(ChannelSignal::Closed) | None => {
                    return Err(ImportError::ChannelClosed { task_id });
                }
            };

            if event.task_id != task_id {
                continue;
            }

            if stalled {
                stalled = false;
                info!(task_id = %task_id, "Import task responding again");
                let _ = updates.send(ExecutorUpdate::Resumed {
                    task_id: task_id.clone(),
                });
            }

            match event.kind {
                ProgressKind::Progress => {
                    rows_seen |= event.current > 0;
                    let message = if event.total > 0 {
                        format!("Importing: {} of {} row(s)", event.current, event.total)
                    } else {
                        "Importing...".to_string()
                    };
                    let _ = updates.send(ExecutorUpdate::Progress {
                        percent: event.percent,
                        message,
                    });
                }
                ProgressKind::Completed => {
                    info!(
                        task_id = %task_id,
                        inserted = event.inserted.unwrap_or(0),
                        skipped = event.skipped.len(),
                        "Import task completed"
                    );
                    report.inserted = event.inserted.unwrap_or(0);
                    report.skipped = event.skipped;
                    report.sheets_succeeded.push(self.sheet_name.clone());
                    return Ok(report);
                }
                ProgressKind::Failed => {
                    let detail = event
                        .error_detail
                        .unwrap_or_else(|| "import task failed".to_string());
                    warn!(task_id = %task_id, detail = %detail, "Import task failed");
                    return Err(ImportError::TaskFailed {
                        task_id,
                        detail,
                        partial: rows_seen || event.current > 0,
                    });
                }
            }
        }
    }
}
