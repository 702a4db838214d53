//! Scripted in-memory ImportGateway
//!
//! Records every call with start/finish ticks from a shared counter so tests
//! can assert ordering and the absence of network traffic.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use xlio_import::gateway::{
    EnqueueReceipt, GatewayError, ImportGateway, SheetImportReceipt, TaskStatus,
    ValidatedWorkbook,
};
use xlio_import::models::{RowRecord, SelectedFile, SheetDescriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Validate { file: String },
    Enqueue { file: String },
    ImportSheet { sheet: String, rows: usize },
    TaskStatus { task_id: String },
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call: GatewayCall,
    pub started: u64,
    pub finished: Option<u64>,
}

type EnqueueHook = Box<dyn Fn(&str) + Send + Sync>;

pub struct FakeGateway {
    validation: Mutex<Result<ValidatedWorkbook, GatewayError>>,
    enqueue: Mutex<Result<EnqueueReceipt, GatewayError>>,
    sheet_failures: Mutex<HashMap<String, GatewayError>>,
    sheet_receipts: Mutex<HashMap<String, SheetImportReceipt>>,
    statuses: Mutex<VecDeque<TaskStatus>>,
    on_enqueue: Mutex<Option<EnqueueHook>>,
    call_delay: Mutex<Duration>,
    calls: Mutex<Vec<CallRecord>>,
    clock: AtomicU64,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            validation: Mutex::new(Err(GatewayError::Network(
                "no validation scripted".to_string(),
            ))),
            enqueue: Mutex::new(Ok(EnqueueReceipt {
                task_id: Some("task-1".to_string()),
            })),
            sheet_failures: Mutex::new(HashMap::new()),
            sheet_receipts: Mutex::new(HashMap::new()),
            statuses: Mutex::new(VecDeque::new()),
            on_enqueue: Mutex::new(None),
            call_delay: Mutex::new(Duration::from_millis(10)),
            calls: Mutex::new(Vec::new()),
            clock: AtomicU64::new(0),
        }
    }

    /// Validation returns these sheets
    pub fn with_sheets(self, filename: &str, sheets: Vec<SheetDescriptor>) -> Self {
        *self.validation.lock().unwrap() = Ok(ValidatedWorkbook {
            filename: filename.to_string(),
            sheets,
        });
        self
    }

    pub fn with_validation_error(self, error: GatewayError) -> Self {
        *self.validation.lock().unwrap() = Err(error);
        self
    }

    pub fn with_task_id(self, task_id: Option<&str>) -> Self {
        *self.enqueue.lock().unwrap() = Ok(EnqueueReceipt {
            task_id: task_id.map(str::to_string),
        });
        self
    }

    pub fn with_sheet_failure(self, sheet: &str, error: GatewayError) -> Self {
        self.sheet_failures
            .lock()
            .unwrap()
            .insert(sheet.to_string(), error);
        self
    }

    pub fn with_sheet_receipt(self, sheet: &str, receipt: SheetImportReceipt) -> Self {
        self.sheet_receipts
            .lock()
            .unwrap()
            .insert(sheet.to_string(), receipt);
        self
    }

    /// Status probe answers, in order; `Pending` once exhausted
    pub fn with_statuses(self, statuses: Vec<TaskStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Called with the task id while the upload is being answered
    pub fn on_enqueue(self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        *self.on_enqueue.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_kinds(&self) -> Vec<GatewayCall> {
        self.calls().into_iter().map(|r| r.call).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn has_call(&self, predicate: impl Fn(&GatewayCall) -> bool) -> bool {
        self.calls.lock().unwrap().iter().any(|r| predicate(&r.call))
    }

    /// Record the call start, simulate latency, record the finish
    async fn track(&self, call: GatewayCall) {
        let started = self.clock.fetch_add(1, Ordering::SeqCst);
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(CallRecord {
                call,
                started,
                finished: None,
            });
            calls.len() - 1
        };

        let delay = *self.call_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        let finished = self.clock.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap()[index].finished = Some(finished);
    }
}

#[async_trait]
impl ImportGateway for FakeGateway {
    async fn validate(&self, file: &SelectedFile) -> Result<ValidatedWorkbook, GatewayError> {
        self.track(GatewayCall::Validate {
            file: file.name().to_string(),
        })
        .await;
        self.validation.lock().unwrap().clone()
    }

    async fn enqueue_import(&self, file: &SelectedFile) -> Result<EnqueueReceipt, GatewayError> {
        self.track(GatewayCall::Enqueue {
            file: file.name().to_string(),
        })
        .await;

        let result = self.enqueue.lock().unwrap().clone();
        if let Ok(EnqueueReceipt {
            task_id: Some(task_id),
        }) = &result
        {
            if let Some(hook) = self.on_enqueue.lock().unwrap().as_ref() {
                hook(task_id);
            }
        }
        result
    }

    async fn import_sheet(
        &self,
        sheet_name: &str,
        rows: &[RowRecord],
    ) -> Result<SheetImportReceipt, GatewayError> {
        self.track(GatewayCall::ImportSheet {
            sheet: sheet_name.to_string(),
            rows: rows.len(),
        })
        .await;

        if let Some(error) = self.sheet_failures.lock().unwrap().get(sheet_name) {
            return Err(error.clone());
        }
        Ok(self
            .sheet_receipts
            .lock()
            .unwrap()
            .get(sheet_name)
            .cloned()
            .unwrap_or(SheetImportReceipt {
                inserted: Some(rows.len() as u64),
                skipped: Vec::new(),
            }))
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, GatewayError> {
        self.track(GatewayCall::TaskStatus {
            task_id: task_id.to_string(),
        })
        .await;
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TaskStatus::Pending))
    }
}
