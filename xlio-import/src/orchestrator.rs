//! Import orchestrator
//!
//! Top-level state machine. Owns the one live [`ImportSession`] (and through
//! it the [`SheetRegistry`](crate::models::SheetRegistry)), runs validation,
//! hands the registry to the [`TaskExecutor`] and folds strategy updates back
//! into session state.
//!
//! The session lock is never held across a network call. Mutual exclusion
//! between attempts comes from the state guard: anything that would disturb
//! a busy session fails with [`ImportError::ImportInProgress`].
//!
//! A caller may drop `select_file` or `start_import` before it finishes. The
//! attempt is then recorded as interrupted, and the next call on the
//! orchestrator settles it into INVALID or FAILED(UNKNOWN).

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use xlio_common::events::EventBus;

use crate::channel::ProgressChannel;
use crate::config::ImportConfig;
use crate::error::{ImportError, ImportResult};
use crate::executor::{ExecutorUpdate, TaskExecutor, TaskHandle};
use crate::gateway::{GatewayError, HttpGateway, ImportGateway};
use crate::models::{
    FailureScope, ImportReport, ImportSession, ImportState, RowRecord, SelectedFile,
    SessionSnapshot,
};

const EVENT_BUS_CAPACITY: usize = 256;

/// Lifecycle events for callers that render or refresh views
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ImportEvent {
    StateChanged {
        session_id: Uuid,
        old_state: ImportState,
        new_state: ImportState,
    },
    Progress {
        session_id: Uuid,
        percent: u8,
        message: String,
    },
    SheetFinished {
        session_id: Uuid,
        sheet_name: String,
        completed: usize,
        total: usize,
        failure: Option<String>,
    },
    /// Attempt reached COMPLETED or FAILED; dependent views may refresh
    ImportFinished {
        session_id: Uuid,
        state: ImportState,
        message: String,
        report: Option<ImportReport>,
    },
    /// Session returned to IDLE
    SessionReset { session_id: Uuid },
}

struct Inner {
    session: ImportSession,
    /// When the session entered a terminal state
    terminal_at: Option<Instant>,
}

/// A busy attempt whose future was dropped
#[derive(Debug, Clone, Copy)]
struct AbandonedAttempt {
    session_id: Uuid,
    task_started: bool,
}

/// Records the attempt as abandoned unless disarmed before drop
struct AttemptGuard<'a> {
    slot: &'a Mutex<Option<AbandonedAttempt>>,
    session_id: Uuid,
    task_started: bool,
    armed: bool,
}

impl<'a> AttemptGuard<'a> {
    fn new(slot: &'a Mutex<Option<AbandonedAttempt>>, session_id: Uuid) -> Self {
        Self {
            slot,
            session_id,
            task_started: false,
            armed: true,
        }
    }

    /// The attempt reached its own fold-back; returns whether work started
    fn disarm(mut self) -> bool {
        self.armed = false;
        self.task_started
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(AbandonedAttempt {
                session_id: self.session_id,
                task_started: self.task_started,
            });
        }
    }
}

pub struct ImportOrchestrator {
    config: ImportConfig,
    gateway: Arc<dyn ImportGateway>,
    executor: TaskExecutor,
    inner: RwLock<Inner>,
    abandoned: Mutex<Option<AbandonedAttempt>>,
    event_bus: EventBus<ImportEvent>,
}

impl ImportOrchestrator {
    pub fn new(
        config: ImportConfig,
        gateway: Arc<dyn ImportGateway>,
        channel: ProgressChannel,
    ) -> Self {
        let executor = TaskExecutor::new(Arc::clone(&gateway), channel, config.watchdog);
        Self {
            config,
            gateway,
            executor,
            inner: RwLock::new(Inner {
                session: ImportSession::new(),
                terminal_at: None,
            }),
            abandoned: Mutex::new(None),
            event_bus: EventBus::new(EVENT_BUS_CAPACITY),
        }
    }

    /// HTTP gateway plus websocket notification channel from configuration
    pub fn from_config(config: ImportConfig) -> ImportResult<Self> {
        let gateway = HttpGateway::new(config.api_base_url.clone(), config.http_timeout)?;
        let channel = ProgressChannel::websocket(config.notify_url.clone(), config.reconnect);
        Ok(Self::new(config, Arc::new(gateway), channel))
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn channel(&self) -> &ProgressChannel {
        self.executor.channel()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ImportEvent> {
        self.event_bus.subscribe()
    }

    /// Accept a file and validate it
    ///
    /// Extension and size are checked before any network call. Every
    /// rejection leaves the session INVALID with the reason as status.
    pub async fn select_file(&self, file: SelectedFile) -> ImportResult<SessionSnapshot> {
        let session_id = {
            let mut inner = self.inner.write().await;
            self.expire_terminal(&mut inner);

            if inner.session.state.is_busy() {
                return Err(ImportError::ImportInProgress);
            }

            if let Err(e) = self.check_file(&file) {
                warn!(file = %file.name(), error = %e, "File rejected before upload");
                inner.session = ImportSession::new();
                inner.terminal_at = None;
                inner.session.set_status(e.to_string());
                self.transition(&mut inner.session, ImportState::Invalid);
                return Err(e);
            }

            inner.session = ImportSession::new();
            inner.terminal_at = None;
            inner.session.file = Some(file.clone());
            inner.session.set_status(format!("Selected {}", file.name()));
            self.transition(&mut inner.session, ImportState::FileSelected);
            inner.session.set_status(format!("Validating {}...", file.name()));
            self.transition(&mut inner.session, ImportState::Validating);
            inner.session.session_id
        };

        let guard = AttemptGuard::new(&self.abandoned, session_id);
        let result = self.gateway.validate(&file).await;

        let mut inner = self.inner.write().await;
        guard.disarm();
        let session = &mut inner.session;

        let workbook = match result {
            Ok(workbook) => workbook,
            Err(e) => {
                warn!(file = %file.name(), error = %e, "Validation call failed");
                session.set_status(format!("Validation of {} failed: {}", file.name(), e));
                self.transition(session, ImportState::Invalid);
                return Err(e.into());
            }
        };

        let filename = if workbook.filename.is_empty() {
            file.name().to_string()
        } else {
            workbook.filename
        };

        let sheet_count = workbook.sheets.len();
        if let Err(e) = session.registry.load(workbook.sheets, filename.clone()) {
            let e = match e {
                ImportError::Validation(reason) => GatewayError::NoUsableSheets(reason).into(),
                other => other,
            };
            warn!(file = %filename, error = %e, "Validation produced no usable sheets");
            session.set_status(format!("{} cannot be imported: {}", filename, e));
            self.transition(session, ImportState::Invalid);
            return Err(e);
        }

        session.is_valid = true;
        session.validated_filename = Some(filename.clone());
        session.set_status(format!(
            "{} is valid: {} sheet(s) ready to import",
            filename, sheet_count
        ));
        self.transition(session, ImportState::Valid);

        Ok(SessionSnapshot::from(&*session))
    }

    /// Preview one sheet
    pub async fn select_sheet(&self, index: usize) -> ImportResult<Vec<RowRecord>> {
        let mut inner = self.inner.write().await;
        self.expire_terminal(&mut inner);
        Self::guard_not_importing(&inner.session)?;

        let preview = inner.session.registry.select(index)?;
        Ok(preview.to_vec())
    }

    /// Flip a sheet's membership in the exclusion set; returns whether it is
    /// now excluded
    pub async fn toggle_exclusion(&self, sheet_name: &str) -> ImportResult<bool> {
        let mut inner = self.inner.write().await;
        self.expire_terminal(&mut inner);
        Self::guard_not_importing(&inner.session)?;

        let excluded = inner.session.registry.toggle_exclusion(sheet_name)?;
        debug!(sheet = sheet_name, excluded, "Sheet exclusion toggled");
        Ok(excluded)
    }

    /// Import the included sheets of a VALID session
    pub async fn start_import(&self) -> ImportResult<ImportReport> {
        let (strategy, session_id) = {
            let mut inner = self.inner.write().await;
            self.expire_terminal(&mut inner);

            match inner.session.state {
                ImportState::Valid => {}
                ImportState::Importing | ImportState::Stalled => {
                    return Err(ImportError::ImportInProgress)
                }
                state => {
                    return Err(ImportError::InvalidState {
                        action: "start an import",
                        state,
                    })
                }
            }

            let session = &mut inner.session;
            let file = session
                .file
                .clone()
                .ok_or_else(|| ImportError::Validation("no file selected".to_string()))?;
            let strategy = self.executor.plan(&file, &session.registry)?;

            session.reset_progress();
            session.set_status("Importing...");
            self.transition(session, ImportState::Importing);
            (strategy, session.session_id)
        };
        let mut guard = AttemptGuard::new(&self.abandoned, session_id);

        let kind = strategy.kind();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let run = strategy.run(tx);
        tokio::pin!(run);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(update) = rx.recv() => self.apply_update(update, &mut guard.task_started).await,
                result = &mut run => break result,
            }
        };
        while let Ok(update) = rx.try_recv() {
            self.apply_update(update, &mut guard.task_started).await;
        }

        let mut inner = self.inner.write().await;
        let task_started = guard.disarm();
        let session = &mut inner.session;

        let (result, message) = match outcome {
            Ok(report) => {
                session.advance_progress(100);
                let message = report.summary_message();
                session.set_status(message.clone());
                self.transition(session, ImportState::Completed);
                info!(
                    strategy = ?kind,
                    failed_sheets = report.failures.len(),
                    "Import completed"
                );
                (Ok(report), message)
            }
            Err(e) => {
                let scope = e.failure_scope(task_started);
                let message = failure_message(&e, scope);
                session.set_status(message.clone());
                self.transition(session, ImportState::Failed(scope));
                warn!(strategy = ?kind, scope = ?scope, error = %e, "Import failed");
                (Err(e), message)
            }
        };

        let state = session.state;
        inner.terminal_at = Some(Instant::now());

        self.event_bus.emit_lossy(ImportEvent::ImportFinished {
            session_id,
            state,
            message,
            report: result.as_ref().ok().cloned(),
        });

        result
    }

    /// Current session view. A terminal session past its grace period is
    /// reset first.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let mut inner = self.inner.write().await;
        self.expire_terminal(&mut inner);
        SessionSnapshot::from(&inner.session)
    }

    pub async fn state(&self) -> ImportState {
        self.snapshot().await.state
    }

    /// Wait out the remaining grace period of a terminal session, then reset
    pub async fn settle(&self) -> SessionSnapshot {
        let remaining = {
            let inner = self.inner.read().await;
            inner
                .terminal_at
                .map(|at| self.config.reset_delay.saturating_sub(at.elapsed()))
        };

        if let Some(remaining) = remaining {
            tokio::time::sleep(remaining).await;
        }
        self.snapshot().await
    }

    /// Discard the session now. Not allowed while work is in flight.
    pub async fn reset(&self) -> ImportResult<()> {
        let mut inner = self.inner.write().await;
        self.recover_abandoned(&mut inner);
        if inner.session.state.is_busy() {
            return Err(ImportError::ImportInProgress);
        }
        self.reset_session(&mut inner);
        Ok(())
    }

    /// Close the notification channel
    pub async fn shutdown(&self) {
        self.executor.channel().close().await;
    }

    fn check_file(&self, file: &SelectedFile) -> ImportResult<()> {
        let extension = file.extension().unwrap_or_default();
        if !self.config.accepts_extension(&extension) {
            return Err(ImportError::UnsupportedExtension {
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{}", extension)
                },
                accepted: self.config.accepted_list(),
            });
        }

        if file.size_bytes() > self.config.max_file_bytes {
            return Err(ImportError::FileTooLarge {
                size: file.size_bytes(),
                limit: self.config.max_file_bytes,
            });
        }

        Ok(())
    }

    fn guard_not_importing(session: &ImportSession) -> ImportResult<()> {
        if session.state.is_busy() {
            Err(ImportError::ImportInProgress)
        } else {
            Ok(())
        }
    }

    async fn apply_update(&self, update: ExecutorUpdate, task_started: &mut bool) {
        let mut inner = self.inner.write().await;
        let session = &mut inner.session;
        let session_id = session.session_id;

        match update {
            ExecutorUpdate::Started(handle) => {
                *task_started = true;
                match handle {
                    TaskHandle::Queued { task_id } => {
                        debug!(task_id = %task_id, "Queued task accepted");
                    }
                    TaskHandle::Sequential { index, sheet_name } => {
                        debug!(index, sheet = %sheet_name, "Sheet import started");
                    }
                }
            }
            ExecutorUpdate::Progress { percent, message } => {
                let percent = session.advance_progress(percent);
                session.set_status(message.clone());
                self.event_bus.emit_lossy(ImportEvent::Progress {
                    session_id,
                    percent,
                    message,
                });
            }
            ExecutorUpdate::SheetFinished {
                sheet_name,
                completed,
                total,
                failure,
            } => {
                self.event_bus.emit_lossy(ImportEvent::SheetFinished {
                    session_id,
                    sheet_name,
                    completed,
                    total,
                    failure,
                });
            }
            ExecutorUpdate::Stalled { task_id } => {
                session.set_status(format!(
                    "No response from the server for task {}; still waiting",
                    task_id
                ));
                self.transition(session, ImportState::Stalled);
            }
            ExecutorUpdate::Resumed { .. } => {
                session.set_status("Importing...");
                self.transition(session, ImportState::Importing);
            }
        }
    }

    fn transition(&self, session: &mut ImportSession, new_state: ImportState) {
        if session.state == new_state {
            return;
        }

        let transition = session.transition_to(new_state);
        info!(
            session_id = %transition.session_id,
            old_state = ?transition.old_state,
            new_state = ?transition.new_state,
            "Import state changed"
        );

        self.event_bus.emit_lossy(ImportEvent::StateChanged {
            session_id: transition.session_id,
            old_state: transition.old_state,
            new_state: transition.new_state,
        });
    }

    /// Settle an attempt whose caller stopped waiting for it
    fn recover_abandoned(&self, inner: &mut Inner) {
        let abandoned = match self.abandoned.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let attempt = match abandoned {
            Some(attempt) => attempt,
            None => return,
        };

        let session = &mut inner.session;
        if session.session_id != attempt.session_id || !session.state.is_busy() {
            return;
        }

        let session_id = session.session_id;
        let (state, message) = match session.state {
            ImportState::FileSelected | ImportState::Validating => (
                ImportState::Invalid,
                "Validation was interrupted before the server answered".to_string(),
            ),
            _ => {
                let error = ImportError::Interrupted;
                let scope = error.failure_scope(attempt.task_started);
                (ImportState::Failed(scope), failure_message(&error, scope))
            }
        };

        warn!(session_id = %session_id, state = ?state, "Interrupted attempt settled");
        session.set_status(message.clone());
        self.transition(session, state);

        if state.is_terminal() {
            inner.terminal_at = Some(Instant::now());
            self.event_bus.emit_lossy(ImportEvent::ImportFinished {
                session_id,
                state,
                message,
                report: None,
            });
        }
    }

    /// Reset a terminal session whose grace period has passed. Interrupted
    /// attempts are settled first.
    fn expire_terminal(&self, inner: &mut Inner) {
        self.recover_abandoned(inner);
        let expired = inner
            .terminal_at
            .map_or(false, |at| at.elapsed() >= self.config.reset_delay);
        if expired && inner.session.state.is_terminal() {
            self.reset_session(inner);
        }
    }

    fn reset_session(&self, inner: &mut Inner) {
        let old_id = inner.session.session_id;
        let old_state = inner.session.state;
        inner.session = ImportSession::new();
        inner.terminal_at = None;

        info!(session_id = %old_id, old_state = ?old_state, "Import session reset");
        self.event_bus.emit_lossy(ImportEvent::SessionReset { session_id: old_id });
    }
}

/// User-facing failure text: what failed, and whether data may have landed
fn failure_message(error: &ImportError, scope: FailureScope) -> String {
    match scope {
        FailureScope::Total => format!("Import failed: {}. No data was imported", error),
        FailureScope::Partial => format!(
            "Import failed: {}. Some rows may already have been committed",
            error
        ),
        FailureScope::Unknown => format!(
            "Import outcome unknown: {}. The import may still finish on the server",
            error
        ),
    }
}
