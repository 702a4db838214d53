//! Import session state machine
//!
//! IDLE → FILE_SELECTED → VALIDATING → VALID | INVALID → IMPORTING
//! (↔ STALLED) → COMPLETED | FAILED → IDLE (after the grace period)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{SelectedFile, SheetRegistry};

/// How much of a failed import may have reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FailureScope {
    /// Nothing was committed
    Total,
    /// Some rows were committed before the failure
    Partial,
    /// Observation was lost; the server may still finish the work
    Unknown,
}

/// Import workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportState {
    /// No file selected
    Idle,
    /// File accepted locally, validation about to start
    FileSelected,
    /// Structural validation in flight
    Validating,
    /// Validation produced at least one sheet
    Valid,
    /// Validation rejected the file
    Invalid,
    /// Import running
    Importing,
    /// Queued task has gone quiet past the watchdog window
    Stalled,
    /// Import finished (possibly with per-sheet failures)
    Completed,
    /// Import failed
    Failed(FailureScope),
}

impl ImportState {
    /// Active sessions are anything outside IDLE / COMPLETED / FAILED
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            ImportState::Idle | ImportState::Completed | ImportState::Failed(_)
        )
    }

    /// Work is in flight and must not be interrupted by a new selection
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ImportState::FileSelected
                | ImportState::Validating
                | ImportState::Importing
                | ImportState::Stalled
        )
    }

    /// Terminal states auto-reset to IDLE after the grace period
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Completed | ImportState::Failed(_))
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: ImportState,
    pub new_state: ImportState,
    pub transitioned_at: DateTime<Utc>,
}

/// The one live import session of an orchestrator
#[derive(Debug, Clone)]
pub struct ImportSession {
    /// Unique session identifier
    pub session_id: Uuid,

    /// Current workflow state
    pub state: ImportState,

    /// File being imported
    pub file: Option<SelectedFile>,

    /// Whether validation accepted the file
    pub is_valid: bool,

    /// File name as echoed back by validation
    pub validated_filename: Option<String>,

    /// Sheets, exclusions and preview selection
    pub registry: SheetRegistry,

    /// Percentage complete (0 - 100), non-decreasing within one task
    pub progress: u8,

    /// Human-readable status line
    pub status_message: String,

    /// Transition history
    pub transitions: Vec<StateTransition>,

    /// Session start time
    pub started_at: DateTime<Utc>,

    /// Session end time (set on terminal states)
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImportSession {
    /// Create new idle session
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: ImportState::Idle,
            file: None,
            is_valid: false,
            validated_filename: None,
            registry: SheetRegistry::new(),
            progress: 0,
            status_message: String::new(),
            transitions: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: ImportState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        self.transitions.push(transition.clone());
        transition
    }

    /// Raise progress; lower values are ignored
    pub fn advance_progress(&mut self, percent: u8) -> u8 {
        self.progress = self.progress.max(percent.min(100));
        self.progress
    }

    /// Restart progress for a new task
    pub fn reset_progress(&mut self) {
        self.progress = 0;
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }
}

impl Default for ImportSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a session for callers
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: ImportState,
    pub is_valid: bool,
    pub validated_filename: Option<String>,
    pub sheet_names: Vec<String>,
    pub excluded_sheets: Vec<String>,
    pub selected_sheet: usize,
    pub progress: u8,
    pub status_message: String,
}

impl From<&ImportSession> for SessionSnapshot {
    fn from(session: &ImportSession) -> Self {
        let registry = &session.registry;
        Self {
            session_id: session.session_id,
            state: session.state,
            is_valid: session.is_valid,
            validated_filename: session.validated_filename.clone(),
            sheet_names: registry.sheets().iter().map(|s| s.name.clone()).collect(),
            excluded_sheets: registry.excluded_names(),
            selected_sheet: registry.selected_index(),
            progress: session.progress,
            status_message: session.status_message.clone(),
        }
    }
}
