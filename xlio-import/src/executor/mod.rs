//! Import execution strategies
//!
//! One strategy is picked per attempt from the registry state:
//!
//! - exactly one included sheet and no exclusions → [`QueuedTask`]
//! - anything else → [`SequentialConfirmedImport`]
//!
//! Strategies never touch the session. They report through an
//! [`UpdateSink`] and return an [`ImportReport`]; the orchestrator turns both
//! into state transitions.

mod queued;
mod sequential;

pub use queued::QueuedTask;
pub use sequential::SequentialConfirmedImport;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use crate::channel::ProgressChannel;
use crate::error::{ImportError, ImportResult};
use crate::gateway::ImportGateway;
use crate::models::{ImportReport, SelectedFile, SheetRegistry, StrategyKind};

/// Correlates a local attempt with the work it started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskHandle {
    /// Server-issued task id
    Queued { task_id: String },
    /// Position in the sequential work list
    Sequential { index: usize, sheet_name: String },
}

/// Progress reported by a running strategy
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorUpdate {
    /// Work accepted; the attempt may now have side effects
    Started(TaskHandle),
    Progress {
        percent: u8,
        message: String,
    },
    /// One sequential sheet finished; `failure` holds the reason if it failed
    SheetFinished {
        sheet_name: String,
        completed: usize,
        total: usize,
        failure: Option<String>,
    },
    /// Watchdog window passed with no event for the task
    Stalled { task_id: String },
    /// Events resumed after a stall
    Resumed { task_id: String },
}

pub type UpdateSink = mpsc::UnboundedSender<ExecutorUpdate>;

/// Choose the strategy for the current registry state
pub fn select_strategy(registry: &SheetRegistry) -> ImportResult<StrategyKind> {
    let included = registry.included_sheets().len();
    if included == 0 {
        return Err(ImportError::Validation(
            "every sheet is excluded; nothing to import".to_string(),
        ));
    }

    if included == 1 && !registry.has_exclusions() {
        Ok(StrategyKind::Queued)
    } else {
        Ok(StrategyKind::Sequential)
    }
}

/// A strategy bound to its inputs, ready to run once
pub enum ImportStrategy {
    Queued(QueuedTask),
    Sequential(SequentialConfirmedImport),
}

impl ImportStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            ImportStrategy::Queued(_) => StrategyKind::Queued,
            ImportStrategy::Sequential(_) => StrategyKind::Sequential,
        }
    }

    /// Drive the strategy to its end
    pub async fn run(self, updates: UpdateSink) -> ImportResult<ImportReport> {
        match self {
            ImportStrategy::Queued(task) => task.run(&updates).await,
            ImportStrategy::Sequential(import) => import.run(&updates).await,
        }
    }
}

/// Builds strategies from the shared collaborators
#[derive(Clone)]
pub struct TaskExecutor {
    gateway: Arc<dyn ImportGateway>,
    channel: ProgressChannel,
    watchdog: Duration,
}

impl TaskExecutor {
    pub fn new(gateway: Arc<dyn ImportGateway>, channel: ProgressChannel, watchdog: Duration) -> Self {
        Self {
            gateway,
            channel,
            watchdog,
        }
    }

    pub fn channel(&self) -> &ProgressChannel {
        &self.channel
    }

    /// Select and bind a strategy. The registry is only read; the chosen
    /// strategy owns copies of what it needs.
    pub fn plan(&self, file: &SelectedFile, registry: &SheetRegistry) -> ImportResult<ImportStrategy> {
        let kind = select_strategy(registry)?;
        let included = registry.included_sheets();

        info!(
            strategy = ?kind,
            included = included.len(),
            excluded = registry.excluded_names().len(),
            "Import strategy selected"
        );

        let strategy = match kind {
            StrategyKind::Queued => ImportStrategy::Queued(QueuedTask::new(
                Arc::clone(&self.gateway),
                self.channel.clone(),
                file.clone(),
                included[0].name.clone(),
                self.watchdog,
            )),
            StrategyKind::Sequential => ImportStrategy::Sequential(SequentialConfirmedImport::new(
                Arc::clone(&self.gateway),
                included.into_iter().cloned().collect(),
            )),
        };

        Ok(strategy)
    }
}
