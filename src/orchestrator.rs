//! Generation orchestration.
//!
//! The orchestrator is the only component that knows both when a report
//! changes state and how: it registers the pending report, hands it to the
//! engine on a background task and reconciles the result into the store.

use crate::engine::AnalysisEngine;
use crate::models::ResearchReport;
use crate::store::{ReportStore, UpdateOutcome};
use futures::future::join_all;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How many undelivered events a slow subscriber may fall behind by.
const EVENT_CAPACITY: usize = 64;

/// Notification emitted as an analysis moves through its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
    /// A pending report was registered and generation has begun.
    Started { id: String, ticker: String },
    /// The completed report is in the store.
    Completed { id: String, ticker: String },
    /// Generation or reconciliation failed; the report stays pending.
    Failed {
        id: String,
        ticker: String,
        reason: String,
    },
    /// The report was deleted before generation finished.
    Discarded { id: String, ticker: String },
}

impl AnalysisEvent {
    pub fn id(&self) -> &str {
        match self {
            AnalysisEvent::Started { id, .. }
            | AnalysisEvent::Completed { id, .. }
            | AnalysisEvent::Failed { id, .. }
            | AnalysisEvent::Discarded { id, .. } => id,
        }
    }

    pub fn ticker(&self) -> &str {
        match self {
            AnalysisEvent::Started { ticker, .. }
            | AnalysisEvent::Completed { ticker, .. }
            | AnalysisEvent::Failed { ticker, .. }
            | AnalysisEvent::Discarded { ticker, .. } => ticker,
        }
    }
}

impl fmt::Display for AnalysisEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisEvent::Started { ticker, .. } => {
                write!(f, "Analysis started for {}.", ticker)
            }
            AnalysisEvent::Completed { ticker, .. } => {
                write!(f, "Analysis complete for {}.", ticker)
            }
            AnalysisEvent::Failed { ticker, reason, .. } => {
                write!(f, "Analysis failed for {}: {}", ticker, reason)
            }
            AnalysisEvent::Discarded { ticker, .. } => {
                write!(f, "Analysis for {} finished after its report was deleted.", ticker)
            }
        }
    }
}

/// Starts analyses and applies their results to the store.
///
/// Each analysis runs on its own Tokio task. Dropping the orchestrator
/// detaches those tasks rather than cancelling them, so results still
/// reach the store.
pub struct GenerationOrchestrator {
    store: Arc<ReportStore>,
    engine: Arc<dyn AnalysisEngine>,
    events: broadcast::Sender<AnalysisEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GenerationOrchestrator {
    pub fn new(store: Arc<ReportStore>, engine: Arc<dyn AnalysisEngine>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            engine,
            events,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<ReportStore> {
        &self.store
    }

    /// Receive events for analyses started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.events.subscribe()
    }

    /// Start an analysis for `ticker`.
    ///
    /// The pending report is in the store when this returns. Returns its id,
    /// or `None` (with no state change) if the ticker is blank. Identical
    /// tickers are not de-duplicated.
    pub fn start_analysis(&self, ticker: &str) -> Option<String> {
        let Some(pending) = ResearchReport::pending(ticker) else {
            warn!("Ticker cannot be empty, ignoring request");
            return None;
        };

        let id = pending.id().to_string();
        let ticker = pending.ticker().to_string();

        self.store.add(pending.clone());
        info!(id = %id, ticker = %ticker, "Analysis started");
        let _ = self.events.send(AnalysisEvent::Started {
            id: id.clone(),
            ticker,
        });

        let handle = tokio::spawn(run_generation(
            Arc::clone(&self.store),
            Arc::clone(&self.engine),
            self.events.clone(),
            pending,
        ));

        let mut tasks = self.lock_tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);

        Some(id)
    }

    /// Number of analyses that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.lock_tasks()
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Wait for every analysis started so far, including ones started while
    /// waiting.
    pub async fn wait_all(&self) {
        loop {
            let handles = std::mem::take(&mut *self.lock_tasks());
            if handles.is_empty() {
                return;
            }

            debug!("Waiting for {} analyses", handles.len());
            for result in join_all(handles).await {
                if let Err(e) = result {
                    error!("Analysis task panicked: {}", e);
                }
            }
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_generation(
    store: Arc<ReportStore>,
    engine: Arc<dyn AnalysisEngine>,
    events: broadcast::Sender<AnalysisEvent>,
    pending: ResearchReport,
) {
    let id = pending.id().to_string();
    let ticker = pending.ticker().to_string();

    let event = match engine.generate(pending).await {
        Ok(completed) => reconcile(&store, id, ticker, completed),
        Err(e) => {
            warn!(id = %id, ticker = %ticker, "Analysis failed: {}", e);
            AnalysisEvent::Failed {
                id,
                ticker,
                reason: e.to_string(),
            }
        }
    };

    let _ = events.send(event);
}

fn reconcile(
    store: &ReportStore,
    id: String,
    ticker: String,
    completed: ResearchReport,
) -> AnalysisEvent {
    let reason = if completed.id() != id {
        format!("engine returned report {} instead of {}", completed.id(), id)
    } else if !completed.is_complete() {
        "engine returned a report that is not complete".to_string()
    } else {
        match store.update(completed) {
            UpdateOutcome::Applied => {
                info!(id = %id, ticker = %ticker, "Analysis complete");
                return AnalysisEvent::Completed { id, ticker };
            }
            UpdateOutcome::Deferred => {
                info!(id = %id, ticker = %ticker, "Analysis complete, applied when the library loads");
                return AnalysisEvent::Completed { id, ticker };
            }
            UpdateOutcome::NotFound => {
                info!(id = %id, ticker = %ticker, "Report deleted during analysis, discarding result");
                return AnalysisEvent::Discarded { id, ticker };
            }
            UpdateOutcome::Rejected => "store rejected the completed report".to_string(),
        }
    };

    warn!(id = %id, ticker = %ticker, "Analysis failed: {}", reason);
    AnalysisEvent::Failed { id, ticker, reason }
}
