//! Persistent report collection.
//!
//! The store keeps the authoritative collection in memory and mirrors it to
//! a [`StorageBackend`] under a single key. Lifecycle:
//!
//! - `new` spawns the writer task; nothing is read or written yet.
//! - `load` reads the stored collection. Mutations made before this point
//!   are journaled and replayed on top of what was read, so an early `add`
//!   never clobbers a previous session.
//! - every mutation afterwards queues exactly one write of the full
//!   collection, sorted by `createdAt` descending.
//!
//! Persistence failures are logged and otherwise ignored; the in-memory
//! collection stays authoritative for the session.

mod backend;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};

use crate::models::ResearchReport;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Key the collection is stored under unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "thesisbuilder.research_library";

/// Result of [`ReportStore::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The stored report was replaced.
    Applied,
    /// No report with that id exists.
    NotFound,
    /// The replacement would break the report lifecycle and was dropped.
    Rejected,
    /// The store is not loaded and the id is not known yet. The change is
    /// journaled and applied by `load` if the id turns up in storage.
    Deferred,
}

#[derive(Debug, Clone)]
enum Mutation {
    Add(ResearchReport),
    Update(ResearchReport),
    Delete(String),
}

#[derive(Debug, Default)]
struct StoreState {
    reports: Vec<ResearchReport>,
    loaded: bool,
    journal: Vec<Mutation>,
}

enum WriteRequest {
    Save(Vec<ResearchReport>),
    Flush(oneshot::Sender<()>),
}

/// The report collection plus its durable mirror.
pub struct ReportStore {
    state: Mutex<StoreState>,
    backend: Arc<dyn StorageBackend>,
    key: String,
    writer: mpsc::UnboundedSender<WriteRequest>,
}

impl ReportStore {
    /// Create a store over `backend`.
    ///
    /// Spawns the background writer, so this must run inside a Tokio
    /// runtime.
    pub fn new(backend: Arc<dyn StorageBackend>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (writer, requests) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(Arc::clone(&backend), key.clone(), requests));

        Self {
            state: Mutex::new(StoreState::default()),
            backend,
            key,
            writer,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether `load` has completed.
    pub fn is_loaded(&self) -> bool {
        self.lock().loaded
    }

    /// Read the persisted collection and make the store ready.
    ///
    /// The backend is read on the blocking pool. Missing or corrupt data
    /// yields an empty collection. Calling this again after the first load
    /// just returns the current collection.
    pub async fn load(&self) -> Vec<ResearchReport> {
        if self.is_loaded() {
            debug!("Store already loaded");
            return self.list();
        }

        let stored = self.read_stored().await;

        let mut state = self.lock();
        if state.loaded {
            return sorted(&state.reports);
        }

        let mut reports = stored;
        let journal = std::mem::take(&mut state.journal);
        for mutation in &journal {
            apply(&mut reports, mutation);
        }

        state.reports = reports;
        state.loaded = true;
        info!(
            "Loaded {} reports ({} early changes replayed)",
            state.reports.len(),
            journal.len()
        );

        if !journal.is_empty() {
            self.persist(&state.reports);
        }
        sorted(&state.reports)
    }

    /// Insert a new report. Returns `false` if the id is already present.
    pub fn add(&self, report: ResearchReport) -> bool {
        let mutation = Mutation::Add(report);
        let mut state = self.lock();
        let changed = apply(&mut state.reports, &mutation);
        if changed {
            self.record(&mut state, mutation);
        }
        changed
    }

    /// Replace the stored report that has the same id.
    pub fn update(&self, report: ResearchReport) -> UpdateOutcome {
        let mut state = self.lock();
        let outcome = apply_update(&mut state.reports, &report);

        match outcome {
            UpdateOutcome::Applied => self.record(&mut state, Mutation::Update(report)),
            // Before load the id may still exist in storage, so keep the change.
            UpdateOutcome::NotFound if !state.loaded => {
                self.record(&mut state, Mutation::Update(report));
                return UpdateOutcome::Deferred;
            }
            _ => {}
        }
        outcome
    }

    /// Remove the report with `id`. Returns whether something was removed.
    ///
    /// Before `load`, an unknown id is journaled and removed from the
    /// stored collection once it is read; this still returns `false`.
    pub fn delete(&self, id: &str) -> bool {
        let mutation = Mutation::Delete(id.to_string());
        let mut state = self.lock();
        let removed = apply(&mut state.reports, &mutation);
        if removed || !state.loaded {
            self.record(&mut state, mutation);
        }
        removed
    }

    /// All reports, newest first.
    pub fn list(&self) -> Vec<ResearchReport> {
        sorted(&self.lock().reports)
    }

    pub fn get(&self, id: &str) -> Option<ResearchReport> {
        self.lock().reports.iter().find(|r| r.id() == id).cloned()
    }

    /// Reports whose id starts with `prefix`, newest first.
    pub fn find_by_prefix(&self, prefix: &str) -> Vec<ResearchReport> {
        let state = self.lock();
        let matches: Vec<ResearchReport> = state
            .reports
            .iter()
            .filter(|r| r.id().starts_with(prefix))
            .cloned()
            .collect();
        sorted(&matches)
    }

    pub fn len(&self) -> usize {
        self.lock().reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every queued write has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.writer.send(WriteRequest::Flush(done)).is_err() {
            warn!("Store writer has stopped; nothing to flush");
            return;
        }
        let _ = wait.await;
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, state: &mut StoreState, mutation: Mutation) {
        if state.loaded {
            self.persist(&state.reports);
        } else {
            debug!("Store not loaded yet, journaling change");
            state.journal.push(mutation);
        }
    }

    fn persist(&self, reports: &[ResearchReport]) {
        if self.writer.send(WriteRequest::Save(sorted(reports))).is_err() {
            error!("Store writer has stopped; change not persisted");
        }
    }

    async fn read_stored(&self) -> Vec<ResearchReport> {
        let backend = Arc::clone(&self.backend);
        let key = self.key.clone();
        let raw = match tokio::task::spawn_blocking(move || backend.read(&key)).await {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => {
                debug!("No stored reports under '{}'", self.key);
                return Vec::new();
            }
            Ok(Err(e)) => {
                error!("Failed to read stored reports: {}", e);
                return Vec::new();
            }
            Err(e) => {
                error!("Load task failed: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<ResearchReport>>(&raw) {
            Ok(reports) => dedupe(reports),
            Err(e) => {
                error!("Stored reports are corrupt, starting empty: {}", e);
                Vec::new()
            }
        }
    }
}

/// Background task that performs writes in the order they were queued.
async fn run_writer(
    backend: Arc<dyn StorageBackend>,
    key: String,
    mut requests: mpsc::UnboundedReceiver<WriteRequest>,
) {
    while let Some(request) = requests.recv().await {
        match request {
            WriteRequest::Save(reports) => {
                let json = match serde_json::to_string(&reports) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize reports: {}", e);
                        continue;
                    }
                };

                let backend = Arc::clone(&backend);
                let key = key.clone();
                let count = reports.len();
                match tokio::task::spawn_blocking(move || backend.write(&key, &json)).await {
                    Ok(Ok(())) => debug!("Saved {} reports", count),
                    Ok(Err(e)) => error!("Failed to save reports: {}", e),
                    Err(e) => error!("Save task failed: {}", e),
                }
            }
            WriteRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Store writer stopped");
}

fn apply(reports: &mut Vec<ResearchReport>, mutation: &Mutation) -> bool {
    match mutation {
        Mutation::Add(report) => {
            if reports.iter().any(|r| r.id() == report.id()) {
                warn!(id = report.id(), "Ignoring add of duplicate report id");
                return false;
            }
            reports.insert(0, report.clone());
            true
        }
        Mutation::Update(report) => apply_update(reports, report) == UpdateOutcome::Applied,
        Mutation::Delete(id) => {
            let before = reports.len();
            reports.retain(|r| r.id() != id);
            reports.len() != before
        }
    }
}

fn apply_update(reports: &mut [ResearchReport], report: &ResearchReport) -> UpdateOutcome {
    let Some(existing) = reports.iter_mut().find(|r| r.id() == report.id()) else {
        debug!(id = report.id(), "Update for unknown report");
        return UpdateOutcome::NotFound;
    };

    if !existing.same_identity(report) {
        warn!(id = report.id(), "Rejecting update that changes immutable fields");
        return UpdateOutcome::Rejected;
    }
    if existing.is_complete() {
        warn!(id = report.id(), "Rejecting update of a completed report");
        return UpdateOutcome::Rejected;
    }

    *existing = report.clone();
    UpdateOutcome::Applied
}

/// Newest first; ties keep their current order.
fn sorted(reports: &[ResearchReport]) -> Vec<ResearchReport> {
    let mut sorted = reports.to_vec();
    sorted.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    sorted
}

fn dedupe(reports: Vec<ResearchReport>) -> Vec<ResearchReport> {
    let mut seen = HashSet::new();
    let total = reports.len();
    let unique: Vec<ResearchReport> = reports
        .into_iter()
        .filter(|r| seen.insert(r.id().to_string()))
        .collect();
    if unique.len() != total {
        warn!("Dropped {} stored reports with duplicate ids", total - unique.len());
    }
    unique
}
