//! Report generation engines.
//!
//! An engine turns a pending report into a complete one. It never touches
//! the store; the orchestrator decides what happens with the result.

mod mock;

pub use mock::{LatencyRange, MockAnalysisEngine};

use crate::error::EngineError;
use crate::models::ResearchReport;
use async_trait::async_trait;

/// Something that can produce the content of a research report.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Generate the complete version of `pending`.
    ///
    /// The returned report keeps the id, ticker, company name and creation
    /// time of the input. Non-pending input is rejected.
    async fn generate(&self, pending: ResearchReport) -> Result<ResearchReport, EngineError>;
}
