//! Templated engine that simulates a long-running analysis.
//!
//! The content is static apart from the company name; only the shape
//! (six conviction dimensions, four phases of two steps) is meaningful.

use super::AnalysisEngine;
use crate::error::EngineError;
use crate::models::{AnalysisPhase, AnalysisStep, ConvictionScore, ExecutiveSummary, ResearchReport};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info};

/// Bounds for the simulated processing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyRange {
    min: Duration,
    max: Duration,
}

impl Default for LatencyRange {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(5),
            max: Duration::from_secs(10),
        }
    }
}

impl LatencyRange {
    /// Create a range; reversed bounds are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A range that always yields `latency`.
    pub fn fixed(latency: Duration) -> Self {
        Self::new(latency, latency)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw a latency uniformly from the range (millisecond resolution).
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min == max {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Engine that waits a random time and returns templated content.
#[derive(Debug, Clone, Default)]
pub struct MockAnalysisEngine {
    latency: LatencyRange,
}

impl MockAnalysisEngine {
    pub fn new(latency: LatencyRange) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> LatencyRange {
        self.latency
    }
}

#[async_trait]
impl AnalysisEngine for MockAnalysisEngine {
    async fn generate(&self, pending: ResearchReport) -> Result<ResearchReport, EngineError> {
        if pending.is_complete() {
            return Err(EngineError::NotPending {
                id: pending.id().to_string(),
            });
        }

        let processing_time = self.latency.sample();
        info!(
            ticker = pending.ticker(),
            "Starting analysis, will take {:.1}s",
            processing_time.as_secs_f64()
        );

        tokio::time::sleep(processing_time).await;

        let summary = ExecutiveSummary {
            summary: executive_summary_text(pending.company_name()),
            conviction_scores: conviction_scores(),
        };
        let completed = pending.complete(summary, analysis_phases(), Utc::now())?;

        debug!(
            ticker = completed.ticker(),
            score = ?completed.overall_conviction_score(),
            "Analysis complete"
        );
        Ok(completed)
    }
}

fn executive_summary_text(company: &str) -> String {
    format!(
        "Across a four-phase review, {} shows a durable competitive position, \
         a healthy balance sheet and several near-term growth catalysts. \
         Concentration risk in the supply chain is the main concern, \
         offset by capable management and a valuation below peers.",
        company
    )
}

fn conviction_scores() -> Vec<ConvictionScore> {
    vec![
        ConvictionScore::new("Valuation", 8.1),
        ConvictionScore::new("Market Position", 7.5),
        ConvictionScore::new("Financial Health", 8.8),
        ConvictionScore::new("Growth Strategy", 7.2),
        ConvictionScore::new("Moat/Competitive Advantage", 8.5),
        ConvictionScore::new("Management Quality", 7.9),
    ]
}

fn step(title: &str, summary: &str, insights: &[&str]) -> AnalysisStep {
    AnalysisStep {
        title: title.to_string(),
        summary: summary.to_string(),
        insights: insights.iter().map(|s| s.to_string()).collect(),
    }
}

fn analysis_phases() -> Vec<AnalysisPhase> {
    vec![
        AnalysisPhase {
            title: "Phase 1: Foundational Analysis".to_string(),
            steps: vec![
                step(
                    "Market & Industry Analysis",
                    "Sizes the market and maps the industry the company competes in.",
                    &[
                        "Addressable market is expanding faster than GDP.",
                        "Incumbents are slow to modernize their offerings.",
                        "Regulation is trending favorable for the sector.",
                    ],
                ),
                step(
                    "Business Model Deep Dive",
                    "Breaks down how revenue is earned and what it costs to earn it.",
                    &[
                        "Most revenue is recurring.",
                        "Customer acquisition pays back within a year.",
                        "Network effects raise the cost of entry for rivals.",
                    ],
                ),
            ],
        },
        AnalysisPhase {
            title: "Phase 2: Financial & Valuation Assessment".to_string(),
            steps: vec![
                step(
                    "Financial Health & Performance",
                    "Reviews the income statement, balance sheet and cash flows.",
                    &[
                        "Revenue has grown at double digits for five years.",
                        "No long-term debt on the balance sheet.",
                        "Operating margin keeps widening.",
                    ],
                ),
                step(
                    "Valuation Analysis",
                    "Estimates intrinsic value with cash-flow and multiples models.",
                    &[
                        "Discounted cash flow points to meaningful upside.",
                        "Multiples sit below the peer median.",
                        "Long-term growth looks underpriced.",
                    ],
                ),
            ],
        },
        AnalysisPhase {
            title: "Phase 3: Competitive & Strategic Positioning".to_string(),
            steps: vec![
                step(
                    "Moat & Competitive Advantage",
                    "Identifies what protects returns on capital from competition.",
                    &[
                        "Patents and brand form a wide moat.",
                        "Switching costs keep retention high.",
                        "Scale brings a structural cost advantage.",
                    ],
                ),
                step(
                    "Growth Strategy & Catalysts",
                    "Looks at new products, new markets and possible acquisitions.",
                    &[
                        "International markets are largely untapped.",
                        "An upcoming product launch is a clear catalyst.",
                        "Partnerships open new distribution channels.",
                    ],
                ),
            ],
        },
        AnalysisPhase {
            title: "Phase 4: Risk & Management Assessment".to_string(),
            steps: vec![
                step(
                    "Risk Factors",
                    "Lists operational, financial and market risks to the thesis.",
                    &[
                        "Reliance on a single supplier.",
                        "Possible tightening of industry regulation.",
                        "Execution risk in the expansion plan.",
                    ],
                ),
                step(
                    "Management & Governance",
                    "Judges the track record and incentives of leadership and the board.",
                    &[
                        "Leadership has allocated capital well.",
                        "Insider ownership is high.",
                        "The board is experienced and independent.",
                    ],
                ),
            ],
        },
    ]
}
