//! Data models for research reports.
//!
//! A `ResearchReport` is the aggregate root. Its lifecycle lives in a
//! private [`ReportState`], so a report is either entirely pending-shaped or
//! entirely complete-shaped; the only way from one to the other is
//! [`ResearchReport::complete`].

use crate::error::ModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lowest conviction score allowed.
pub const MIN_SCORE: f64 = 0.0;
/// Highest conviction score allowed.
pub const MAX_SCORE: f64 = 10.0;

/// Lifecycle status of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// The analysis is still running.
    Pending,
    /// The analysis finished and every completion field is present.
    Complete,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "Pending"),
            ReportStatus::Complete => write!(f, "Complete"),
        }
    }
}

impl ReportStatus {
    /// Returns an emoji representation of the status.
    pub fn emoji(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "⏳",
            ReportStatus::Complete => "✅",
        }
    }
}

/// A single conviction rating shown in the executive summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvictionScore {
    /// Investment dimension being rated.
    pub title: String,
    /// Rating between 0.0 and 10.0.
    pub score: f64,
}

impl ConvictionScore {
    pub fn new(title: impl Into<String>, score: f64) -> Self {
        Self {
            title: title.into(),
            score,
        }
    }
}

/// One step inside an analysis phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStep {
    pub title: String,
    pub summary: String,
    pub insights: Vec<String>,
}

/// One of the phases of the investment thesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPhase {
    pub title: String,
    pub steps: Vec<AnalysisStep>,
}

/// Headline text and per-dimension scores, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutiveSummary {
    pub summary: String,
    pub conviction_scores: Vec<ConvictionScore>,
}

/// Container for the analysis phases (kept nested to match the stored layout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub phases: Vec<AnalysisPhase>,
}

/// Fields that exist only once a report is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub completed_at: DateTime<Utc>,
    pub overall_conviction_score: f64,
    pub executive_summary: ExecutiveSummary,
    pub analysis: Analysis,
}

/// Lifecycle state, serialized flat into the report with a `status` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ReportState {
    Pending,
    Complete(Completion),
}

/// A research report for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchReport {
    id: String,
    ticker: String,
    company_name: String,
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    state: ReportState,
}

impl ResearchReport {
    /// Creates a pending report for `ticker`.
    ///
    /// The ticker is trimmed and uppercased; returns `None` if nothing is
    /// left. Anything else is accepted as an opaque symbol.
    pub fn pending(ticker: &str) -> Option<Self> {
        Self::pending_at(ticker, Utc::now())
    }

    /// Creates a pending report with an explicit creation time.
    pub fn pending_at(ticker: &str, created_at: DateTime<Utc>) -> Option<Self> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return None;
        }

        Some(Self {
            id: Uuid::new_v4().to_string(),
            company_name: format!("{} Analysis", ticker),
            ticker,
            created_at,
            state: ReportState::Pending,
        })
    }

    /// Produces the complete version of this report.
    ///
    /// Identity fields are carried over unchanged and the overall conviction
    /// score is derived from `summary.conviction_scores`.
    pub fn complete(
        &self,
        summary: ExecutiveSummary,
        phases: Vec<AnalysisPhase>,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        if self.is_complete() {
            return Err(ModelError::AlreadyComplete {
                id: self.id.clone(),
            });
        }

        validate_phases(&phases)?;
        let overall = overall_conviction(&summary.conviction_scores)?;

        Ok(Self {
            id: self.id.clone(),
            ticker: self.ticker.clone(),
            company_name: self.company_name.clone(),
            created_at: self.created_at,
            state: ReportState::Complete(Completion {
                completed_at,
                overall_conviction_score: overall,
                executive_summary: summary,
                analysis: Analysis { phases },
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn company_name(&self) -> &str {
        &self.company_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> ReportStatus {
        match self.state {
            ReportState::Pending => ReportStatus::Pending,
            ReportState::Complete(_) => ReportStatus::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status() == ReportStatus::Complete
    }

    /// Completion fields, present iff the report is complete.
    pub fn completion(&self) -> Option<&Completion> {
        match &self.state {
            ReportState::Pending => None,
            ReportState::Complete(completion) => Some(completion),
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completion().map(|c| c.completed_at)
    }

    pub fn overall_conviction_score(&self) -> Option<f64> {
        self.completion().map(|c| c.overall_conviction_score)
    }

    pub fn executive_summary(&self) -> Option<&ExecutiveSummary> {
        self.completion().map(|c| &c.executive_summary)
    }

    pub fn analysis_phases(&self) -> Option<&[AnalysisPhase]> {
        self.completion().map(|c| c.analysis.phases.as_slice())
    }

    /// True when both values describe the same report with the same
    /// immutable fields.
    pub fn same_identity(&self, other: &ResearchReport) -> bool {
        self.id == other.id
            && self.ticker == other.ticker
            && self.company_name == other.company_name
            && self.created_at == other.created_at
    }

    /// First eight characters of the id, for display.
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

/// Mean of the scores rounded to one decimal place.
pub fn overall_conviction(scores: &[ConvictionScore]) -> Result<f64, ModelError> {
    if scores.is_empty() {
        return Err(ModelError::NoConvictionScores);
    }

    if let Some(bad) = scores
        .iter()
        .find(|s| !(MIN_SCORE..=MAX_SCORE).contains(&s.score))
    {
        return Err(ModelError::ScoreOutOfRange {
            title: bad.title.clone(),
            score: bad.score,
        });
    }

    let mean = scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64;
    Ok(round_one_decimal(mean))
}

/// Rounds to one decimal place.
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn validate_phases(phases: &[AnalysisPhase]) -> Result<(), ModelError> {
    if phases.is_empty() {
        return Err(ModelError::NoPhases);
    }

    for phase in phases {
        if phase.steps.is_empty() {
            return Err(ModelError::EmptyPhase(phase.title.clone()));
        }
        if let Some(step) = phase.steps.iter().find(|s| s.insights.is_empty()) {
            return Err(ModelError::EmptyStep(step.title.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn sample_summary() -> ExecutiveSummary {
        ExecutiveSummary {
            summary: "Solid business.".to_string(),
            conviction_scores: vec![
                ConvictionScore::new("Valuation", 8.1),
                ConvictionScore::new("Market Position", 7.5),
                ConvictionScore::new("Financial Health", 8.8),
            ],
        }
    }

    pub(crate) fn sample_phases() -> Vec<AnalysisPhase> {
        vec![AnalysisPhase {
            title: "Phase 1".to_string(),
            steps: vec![AnalysisStep {
                title: "Step 1".to_string(),
                summary: "Looks at the market.".to_string(),
                insights: vec!["Growing market.".to_string()],
            }],
        }]
    }

    pub(crate) fn completed(ticker: &str) -> ResearchReport {
        ResearchReport::pending(ticker)
            .unwrap()
            .complete(sample_summary(), sample_phases(), Utc::now())
            .unwrap()
    }

    #[test]
    fn test_pending_normalizes_ticker() {
        let report = ResearchReport::pending("  aapl ").unwrap();
        assert_eq!(report.ticker(), "AAPL");
        assert_eq!(report.company_name(), "AAPL Analysis");
        assert_eq!(report.status(), ReportStatus::Pending);
        assert!(report.completion().is_none());
        assert!(Uuid::parse_str(report.id()).is_ok());
    }

    #[test]
    fn test_pending_rejects_blank_ticker() {
        assert!(ResearchReport::pending("").is_none());
        assert!(ResearchReport::pending("   \t").is_none());
    }

    #[test]
    fn test_pending_ids_are_unique() {
        let a = ResearchReport::pending("AAPL").unwrap();
        let b = ResearchReport::pending("AAPL").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_complete_keeps_identity_and_derives_score() {
        let pending = ResearchReport::pending("msft").unwrap();
        let done = pending
            .complete(sample_summary(), sample_phases(), Utc::now())
            .unwrap();

        assert!(done.same_identity(&pending));
        assert_eq!(done.status(), ReportStatus::Complete);
        // (8.1 + 7.5 + 8.8) / 3 = 8.1333...
        assert!((done.overall_conviction_score().unwrap() - 8.1).abs() < 1e-9);
        assert!(done.completed_at().is_some());
        assert_eq!(done.analysis_phases().unwrap().len(), 1);
    }

    #[test]
    fn test_complete_twice_is_rejected() {
        let done = completed("AAPL");
        let err = done
            .complete(sample_summary(), sample_phases(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ModelError::AlreadyComplete { .. }));
    }

    #[test]
    fn test_complete_validates_content() {
        let pending = ResearchReport::pending("AAPL").unwrap();

        let mut summary = sample_summary();
        summary.conviction_scores.clear();
        assert_eq!(
            pending.complete(summary, sample_phases(), Utc::now()),
            Err(ModelError::NoConvictionScores)
        );

        let mut summary = sample_summary();
        summary.conviction_scores.push(ConvictionScore::new("Hype", 10.5));
        assert!(matches!(
            pending.complete(summary, sample_phases(), Utc::now()),
            Err(ModelError::ScoreOutOfRange { .. })
        ));

        assert_eq!(
            pending.complete(sample_summary(), Vec::new(), Utc::now()),
            Err(ModelError::NoPhases)
        );

        let mut phases = sample_phases();
        phases[0].steps[0].insights.clear();
        assert_eq!(
            pending.complete(sample_summary(), phases, Utc::now()),
            Err(ModelError::EmptyStep("Step 1".to_string()))
        );
    }

    #[test]
    fn test_overall_conviction_rounding() {
        let scores = vec![
            ConvictionScore::new("a", 8.1),
            ConvictionScore::new("b", 7.5),
            ConvictionScore::new("c", 8.8),
            ConvictionScore::new("d", 7.2),
            ConvictionScore::new("e", 8.5),
            ConvictionScore::new("f", 7.9),
        ];
        assert!((overall_conviction(&scores).unwrap() - 8.0).abs() < 1e-9);
        assert!((round_one_decimal(7.25) - 7.3).abs() < 1e-9);
        assert!((round_one_decimal(6.04) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_pending_wire_shape() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let report = ResearchReport::pending_at("aapl", created).unwrap();
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["status"], "pending");
        assert_eq!(value["ticker"], "AAPL");
        assert_eq!(value["companyName"], "AAPL Analysis");
        assert_eq!(value["createdAt"], "2024-05-01T12:00:00Z");
        assert!(value.get("completedAt").is_none());
        assert!(value.get("overallConvictionScore").is_none());
        assert!(value.get("executiveSummary").is_none());
        assert!(value.get("analysis").is_none());
    }

    #[test]
    fn test_complete_wire_shape() {
        let value = serde_json::to_value(completed("AAPL")).unwrap();

        assert_eq!(value["status"], "complete");
        assert!(value["completedAt"].is_string());
        assert!(value["overallConvictionScore"].is_f64());
        assert!(value["executiveSummary"]["convictionScores"].is_array());
        assert!(value["analysis"]["phases"].is_array());
    }

    #[test]
    fn test_deserialize_stored_reports() {
        let json = r#"[
            {
                "id": "3f0c4d0e-0000-4000-8000-000000000001",
                "ticker": "AAPL",
                "companyName": "AAPL Analysis",
                "status": "pending",
                "createdAt": "2024-05-01T12:00:00.000Z"
            },
            {
                "id": "3f0c4d0e-0000-4000-8000-000000000002",
                "ticker": "MSFT",
                "companyName": "MSFT Analysis",
                "status": "complete",
                "createdAt": "2024-04-30T09:15:00.000Z",
                "completedAt": "2024-04-30T09:15:07.412Z",
                "overallConvictionScore": 8,
                "executiveSummary": {
                    "summary": "Strong.",
                    "convictionScores": [{ "title": "Valuation", "score": 8 }]
                },
                "analysis": {
                    "phases": [{
                        "title": "Phase 1",
                        "steps": [{ "title": "S", "summary": "s", "insights": ["i"] }]
                    }]
                }
            }
        ]"#;

        let reports: Vec<ResearchReport> = serde_json::from_str(json).unwrap();
        assert_eq!(reports[0].status(), ReportStatus::Pending);
        assert_eq!(reports[1].status(), ReportStatus::Complete);
        assert_eq!(reports[1].overall_conviction_score(), Some(8.0));
        assert_eq!(reports[1].executive_summary().unwrap().summary, "Strong.");
    }

    #[test]
    fn test_partial_complete_shape_is_rejected() {
        let json = r#"{
            "id": "x",
            "ticker": "AAPL",
            "companyName": "AAPL Analysis",
            "status": "complete",
            "createdAt": "2024-05-01T12:00:00Z"
        }"#;
        assert!(serde_json::from_str::<ResearchReport>(json).is_err());
    }

    #[test]
    fn test_round_trip() {
        let report = completed("NVDA");
        let json = serde_json::to_string(&report).unwrap();
        let back: ResearchReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ReportStatus::Pending.to_string(), "Pending");
        assert_eq!(ReportStatus::Complete.emoji(), "✅");
    }
}
