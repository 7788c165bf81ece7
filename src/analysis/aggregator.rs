//! Report aggregation and statistics.
//!
//! This module computes summary statistics over the research library,
//! such as how many analyses are still running and the average
//! conviction across completed reports.

use crate::models::{round_one_decimal, ReportStatus, ResearchReport};
use std::collections::BTreeMap;

/// Summary of the research library.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibrarySummary {
    /// Total number of reports.
    pub total: usize,
    /// Reports still being generated.
    pub pending: usize,
    /// Reports with a finished analysis.
    pub complete: usize,
    /// Mean overall conviction of complete reports, one decimal.
    pub average_conviction: Option<f64>,
    /// Ticker and score of the highest-rated complete report.
    pub top_rated: Option<(String, f64)>,
}

impl LibrarySummary {
    /// Creates a summary from a list of reports.
    pub fn from_reports(reports: &[ResearchReport]) -> Self {
        let mut summary = Self {
            total: reports.len(),
            ..Self::default()
        };

        let mut scores = Vec::new();
        for report in reports {
            match report.status() {
                ReportStatus::Pending => summary.pending += 1,
                ReportStatus::Complete => summary.complete += 1,
            }
            if let Some(score) = report.overall_conviction_score() {
                scores.push(score);
            }
        }

        if !scores.is_empty() {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            summary.average_conviction = Some(round_one_decimal(mean));
        }

        summary.top_rated = top_rated(reports, 1)
            .into_iter()
            .next()
            .and_then(|r| Some((r.ticker().to_string(), r.overall_conviction_score()?)));

        summary
    }
}

/// Group reports by ticker, newest first within each ticker.
pub fn group_by_ticker(reports: &[ResearchReport]) -> BTreeMap<String, Vec<ResearchReport>> {
    let mut grouped: BTreeMap<String, Vec<ResearchReport>> = BTreeMap::new();

    for report in reports {
        grouped
            .entry(report.ticker().to_string())
            .or_default()
            .push(report.clone());
    }

    for reports in grouped.values_mut() {
        reports.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    }

    grouped
}

/// The newest report for each ticker, newest first overall.
pub fn latest_by_ticker(reports: &[ResearchReport]) -> Vec<ResearchReport> {
    let mut latest: Vec<ResearchReport> = group_by_ticker(reports)
        .into_values()
        .filter_map(|group| group.into_iter().next())
        .collect();

    latest.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    latest
}

/// The `n` complete reports with the highest overall conviction.
pub fn top_rated(reports: &[ResearchReport], n: usize) -> Vec<&ResearchReport> {
    let mut complete: Vec<&ResearchReport> = reports.iter().filter(|r| r.is_complete()).collect();

    complete.sort_by(|a, b| {
        let a = a.overall_conviction_score().unwrap_or_default();
        let b = b.overall_conviction_score().unwrap_or_default();
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    });
    complete.truncate(n);

    complete
}

/// Generate a one-line text summary of the library.
pub fn generate_summary_text(summary: &LibrarySummary) -> String {
    let mut text = format!(
        "{} reports ({} {} complete, {} {} pending)",
        summary.total,
        ReportStatus::Complete.emoji(),
        summary.complete,
        ReportStatus::Pending.emoji(),
        summary.pending
    );

    if let Some(avg) = summary.average_conviction {
        text.push_str(&format!(" | average conviction {:.1}/10", avg));
    }
    if let Some((ticker, score)) = &summary.top_rated {
        text.push_str(&format!(" | top rated {} ({:.1})", ticker, score));
    }

    text
}
