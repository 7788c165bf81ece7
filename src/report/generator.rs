//! Markdown report generation.
//!
//! This module renders a single research report as a Markdown
//! document, and the whole library as a compact table for the terminal.

use crate::analysis::{generate_summary_text, LibrarySummary};
use crate::models::{
    AnalysisPhase, AnalysisStep, ConvictionScore, ExecutiveSummary, ResearchReport,
};
use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &ResearchReport) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!(
        "# {} ({})\n\n",
        report.company_name(),
        report.ticker()
    ));

    output.push_str(&generate_metadata_section(report));

    match (report.executive_summary(), report.analysis_phases()) {
        (Some(summary), Some(phases)) => {
            output.push_str(&generate_summary_section(report, summary));
            output.push_str(&generate_phases_section(phases));
        }
        _ => {
            output.push_str("## Analysis\n\n");
            output.push_str(
                "⏳ Analysis in progress. Run `thesisbuilder show` again once it completes.\n\n",
            );
        }
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(report: &ResearchReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Report ID:** `{}`\n", report.id()));
    section.push_str(&format!(
        "- **Status:** {} {}\n",
        report.status().emoji(),
        report.status()
    ));
    section.push_str(&format!(
        "- **Created:** {}\n",
        report.created_at().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(completed_at) = report.completed_at() {
        section.push_str(&format!(
            "- **Completed:** {}\n",
            completed_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        let duration = completed_at - report.created_at();
        section.push_str(&format!(
            "- **Analysis Duration:** {:.1}s\n",
            duration.num_milliseconds() as f64 / 1000.0
        ));
    }
    section.push('\n');

    section
}

/// Generate the executive summary with its score table.
fn generate_summary_section(report: &ResearchReport, summary: &ExecutiveSummary) -> String {
    let mut section = String::new();

    section.push_str("## Executive Summary\n\n");
    if let Some(overall) = report.overall_conviction_score() {
        section.push_str(&format!(
            "**Overall Conviction:** {:.1}/10 {}\n\n",
            overall,
            conviction_badge(overall)
        ));
    }
    section.push_str(&summary.summary);
    section.push_str("\n\n");

    section.push_str(&generate_score_table(&summary.conviction_scores));

    section
}

/// Generate the conviction score table, in display order.
fn generate_score_table(scores: &[ConvictionScore]) -> String {
    let mut table = String::new();

    table.push_str("### Conviction Scores\n\n");
    table.push_str("| Dimension | Score |\n");
    table.push_str("|:---|:---:|\n");
    for score in scores {
        table.push_str(&format!("| {} | {:.1} |\n", score.title, score.score));
    }
    table.push('\n');

    table
}

fn conviction_badge(score: f64) -> &'static str {
    if score >= 8.0 {
        "🟢"
    } else if score >= 6.0 {
        "🟡"
    } else {
        "🔴"
    }
}

/// Generate the phases section.
fn generate_phases_section(phases: &[AnalysisPhase]) -> String {
    let mut section = String::new();

    section.push_str("## Analysis\n\n");
    for phase in phases {
        section.push_str(&format!("### {}\n\n", phase.title));
        for step in &phase.steps {
            section.push_str(&generate_step_block(step));
        }
    }

    section
}

/// Generate a single step block.
fn generate_step_block(step: &AnalysisStep) -> String {
    let mut block = String::new();

    block.push_str(&format!("#### {}\n\n", step.title));
    if !step.summary.is_empty() {
        block.push_str(&format!("{}\n\n", step.summary));
    }
    for insight in &step.insights {
        block.push_str(&format!("- 💡 {}\n", insight));
    }
    if !step.insights.is_empty() {
        block.push('\n');
    }

    block
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by thesisbuilder. Not investment advice.*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ResearchReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

/// Generate the library listing shown by `list`.
pub fn generate_library_table(reports: &[ResearchReport], summary: &LibrarySummary) -> String {
    if reports.is_empty() {
        return "No reports yet. Run `thesisbuilder analyze <TICKER>` to create one.\n"
            .to_string();
    }

    let mut table = String::new();

    table.push_str(&format!(
        "{:<10} {:<8} {:<22} {:<12} {:>6}  {}\n",
        "ID", "TICKER", "COMPANY", "STATUS", "SCORE", "CREATED"
    ));
    for report in reports {
        let score = report
            .overall_conviction_score()
            .map(|s| format!("{:.1}", s))
            .unwrap_or_else(|| "-".to_string());
        table.push_str(&format!(
            "{:<10} {:<8} {:<22} {:<12} {:>6}  {}\n",
            report.short_id(),
            report.ticker(),
            truncate(report.company_name(), 22),
            format!("{} {}", report.status().emoji(), report.status()),
            score,
            report.created_at().format("%Y-%m-%d %H:%M")
        ));
    }
    table.push('\n');
    table.push_str(&generate_summary_text(summary));
    table.push('\n');

    table
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
