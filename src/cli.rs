//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// thesisbuilder - investment thesis reports for stock tickers
///
/// Submit tickers for analysis, then browse, render and prune the
/// resulting research library.
///
/// Examples:
///   thesisbuilder analyze AAPL MSFT
///   thesisbuilder list --latest
///   thesisbuilder show 3f2a --format json --output aapl.json
///   thesisbuilder delete 3f2a
///   thesisbuilder init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .thesisbuilder.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the research library
    #[arg(long, value_name = "DIR", env = "THESISBUILDER_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Shortest simulated analysis time in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    pub min_latency_ms: Option<u64>,

    /// Longest simulated analysis time in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    pub max_latency_ms: Option<u64>,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start an analysis for each ticker and wait for them to finish
    Analyze {
        /// Ticker symbols, e.g. AAPL MSFT
        #[arg(required = true, value_name = "TICKER")]
        tickers: Vec<String>,
    },

    /// List the research library, newest first
    List {
        /// Only show reports for this ticker
        #[arg(long, value_name = "TICKER")]
        ticker: Option<String>,

        /// Only show the newest report per ticker
        #[arg(long)]
        latest: bool,
    },

    /// Render a single report
    Show {
        /// Report id or a unique prefix of it
        id: String,

        /// Output format (markdown, json)
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,

        /// Write the report to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Remove a report from the library
    Delete {
        /// Report id or a unique prefix of it
        id: String,
    },

    /// Generate a default .thesisbuilder.toml configuration file
    InitConfig,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let (Some(min), Some(max)) = (self.min_latency_ms, self.max_latency_ms) {
            if min > max {
                return Err(format!(
                    "--min-latency-ms ({}) must not exceed --max-latency-ms ({})",
                    min, max
                ));
            }
        }

        match &self.command {
            Command::Analyze { tickers } => {
                if tickers.iter().all(|t| t.trim().is_empty()) {
                    return Err("At least one non-blank ticker is required".to_string());
                }
            }
            Command::Show { id, .. } | Command::Delete { id } => {
                if id.trim().is_empty() {
                    return Err("Report id must not be empty".to_string());
                }
            }
            Command::List { .. } | Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["thesisbuilder"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_parse_analyze() {
        let args = parse(&["analyze", "aapl", "MSFT"]);
        assert_eq!(
            args.command,
            Command::Analyze {
                tickers: vec!["aapl".to_string(), "MSFT".to_string()]
            }
        );
    }

    #[test]
    fn test_analyze_requires_ticker() {
        assert!(Args::try_parse_from(["thesisbuilder", "analyze"]).is_err());
    }

    #[test]
    fn test_parse_show_defaults_to_markdown() {
        let args = parse(&["show", "3f2a"]);
        assert_eq!(
            args.command,
            Command::Show {
                id: "3f2a".to_string(),
                format: OutputFormat::Markdown,
                output: None,
            }
        );

        let args = parse(&["show", "3f2a", "--format", "json", "-o", "out.json"]);
        assert!(matches!(
            args.command,
            Command::Show {
                format: OutputFormat::Json,
                output: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["list", "--latest", "--data-dir", "lib", "--min-latency-ms", "5"]);
        assert_eq!(args.data_dir, Some(PathBuf::from("lib")));
        assert_eq!(args.min_latency_ms, Some(5));
        assert!(matches!(args.command, Command::List { latest: true, .. }));
    }

    #[test]
    fn test_validation_conflicting_options() {
        let args = parse(&["-v", "-q", "list"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_latency_bounds() {
        let args = parse(&["--min-latency-ms", "10", "--max-latency-ms", "5", "list"]);
        assert!(args.validate().is_err());

        let args = parse(&["--min-latency-ms", "5", "--max-latency-ms", "5", "list"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_blank_tickers() {
        let args = parse(&["analyze", " ", ""]);
        assert!(args.validate().is_err());

        let args = parse(&["analyze", " ", "nvda"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["list"]);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
