//! thesisbuilder - investment thesis research library
//!
//! A CLI tool that runs simulated stock analyses in the background,
//! keeps the resulting research reports in a persistent library and
//! renders them as Markdown or JSON.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, storage, failed analysis, etc.)
//!   2 - The report passed to `show` or `delete` does not exist

mod analysis;
mod cli;
mod config;
mod engine;
mod error;
mod models;
mod orchestrator;
mod report;
mod store;

use anyhow::{bail, Context, Result};
use cli::{Args, Command, OutputFormat};
use config::{BackendKind, Config, StorageConfig, DEFAULT_CONFIG_FILE};
use engine::MockAnalysisEngine;
use indicatif::{ProgressBar, ProgressStyle};
use models::ResearchReport;
use orchestrator::{AnalysisEvent, GenerationOrchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use store::{FileBackend, MemoryBackend, ReportStore, StorageBackend};
use tokio::sync::broadcast::error::RecvError;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit code when the requested report does not exist.
const EXIT_NOT_FOUND: i32 = 2;

/// Where the active configuration came from.
enum ConfigOrigin {
    Explicit(PathBuf),
    DefaultFile,
    BuiltIn,
    /// The default file exists but could not be used.
    Invalid(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if args.command == Command::InitConfig {
        return handle_init_config(Path::new(DEFAULT_CONFIG_FILE));
    }

    let (mut config, origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(log_level(&args, &config))?;

    info!("thesisbuilder v{}", env!("CARGO_PKG_VERSION"));
    match origin {
        ConfigOrigin::Explicit(path) => info!("Loaded config from: {}", path.display()),
        ConfigOrigin::DefaultFile => info!("Loaded default config from {}", DEFAULT_CONFIG_FILE),
        ConfigOrigin::BuiltIn => debug!("No config file found, using defaults"),
        ConfigOrigin::Invalid(reason) => warn!("Failed to load config: {}", reason),
    }
    debug!("Arguments: {:?}", args);
    debug!("Config: {:?}", config);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .thesisbuilder.toml.
fn handle_init_config(path: &Path) -> Result<()> {
    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            path.display()
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created {} with default settings.", path.display());
    println!("   Edit it to choose the storage backend, data directory and engine latency.");
    Ok(())
}

/// Effective log level: `--quiet` wins, then `--verbose` or `general.verbose`.
fn log_level(args: &Args, config: &Config) -> tracing::Level {
    if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    }
}

/// Initialize logging. `RUST_LOG` takes precedence over the given level.
fn init_logging(level: tracing::Level) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigOrigin::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigOrigin::BuiltIn)),
        Err(e) => Ok((Config::default(), ConfigOrigin::Invalid(format!("{:#}", e)))),
    }
}

/// Dispatch a subcommand. Returns the process exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let store = open_store(&config.storage).await;

    match args.command {
        Command::Analyze { tickers } => {
            let engine = Arc::new(MockAnalysisEngine::new(config.engine.latency()));
            debug!(
                "Simulated analysis time between {:?} and {:?}",
                engine.latency().min(),
                engine.latency().max()
            );
            let orchestrator = GenerationOrchestrator::new(Arc::clone(&store), engine);
            run_analyze(&orchestrator, &tickers, args.quiet).await
        }
        Command::List { ticker, latest } => {
            run_list(&store, ticker.as_deref(), latest);
            Ok(0)
        }
        Command::Show { id, format, output } => {
            run_show(&store, &id, format, output.as_deref())
        }
        Command::Delete { id } => run_delete(&store, &id).await,
        Command::InitConfig => {
            handle_init_config(Path::new(DEFAULT_CONFIG_FILE))?;
            Ok(0)
        }
    }
}

/// Build the configured backend and load the library from it.
async fn open_store(storage: &StorageConfig) -> Arc<ReportStore> {
    let backend: Arc<dyn StorageBackend> = match storage.backend {
        BackendKind::File => {
            let backend = FileBackend::new(storage.data_dir.clone());
            debug!("Library directory: {}", backend.dir().display());
            Arc::new(backend)
        }
        BackendKind::Memory => {
            warn!("Using the memory backend; reports will not outlive this process");
            Arc::new(MemoryBackend::new())
        }
    };

    let store = Arc::new(ReportStore::new(backend, storage.key.clone()));
    store.load().await;
    debug!(key = store.key(), "Library has {} reports", store.len());
    store
}

/// Start one analysis per ticker and report progress until all finish.
async fn run_analyze(
    orchestrator: &GenerationOrchestrator,
    tickers: &[String],
    quiet: bool,
) -> Result<i32> {
    let mut events = orchestrator.subscribe();

    let mut started = Vec::new();
    for ticker in tickers {
        match orchestrator.start_analysis(ticker) {
            Some(id) => started.push(id),
            None => eprintln!("⚠️  Skipping blank ticker {:?}", ticker),
        }
    }
    if started.is_empty() {
        bail!("No analyses were started");
    }

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?,
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };
    progress.set_message(format!("🔬 {} analyses in flight", orchestrator.in_flight()));

    let wait = orchestrator.wait_all();
    tokio::pin!(wait);

    loop {
        tokio::select! {
            _ = &mut wait => break,
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&progress, &event);
                    progress.set_message(format!(
                        "🔬 {} analyses in flight",
                        orchestrator.in_flight()
                    ));
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} progress events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    // Events sent just before the last task finished.
    while let Ok(event) = events.try_recv() {
        print_event(&progress, &event);
    }
    progress.finish_and_clear();

    let store = orchestrator.store();
    store.flush().await;

    let tally = Tally::from_store(store, &started);

    println!("\n📊 Analysis Summary:");
    println!("   Started: {}", started.len());
    println!("   ✅ Completed: {}", tally.completed);
    if tally.failed > 0 {
        println!("   ❌ Failed: {}", tally.failed);
    }
    if tally.discarded > 0 {
        println!("   🗑️  Discarded: {}", tally.discarded);
    }
    for id in &started {
        if let Some(report) = store.get(id) {
            println!(
                "   {} {} ({})",
                report.status().emoji(),
                report.ticker(),
                report.short_id()
            );
        }
    }

    Ok(if tally.failed > 0 { 1 } else { 0 })
}

/// Final state of the analyses started by one `analyze` run.
#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    completed: usize,
    failed: usize,
    discarded: usize,
}

impl Tally {
    /// Count outcomes from the library once every analysis has finished.
    ///
    /// A report still pending at that point failed; a missing one was
    /// deleted while it ran.
    fn from_store(store: &ReportStore, started: &[String]) -> Self {
        let mut tally = Self::default();
        for id in started {
            match store.get(id) {
                Some(report) if report.is_complete() => tally.completed += 1,
                Some(_) => tally.failed += 1,
                None => tally.discarded += 1,
            }
        }
        tally
    }
}

fn print_event(progress: &ProgressBar, event: &AnalysisEvent) {
    let icon = match event {
        AnalysisEvent::Started { .. } => "⏳",
        AnalysisEvent::Completed { .. } => "✅",
        AnalysisEvent::Failed { .. } => "❌",
        AnalysisEvent::Discarded { .. } => "🗑️ ",
    };
    progress.println(format!("{} {}", icon, event));
}

fn run_list(store: &ReportStore, ticker: Option<&str>, latest: bool) {
    let mut reports = store.list();

    if let Some(ticker) = ticker {
        reports = analysis::group_by_ticker(&reports)
            .remove(&ticker.trim().to_uppercase())
            .unwrap_or_default();
    }
    if latest {
        reports = analysis::latest_by_ticker(&reports);
    }

    if reports.is_empty() && !store.is_empty() {
        println!("No reports match the given filters.");
        return;
    }

    let summary = analysis::LibrarySummary::from_reports(&reports);
    print!("{}", report::generate_library_table(&reports, &summary));
}

fn run_show(
    store: &ReportStore,
    id: &str,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<i32> {
    let Some(found) = resolve_report(store, id)? else {
        eprintln!("❌ No report matches id '{}'", id);
        return Ok(EXIT_NOT_FOUND);
    };

    let content = match format {
        OutputFormat::Json => report::generate_json_report(&found)?,
        OutputFormat::Markdown => report::generate_markdown_report(&found),
    };

    match output {
        Some(path) => {
            report::write_report(&content, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "✅ {} report saved to: {}",
                found.ticker(),
                path.display()
            );
        }
        None => println!("{}", content),
    }

    Ok(0)
}

async fn run_delete(store: &ReportStore, id: &str) -> Result<i32> {
    let Some(found) = resolve_report(store, id)? else {
        eprintln!("❌ No report matches id '{}'", id);
        return Ok(EXIT_NOT_FOUND);
    };

    store.delete(found.id());
    store.flush().await;

    info!(id = found.id(), ticker = found.ticker(), "Report deleted");
    println!("🗑️  Deleted {} report {}", found.ticker(), found.short_id());
    Ok(0)
}

/// Find the report whose id is `id` or starts with it.
fn resolve_report(store: &ReportStore, id: &str) -> Result<Option<ResearchReport>> {
    let id = id.trim();
    if let Some(exact) = store.get(id) {
        return Ok(Some(exact));
    }

    let mut matches = store.find_by_prefix(id);
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        n => bail!(
            "Id prefix '{}' matches {} reports; use more characters",
            id,
            n
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AnalysisEngine, LatencyRange};
    use crate::error::EngineError;
    use clap::Parser;

    async fn memory_store() -> Arc<ReportStore> {
        let store = Arc::new(ReportStore::new(
            Arc::new(MemoryBackend::new()),
            store::DEFAULT_STORAGE_KEY,
        ));
        store.load().await;
        store
    }

    /// Fails for one ticker and completes every other one immediately.
    struct FailOneEngine {
        failing: &'static str,
    }

    #[async_trait::async_trait]
    impl AnalysisEngine for FailOneEngine {
        async fn generate(&self, pending: ResearchReport) -> Result<ResearchReport, EngineError> {
            if pending.ticker() == self.failing {
                return Err(EngineError::Backend("timeout".to_string()));
            }
            MockAnalysisEngine::new(LatencyRange::fixed(Duration::ZERO))
                .generate(pending)
                .await
        }
    }

    #[tokio::test]
    async fn test_resolve_report_by_prefix() {
        let store = memory_store().await;
        let report = ResearchReport::pending("AAPL").unwrap();
        store.add(report.clone());

        let found = resolve_report(&store, &report.id()[..6]).unwrap();
        assert_eq!(found.map(|r| r.id().to_string()), Some(report.id().to_string()));
        assert!(resolve_report(&store, "zzz").unwrap().is_none());
        // Every id matches the empty prefix.
        store.add(ResearchReport::pending("MSFT").unwrap());
        assert!(resolve_report(&store, "").is_err());
    }

    #[tokio::test]
    async fn test_show_missing_report_exit_code() {
        let store = memory_store().await;
        let code = run_show(&store, "missing", OutputFormat::Markdown, None).unwrap();
        assert_eq!(code, EXIT_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_show_writes_output_file() {
        let store = memory_store().await;
        let report = models::tests::completed("AAPL");
        store.add(report.clone());
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("aapl.json");

        let code = run_show(&store, report.id(), OutputFormat::Json, Some(&path)).unwrap();

        assert_eq!(code, 0);
        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: ResearchReport = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, report);
    }

    #[tokio::test]
    async fn test_delete_removes_report() {
        let backend = MemoryBackend::new();
        let store = ReportStore::new(Arc::new(backend.clone()), "lib");
        store.load().await;
        let report = ResearchReport::pending("NVDA").unwrap();
        store.add(report.clone());

        assert_eq!(run_delete(&store, report.id()).await.unwrap(), 0);
        assert!(store.is_empty());
        assert_eq!(backend.record("lib"), Some("[]".to_string()));
        assert_eq!(run_delete(&store, report.id()).await.unwrap(), EXIT_NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_analyze_completes_all() {
        let store = memory_store().await;
        let engine = Arc::new(MockAnalysisEngine::default());
        let orchestrator = GenerationOrchestrator::new(Arc::clone(&store), engine);

        let tickers = vec!["aapl".to_string(), " ".to_string(), "msft".to_string()];
        let code = run_analyze(&orchestrator, &tickers, true).await.unwrap();

        assert_eq!(code, 0);
        assert_eq!(store.len(), 2);
        assert!(store.list().iter().all(|r| r.is_complete()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_analyze_counts_failure_among_many_tickers() {
        let store = memory_store().await;
        let engine = Arc::new(FailOneEngine { failing: "T0" });
        let orchestrator = GenerationOrchestrator::new(Arc::clone(&store), engine);

        // Far more events than the broadcast channel buffers.
        let tickers: Vec<String> = (0..200).map(|i| format!("T{}", i)).collect();
        let code = run_analyze(&orchestrator, &tickers, true).await.unwrap();

        assert_eq!(code, 1);
        let started: Vec<String> = store.list().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(
            Tally::from_store(&store, &started),
            Tally {
                completed: 199,
                failed: 1,
                discarded: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_tally_counts_deleted_reports_as_discarded() {
        let store = memory_store().await;
        let done = models::tests::completed("AAPL");
        let pending = ResearchReport::pending("MSFT").unwrap();
        store.add(done.clone());
        store.add(pending.clone());

        let started = vec![
            done.id().to_string(),
            pending.id().to_string(),
            "gone".to_string(),
        ];
        assert_eq!(
            Tally::from_store(&store, &started),
            Tally {
                completed: 1,
                failed: 1,
                discarded: 1,
            }
        );
    }

    #[test]
    fn test_log_level_from_config() {
        let args = Args::parse_from(["thesisbuilder", "list"]);
        let mut config = Config::default();
        assert_eq!(log_level(&args, &config), tracing::Level::INFO);

        config.general.verbose = true;
        assert_eq!(log_level(&args, &config), tracing::Level::DEBUG);

        let quiet = Args::parse_from(["thesisbuilder", "--quiet", "list"]);
        assert_eq!(log_level(&quiet, &config), tracing::Level::ERROR);
    }

    #[test]
    fn test_init_config_writes_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        handle_init_config(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }
}
