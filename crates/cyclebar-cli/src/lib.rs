//! Batch preparation of cycle bars and feature matrices
//!
//! One rayon task per symbol, each with its own [`FileStore`] handle; series
//! never share mutable state, so tasks need no coordination beyond the
//! optional fail-fast flag.

use chrono::Utc;
use clap::Parser;
use cyclebar_config::{AppConfig, CliConfigMerge, LogLevel, Settings, SettingsError};
use cyclebar_core::{
    AnomalySummary, Orchestrator, PipelineError, RunMode, RunOutcome, RunReport, StoreError,
};
use cyclebar_io::FileStore;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to write summary {path}: {source}")]
    Summary {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No symbols configured and none found under {0}")]
    NoSymbols(String),
}

#[derive(Parser, Debug, Default)]
#[command(
    name = "cyclebar-prepare",
    about = "Resample, detect cycles and emit feature matrices for a batch of symbols",
    long_about = "
Runs the cycle-bar pipeline for every configured symbol in parallel.
Each symbol resumes from its checkpoint when one exists (incremental run),
otherwise its whole history is processed (initial run).

Settings are layered: defaults < cyclebar.toml (or --config) < CYCLEBAR__* env < flags.

Examples:
  cyclebar-prepare --data-dir ./data --symbols 000001.XSHE,600000.XSHG
  cyclebar-prepare --config prod.toml --period 60m --workers 8 --summary run.json
  CYCLEBAR__PIPELINE__MIN_SWING_BARS=5 cyclebar-prepare --models cycle_length
",
    version
)]
pub struct PrepareArgs {
    /// Configuration file (TOML); `cyclebar.toml` in the working directory otherwise
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store root directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Symbols to process (comma separated); all symbols in the store when empty
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Target period (`15m`, `60m`, `day`, ...)
    #[arg(long)]
    pub period: Option<String>,

    /// Only emit these models (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub models: Vec<String>,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Stop scheduling symbols after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,

    /// Write the JSON execution summary here
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

fn parse_log_level(text: &str) -> Result<LogLevel, String> {
    match text.to_ascii_lowercase().as_str() {
        "error" => Ok(LogLevel::Error),
        "warn" => Ok(LogLevel::Warn),
        "info" => Ok(LogLevel::Info),
        "debug" => Ok(LogLevel::Debug),
        "trace" => Ok(LogLevel::Trace),
        other => Err(format!("unknown log level '{other}'")),
    }
}

impl CliConfigMerge for PrepareArgs {
    fn merge_into_config(&self, config: &mut Settings) {
        if let Some(dir) = &self.data_dir {
            config.data.data_dir = dir.clone();
        }
        if !self.symbols.is_empty() {
            config.data.symbols = self.symbols.clone();
        }
        if let Some(period) = &self.period {
            config.pipeline.period = period.clone();
        }
        if let Some(workers) = self.workers {
            config.app.worker_threads = Some(workers);
        }
        if self.fail_fast {
            config.app.fail_fast = true;
        }
        if let Some(level) = self.log_level {
            config.app.log_level = level;
        }
    }
}

impl PrepareArgs {
    /// Settings from file/env with these flags applied on top
    pub fn settings(&self) -> Result<Settings, CliError> {
        let loaded = match &self.config {
            Some(path) => Settings::load_from_file(path)?,
            None => Settings::load()?,
        };
        let mut settings = loaded.merge_cli_args(self);
        if !self.models.is_empty() {
            settings.select_models(&self.models)?;
        }
        Ok(settings)
    }
}

/// Install the global subscriber; `RUST_LOG` wins over the configured level
pub fn init_tracing(app: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(app.log_directive()));
    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Per-symbol line of the execution summary
#[derive(Debug, Clone, Serialize)]
pub struct SymbolResult {
    pub symbol: String,
    pub success: bool,
    pub mode: Option<RunMode>,
    pub outcome: Option<RunOutcome>,
    pub base_bars: usize,
    pub period_bars: usize,
    pub settled_cycles: usize,
    pub derived_rows_written: usize,
    pub matrices: BTreeMap<String, usize>,
    pub stale_provisional: bool,
    pub anomalies: AnomalySummary,
    pub error_message: Option<String>,
    pub processing_time_seconds: f64,
}

impl SymbolResult {
    fn from_report(symbol: &str, report: RunReport, elapsed: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            success: true,
            mode: Some(report.mode),
            outcome: Some(report.outcome),
            base_bars: report.base_bars,
            period_bars: report.period_bars,
            settled_cycles: report.settled_cycles,
            derived_rows_written: report.derived_rows_written,
            matrices: report.matrices,
            stale_provisional: report.stale_provisional,
            anomalies: report.anomalies,
            error_message: None,
            processing_time_seconds: elapsed,
        }
    }

    fn failed(symbol: &str, message: String, elapsed: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            success: false,
            mode: None,
            outcome: None,
            base_bars: 0,
            period_bars: 0,
            settled_cycles: 0,
            derived_rows_written: 0,
            matrices: BTreeMap::new(),
            stale_provisional: false,
            anomalies: AnomalySummary::default(),
            error_message: Some(message),
            processing_time_seconds: elapsed,
        }
    }
}

/// Whole-batch execution summary
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub execution_id: String,
    pub execution_timestamp: String,
    pub data_dir: PathBuf,
    pub period: String,
    pub workers: usize,
    pub total_symbols: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub total_execution_time_seconds: f64,
    pub results: Vec<SymbolResult>,
}

impl BatchSummary {
    pub fn write(&self, path: &Path) -> Result<(), CliError> {
        let to_error = |source| CliError::Summary {
            path: path.display().to_string(),
            source,
        };
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| to_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        std::fs::write(path, json).map_err(to_error)
    }
}

/// Run one symbol against its own store handle
pub fn run_symbol(orchestrator: &Orchestrator, data_dir: &Path, symbol: &str) -> SymbolResult {
    let started = Instant::now();
    let mut store = FileStore::new(data_dir);
    match orchestrator.run(&mut store, symbol) {
        Ok(report) => SymbolResult::from_report(symbol, report, started.elapsed().as_secs_f64()),
        Err(e) => {
            error!(symbol, error = %e, "run failed");
            SymbolResult::failed(symbol, e.to_string(), started.elapsed().as_secs_f64())
        }
    }
}

/// Run every configured symbol on a dedicated worker pool
pub fn run_batch(settings: &Settings) -> Result<BatchSummary, CliError> {
    let started = Instant::now();
    let execution_timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let execution_id = format!("prepare_{}", Utc::now().format("%Y%m%d_%H%M%S"));

    let orchestrator = Orchestrator::new(settings.pipeline_params()?)?;
    let data_dir = settings.data.data_dir.clone();

    let mut symbols = settings.data.normalized_symbols();
    if symbols.is_empty() {
        symbols = FileStore::new(&data_dir).symbols()?;
    }
    if symbols.is_empty() {
        return Err(CliError::NoSymbols(data_dir.display().to_string()));
    }

    let workers = settings.app.worker_threads();
    info!(symbols = symbols.len(), workers, period = %settings.pipeline.period, "starting batch");

    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
    let stop = AtomicBool::new(false);
    let fail_fast = settings.app.fail_fast;

    let results: Vec<SymbolResult> = pool.install(|| {
        symbols
            .par_iter()
            .map(|symbol| {
                if stop.load(Ordering::Relaxed) {
                    return SymbolResult::failed(
                        symbol,
                        "skipped after an earlier failure".to_string(),
                        0.0,
                    );
                }
                let result = run_symbol(&orchestrator, &data_dir, symbol);
                if fail_fast && !result.success {
                    stop.store(true, Ordering::Relaxed);
                }
                result
            })
            .collect()
    });

    let successful_executions = results.iter().filter(|r| r.success).count();
    Ok(BatchSummary {
        execution_id,
        execution_timestamp,
        data_dir,
        period: settings.pipeline.period.clone(),
        workers,
        total_symbols: results.len(),
        successful_executions,
        failed_executions: results.len() - successful_executions,
        total_execution_time_seconds: started.elapsed().as_secs_f64(),
        results,
    })
}
