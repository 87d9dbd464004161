//! cyclebar-prepare: batch cycle-bar preparation
//!
//! Exit status is 1 when any symbol failed, 2 when the batch could not start.

use clap::Parser;
use cyclebar_cli::{init_tracing, run_batch, CliError, PrepareArgs};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = PrepareArgs::parse();
    match prepare(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::from(2)
        }
    }
}

fn prepare(args: &PrepareArgs) -> Result<bool, CliError> {
    let settings = args.settings()?;
    init_tracing(&settings.app);

    println!("🚀 cyclebar-prepare");
    println!("📂 Data: {}", settings.data.data_dir.display());
    println!("⏱️  Period: {}", settings.pipeline.period);

    let summary = run_batch(&settings)?;

    for result in &summary.results {
        match (&result.outcome, &result.error_message) {
            (Some(outcome), _) => println!(
                "  ✅ {:<14} {:?}: {} cycles, {} rows, matrices {:?}{}",
                result.symbol,
                outcome,
                result.settled_cycles,
                result.derived_rows_written,
                result.matrices,
                if result.stale_provisional { " (stale provisional cycle)" } else { "" }
            ),
            (None, message) => println!(
                "  ❌ {:<14} {}",
                result.symbol,
                message.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    println!("\n📊 Execution ID: {}", summary.execution_id);
    println!("⏱️  Total Time: {:.1}s", summary.total_execution_time_seconds);
    println!("✅ Successful: {}", summary.successful_executions);
    println!("❌ Failed: {}", summary.failed_executions);

    if let Some(path) = &args.summary {
        summary.write(path)?;
        println!("📝 Summary: {}", path.display());
    }
    Ok(summary.failed_executions == 0)
}
