//! CareForge: patient ETL merge pipeline with VIP segmentation
//!
//! This is the main entrypoint that parses arguments, runs the pipeline stages
//! and reports the outcome.

use anyhow::Result;
use clap::Parser;
use careforge::logging::init_logging;
use careforge::{run_etl, run_pipeline, Args, RunReport, StageFailure};
use std::process;
use std::time::Instant;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose, args.log_json);

    let config = args.to_config()?;

    if args.verbose {
        println!("CareForge - Patient ETL and VIP Segmentation");
        println!("============================================\n");
        println!("  Feedback source: {}", config.feedback_path.display());
        println!("  Patient source: {}", config.patients_path.display());
        println!("  Doctor source: {}", config.doctors_path.display());
        println!("  Join key: {}", config.join_key);
        if !args.etl_only {
            println!("  Seed: {}", config.segmentation.seed);
            println!("  Restarts: {}", config.segmentation.n_runs);
            println!("  Max iterations: {}", config.segmentation.max_iters);
            println!("  Tolerance: {}", config.segmentation.tolerance);
        }
        println!();
    }

    let start_time = Instant::now();

    let outcome = if args.etl_only {
        run_etl(&config).map(|(_, report)| report)
    } else {
        run_pipeline(&config)
    };

    match outcome {
        Ok(report) => {
            print_success(&report, &args, start_time);
            Ok(())
        }
        Err(failure) => {
            print_failure(&failure);
            process::exit(1);
        }
    }
}

fn print_success(report: &RunReport, args: &Args, start_time: Instant) {
    println!("{}", report);
    println!("=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    println!("Warehouse table saved to: {}", args.warehouse.display());
    if !args.etl_only {
        println!("Enriched export saved to: {}", args.export.display());
    }
    if let Some(path) = &args.quarantine {
        println!("Issue log saved to: {}", path.display());
    }
}

fn print_failure(failure: &StageFailure) {
    tracing::error!(stage = %failure.stage, error = %failure.error, "pipeline failed");

    eprintln!("=== Pipeline Failed ===");
    eprintln!("Stage: {}", failure.stage);
    eprintln!("Error: {}", failure.error);
    let mut source = std::error::Error::source(&failure.error);
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
    eprintln!();
    eprintln!("{}", failure.report);
}
