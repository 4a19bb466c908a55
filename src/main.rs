//! # Rendezvous IPC Self-Benchmark - Main Entry Point
//!
//! Command-line front end for the rendezvous messaging core. The binary
//! opens an in-process driver, runs the send/receive/reply round-trip
//! and pulse throughput phases, prints a human-readable summary, and
//! writes a JSON report.
//!
//! ## Startup Sequence
//!
//! 1. **Parse arguments**: CLI flags control shape, logging, and output
//! 2. **Initialize logging**: a colorized stdout layer for the summary
//!    plus a detailed file (or stderr) layer for diagnostics
//! 3. **Validate configuration**: CLI args become a `BenchConfig`
//! 4. **Run the benchmark**: both phases execute in-process
//! 5. **Report**: summary to stdout, JSON to the output file

use anyhow::{Context, Result};
use clap::Parser;
use ipc_rendezvous::bench::{BenchConfig, BenchReport, BenchRunner};
use ipc_rendezvous::Args;
use tracing::info;

use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

mod logging;
use logging::ColorizedFormatter;

fn main() -> Result<()> {
    // Parse command-line arguments first, as they control logging behavior.
    let args = Args::parse();

    // Configure logging level based on verbosity flags.
    // - default: INFO
    // -v: DEBUG
    // -vv and more: TRACE
    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // Configure the detailed log layer (file or stderr).
    // The guard must be kept alive for the duration of the program for file logging.
    let guard;
    let detailed_log_layer;

    if let Some("stderr") = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let file_appender = match args.log_file.as_deref() {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path
                    .parent()
                    .unwrap_or_else(|| std::path::Path::new("."));
                let log_filename = log_path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("ipc_rendezvous.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", "ipc_rendezvous.log"),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false) // Disable color codes for the file logger
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    // Clean user-facing output on stdout unless --quiet is present.
    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(detailed_log_layer)
        .with(stdout_log)
        .init();

    // Keep the logging guard alive for the duration of the program.
    let _log_guard = guard;

    info!("Starting rendezvous IPC benchmark");

    let config = BenchConfig::from_args(&args)?;
    let report = BenchRunner::new(config).run()?;

    print_summary(&report);

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.output_file, json)
        .with_context(|| format!("writing results to {:?}", args.output_file))?;
    info!("Results written to {:?}", args.output_file);

    Ok(())
}

/// Human-readable run summary on the user-facing stdout layer
fn print_summary(report: &BenchReport) {
    info!(
        "Round trip: {} messages of {} bytes across {} worker(s)",
        report.round_trip_latency.samples, report.message_size, report.concurrency
    );
    info!(
        "  rate: {:.0} msgs/s, mean latency: {:.1} us, min: {:.1} us, max: {:.1} us",
        report.round_trip_msgs_per_sec,
        report.round_trip_latency.mean_ns / 1_000.0,
        report.round_trip_latency.min_ns as f64 / 1_000.0,
        report.round_trip_latency.max_ns as f64 / 1_000.0,
    );
    for p in &report.round_trip_latency.percentiles {
        info!(
            "  p{:<5}: {:.1} us",
            p.percentile,
            p.value_ns as f64 / 1_000.0
        );
    }
    if let Some(pulse) = &report.pulse_throughput {
        info!(
            "Pulses: {} delivered at {:.0} msgs/s",
            pulse.pulses, pulse.msgs_per_sec
        );
    }
}
