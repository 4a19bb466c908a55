//! # Command-Line Interface Module
//!
//! Argument parsing for the rendezvous self-benchmark binary, built on
//! the `clap` derive API. The CLI controls the message shape, the number
//! of round trips, worker concurrency, and where results and logs go;
//! [`crate::bench::BenchConfig::from_args`] validates and converts the
//! parsed arguments into the internal benchmark configuration.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Round-trip latency with defaults (1 KiB messages, 10k round trips)
//! ipc-rendezvous
//!
//! # Small messages, four senders, custom output file
//! ipc-rendezvous -s 64 -c 4 -o results.json
//!
//! # Verbose diagnostics on stderr, no stdout summary
//! ipc-rendezvous -vv --quiet
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Self-benchmark for the QNX-style rendezvous messaging core
///
/// Spawns an echo receiver and one or more sender workers over the
/// in-process driver, measures send/receive/reply round-trip latency
/// and pulse throughput, and writes a JSON report.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Message payload size in bytes
    ///
    /// Larger payloads stress the gather/copy paths; small ones expose
    /// the raw rendezvous overhead.
    #[arg(short = 's', long, default_value_t = crate::defaults::MESSAGE_SIZE)]
    pub message_size: usize,

    /// Round trips to measure per sender worker
    #[arg(short = 'i', long, default_value_t = crate::defaults::MSG_COUNT)]
    pub msg_count: usize,

    /// Number of concurrent sender workers
    ///
    /// Defaults to one; 0 expands to one worker per CPU core.
    #[arg(short = 'c', long, default_value_t = 1)]
    pub concurrency: usize,

    /// Warmup round trips per worker before measurement begins
    #[arg(short = 'w', long, default_value_t = crate::defaults::WARMUP_ITERATIONS)]
    pub warmup_iterations: usize,

    /// Pulses to send in the throughput phase (0 skips the phase)
    #[arg(long, default_value_t = 100_000)]
    pub pulses: usize,

    /// Output file for results (JSON format)
    #[arg(short = 'o', long, default_value = crate::defaults::OUTPUT_FILE)]
    pub output_file: PathBuf,

    /// Percentiles to calculate for latency metrics
    #[arg(long, default_values_t = vec![50.0, 95.0, 99.0, 99.9])]
    pub percentiles: Vec<f64>,

    /// Silence the user-facing summary on stdout
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Increase diagnostic log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Detailed log destination: a file path, or "stderr"
    #[arg(long)]
    pub log_file: Option<String>,
}

impl Default for Args {
    /// Defaults matching the clap definitions, for tests and embedding
    fn default() -> Self {
        Self {
            message_size: crate::defaults::MESSAGE_SIZE,
            msg_count: crate::defaults::MSG_COUNT,
            concurrency: 1,
            warmup_iterations: crate::defaults::WARMUP_ITERATIONS,
            pulses: 100_000,
            output_file: PathBuf::from(crate::defaults::OUTPUT_FILE),
            percentiles: vec![50.0, 95.0, 99.0, 99.9],
            quiet: false,
            verbose: 0,
            log_file: None,
        }
    }
}
