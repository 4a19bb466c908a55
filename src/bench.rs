//! # Self-Benchmark Engine
//!
//! Measures the rendezvous core against itself: an echo receiver thread
//! serves a channel while sender workers drive send/receive/reply round
//! trips through it, each worker recording per-message latency into a
//! private HDR recorder. A second phase measures fire-and-forget pulse
//! throughput through the same channel.
//!
//! ## Execution Lifecycle
//!
//! 1. **Setup**: open a driver session, create the echo channel
//! 2. **Warmup**: unmeasured round trips stabilize caches and paths
//! 3. **Measurement**: timed round trips across all workers
//! 4. **Shutdown**: a stop pulse terminates the echo receiver
//! 5. **Pulse phase**: enqueue-then-drain pulse throughput
//!
//! Threads are scoped (`crossbeam`), so workers may borrow the shared
//! session without reference-counting gymnastics.

use crate::cli::Args;
use crate::message::Pulse;
use crate::metrics::{LatencyRecorder, LatencySummary};
use crate::wait::Wait;
use crate::{Chid, Pid, Session, PULSE_WIRE_LEN};
use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Pid the benchmark registers with its private driver
const BENCH_PID: Pid = 1;

/// Pulse code that tells the echo receiver to exit
const STOP_PULSE_CODE: i8 = -1;

/// Validated benchmark parameters
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Payload bytes per round-trip message
    pub message_size: usize,
    /// Measured round trips per worker
    pub msg_count: usize,
    /// Sender workers running in parallel
    pub concurrency: usize,
    /// Unmeasured round trips per worker before timing starts
    pub warmup_iterations: usize,
    /// Pulses for the throughput phase; 0 skips it
    pub pulses: usize,
    /// Percentiles reported in the latency summary
    pub percentiles: Vec<f64>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            message_size: crate::defaults::MESSAGE_SIZE,
            msg_count: crate::defaults::MSG_COUNT,
            concurrency: 1,
            warmup_iterations: crate::defaults::WARMUP_ITERATIONS,
            pulses: 100_000,
            percentiles: vec![50.0, 95.0, 99.0, 99.9],
        }
    }
}

impl BenchConfig {
    /// Validate CLI arguments and build the runner configuration.
    ///
    /// Concurrency 0 expands to one worker per CPU core.
    pub fn from_args(args: &Args) -> Result<Self> {
        if args.message_size == 0 || args.message_size > 16 * 1024 * 1024 {
            return Err(anyhow!(
                "message size must be between 1 byte and 16MB, got {}",
                args.message_size
            ));
        }
        if args.msg_count == 0 {
            return Err(anyhow!("message count must be at least 1"));
        }
        for &p in &args.percentiles {
            if !(0.0..=100.0).contains(&p) || p == 0.0 {
                return Err(anyhow!("percentile {} outside (0, 100]", p));
            }
        }

        let concurrency = if args.concurrency == 0 {
            num_cpus::get().max(1)
        } else {
            args.concurrency
        };

        Ok(Self {
            message_size: args.message_size,
            msg_count: args.msg_count,
            concurrency,
            warmup_iterations: args.warmup_iterations,
            pulses: args.pulses,
            percentiles: args.percentiles.clone(),
        })
    }
}

/// Pulse-phase throughput figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseThroughput {
    /// Pulses pushed through the channel
    pub pulses: usize,
    /// End-to-end rate over enqueue plus drain
    pub msgs_per_sec: f64,
}

/// Complete results of one benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    /// Crate version that produced the report
    pub version: String,
    /// Payload bytes per message
    pub message_size: usize,
    /// Measured round trips per worker
    pub msg_count: usize,
    /// Sender workers
    pub concurrency: usize,
    /// Round-trip latency distribution across all workers
    pub round_trip_latency: LatencySummary,
    /// Aggregate round-trip rate
    pub round_trip_msgs_per_sec: f64,
    /// Pulse throughput, when the phase ran
    pub pulse_throughput: Option<PulseThroughput>,
}

/// Orchestrates one complete benchmark run
pub struct BenchRunner {
    config: BenchConfig,
}

impl BenchRunner {
    pub fn new(config: BenchConfig) -> Self {
        Self { config }
    }

    /// Execute both phases and assemble the report
    pub fn run(&self) -> Result<BenchReport> {
        let driver = crate::Driver::new();
        let session = driver.open(BENCH_PID)?;
        let chid = session.channel_create(0)?;

        info!(
            message_size = self.config.message_size,
            msg_count = self.config.msg_count,
            concurrency = self.config.concurrency,
            "starting rendezvous round-trip benchmark"
        );

        let (recorder, elapsed) = self.run_round_trips(&session, chid)?;
        let total_round_trips = (self.config.msg_count * self.config.concurrency) as f64;
        let round_trip_msgs_per_sec = total_round_trips / elapsed.as_secs_f64();

        let pulse_throughput = if self.config.pulses > 0 {
            Some(self.run_pulse_phase(&session, chid)?)
        } else {
            None
        };

        Ok(BenchReport {
            version: crate::VERSION.to_string(),
            message_size: self.config.message_size,
            msg_count: self.config.msg_count,
            concurrency: self.config.concurrency,
            round_trip_latency: recorder.summarize(&self.config.percentiles),
            round_trip_msgs_per_sec,
            pulse_throughput,
        })
    }

    /// Echo receiver plus sender workers; returns merged latencies and
    /// the wall time of the measured window
    fn run_round_trips(
        &self,
        session: &Session,
        chid: Chid,
    ) -> Result<(LatencyRecorder, Duration)> {
        let echo_buf_len = self.config.message_size.max(PULSE_WIRE_LEN);
        crossbeam::thread::scope(|scope| -> Result<(LatencyRecorder, Duration)> {
            let echo = scope.spawn(move |_| Self::echo_loop(session, chid, echo_buf_len));

            let started = Instant::now();
            let workers: Vec<_> = (0..self.config.concurrency)
                .map(|worker| scope.spawn(move |_| self.sender_loop(session, chid, worker)))
                .collect();

            let mut merged = LatencyRecorder::new()?;
            for handle in workers {
                let recorder = handle
                    .join()
                    .map_err(|_| anyhow!("sender worker panicked"))??;
                merged.merge(&recorder)?;
            }
            let elapsed = started.elapsed();

            // measurement is over; tell the echo receiver to exit
            let stop_coid = session.connect_attach(BENCH_PID, chid)?;
            session.msg_send_pulse(stop_coid, STOP_PULSE_CODE, 0)?;
            echo.join().map_err(|_| anyhow!("echo receiver panicked"))??;
            session.connect_detach(stop_coid)?;

            Ok((merged, elapsed))
        })
        .map_err(|_| anyhow!("benchmark scope panicked"))?
    }

    /// Reply to every message with its own payload until the stop pulse
    fn echo_loop(session: &Session, chid: Chid, buf_len: usize) -> Result<()> {
        let mut buf = vec![0u8; buf_len];
        loop {
            let (rcvid, info) = session.msg_receive(chid, &mut buf, Wait::forever())?;
            if rcvid == 0 {
                let pulse =
                    Pulse::decode_from(&buf).context("undersized pulse in echo receiver")?;
                if pulse.code == STOP_PULSE_CODE {
                    debug!("echo receiver stopping");
                    return Ok(());
                }
                continue;
            }
            let len = info.msglen.min(buf.len());
            session.msg_reply(rcvid, 0, &buf[..len])?;
        }
    }

    /// One worker's warmup plus measured round trips
    fn sender_loop(&self, session: &Session, chid: Chid, worker: usize) -> Result<LatencyRecorder> {
        let coid = session.connect_attach(BENCH_PID, chid)?;
        let mut payload = vec![0u8; self.config.message_size];
        rand::thread_rng().fill(payload.as_mut_slice());
        let mut reply = vec![0u8; self.config.message_size];
        let mut recorder = LatencyRecorder::new()?;

        for _ in 0..self.config.warmup_iterations {
            session.msg_send(coid, &payload, &mut reply, Wait::forever())?;
        }

        debug!(worker, "warmup complete, measuring");
        for _ in 0..self.config.msg_count {
            let started = Instant::now();
            session.msg_send(coid, &payload, &mut reply, Wait::forever())?;
            recorder.record(started.elapsed());
        }

        session.connect_detach(coid)?;
        Ok(recorder)
    }

    /// Enqueue-then-drain pulse throughput over the same channel
    fn run_pulse_phase(&self, session: &Session, chid: Chid) -> Result<PulseThroughput> {
        let coid = session.connect_attach(BENCH_PID, chid)?;
        info!(pulses = self.config.pulses, "starting pulse throughput phase");

        let started = Instant::now();
        for sequence in 0..self.config.pulses {
            session.msg_send_pulse(coid, 1, sequence as i32)?;
        }

        let mut buf = [0u8; PULSE_WIRE_LEN];
        let mut drained = 0;
        while drained < self.config.pulses {
            let (rcvid, _) = session.msg_receive(chid, &mut buf, Wait::forever())?;
            if rcvid == 0 {
                drained += 1;
            }
        }
        let elapsed = started.elapsed();

        session.connect_detach(coid)?;
        Ok(PulseThroughput {
            pulses: self.config.pulses,
            msgs_per_sec: self.config.pulses as f64 / elapsed.as_secs_f64(),
        })
    }
}
