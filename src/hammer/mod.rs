//! Random-offset I/O hammer: N workers issuing reads and writes against
//! one target, with exact operation accounting.
//!
//! Two dispatch variants. The shared-counter pool lets every worker
//! drive itself and count under one mutex; its exit rule lands the total
//! exactly on the limit because each of the final `threads` completions
//! retires one worker. The credit dispatcher hands out "go" tokens over
//! per-worker channels and multiplexes completions on a single channel,
//! so at most `threads` operations are ever in flight and the tally
//! cannot overshoot. The credit model gives exact accounting without
//! racing on a shared counter; the shared counter is the cheaper
//! variant when a small overshoot window is acceptable.

pub mod target;

pub use target::Target;

use std::fs::File;
use std::io::{ Read, Seek, SeekFrom, Write };
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use crossbeam::channel::{ bounded, RecvTimeoutError };
use parking_lot::{ Condvar, Mutex };
use tracing::debug;

use crate::abort::AbortFlag;
use crate::constants::{ ABORT_POLL_INTERVAL, DISPATCH_KEEPALIVE, STATUS_UPDATE_TIME };
use crate::constants::WRITE_DECISION_MASK;
use crate::error::{ IoToolError, Result };
use crate::fill::{ init_block, FillMode, Lcg };
use crate::status::StatusLine;

/// Which concurrency backend drives the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchModel {
    /// One mutex over the tally; workers self-dispatch
    SharedCounter,
    /// Driver-issued credits, exact accounting
    CreditDispatch,
}

/// Configuration for a hammer run
#[derive(Debug, Clone)]
pub struct HammerConfig {
    /// Fill used for write operations
    pub mode: FillMode,
    /// Bytes per operation
    pub block_size: u64,
    /// Operations to issue; 0 runs until SIGINT
    pub iolimit: u64,
    /// Percentage of operations that are writes, 0..=100
    pub write_pct: u32,
    /// Concurrent workers
    pub threads: usize,
    /// Count I/O errors instead of aborting
    pub ignore_errors: bool,
    /// Show the progress line
    pub verbose: bool,
    /// Concurrency backend
    pub model: DispatchModel,
}

impl HammerConfig {
    /// Validate and apply the standard clamps: `write_pct` caps at 100
    /// and the worker count never exceeds the operation limit.
    pub fn clamped(mut self) -> Result<Self> {
        if self.threads == 0 {
            return Err(IoToolError::config("Invalid number of threads: 0"));
        }
        if self.block_size == 0 {
            return Err(IoToolError::config("block size must be positive"));
        }
        self.write_pct = self.write_pct.min(100);
        if self.iolimit > 0 && (self.threads as u64) > self.iolimit {
            self.threads = self.iolimit as usize;
        }
        Ok(self)
    }
}

/// What a hammer run accomplished
#[derive(Debug)]
pub struct HammerReport {
    /// Operations completed
    pub numio: u64,
    /// How many of them were writes
    pub num_writes: u64,
    /// Wall time of the dispatch loop
    pub elapsed: Duration,
    /// True when the run was cut short by SIGINT or a fatal error
    pub aborted: bool,
    /// The failure that stopped the run, if any
    pub error: Option<IoToolError>,
}

impl HammerReport {
    /// Human-readable report line
    pub fn formatted(&self) -> String {
        let secs = self.elapsed.as_secs_f64();
        let rate = if secs > 0.0 { self.numio as f64 / secs } else { 0.0 };
        let seek_ms = if self.numio > 0 { secs / (self.numio as f64) * 1000.0 } else { 0.0 };
        format!(
            "{:.3} secs, {} IOs, {} writes, {:.1} IOs/sec, {:.2} ms average seek",
            secs,
            self.numio,
            self.num_writes,
            rate,
            seek_ms
        )
    }

    /// Tab-separated report for scripting: size, threads, blockSize,
    /// writePct, count, writes, seconds, rate
    pub fn unformatted(&self, config: &HammerConfig, file_size: u64) -> String {
        let secs = self.elapsed.as_secs_f64();
        let rate = if secs > 0.0 { self.numio as f64 / secs } else { 0.0 };
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{:.6}\t{:.6}",
            file_size,
            config.threads,
            config.block_size,
            config.write_pct,
            self.numio,
            self.num_writes,
            secs,
            rate
        )
    }
}

/// One worker: a private descriptor, a private generator, one staging
/// block
struct Worker {
    file: File,
    rng: Lcg,
    buf: Vec<u8>,
    mode: FillMode,
    write_lim: u64,
    file_blocks: u64,
    ignore_errors: bool,
}

impl Worker {
    /// Issue one random-offset operation. Returns whether it was a
    /// write. Reported-but-ignored failures also count as operations;
    /// seek failures are always fatal.
    fn run_one(&mut self) -> Result<bool> {
        let block = (self.rng.next() >> 16) % self.file_blocks;
        let offset = block * (self.buf.len() as u64);
        let wrote = (self.rng.next() & WRITE_DECISION_MASK) < self.write_lim;
        if wrote {
            init_block(&mut self.buf, self.mode, 1, &mut self.rng);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let res = if wrote { self.file.write(&self.buf) } else { self.file.read(&mut self.buf) };
        let op = if wrote { "write" } else { "read" };
        match res {
            Ok(n) if n == self.buf.len() => Ok(wrote),
            Ok(n) => {
                eprintln!("{op} I/O failed, offset {offset}: short transfer of {n} bytes");
                if self.ignore_errors {
                    Ok(wrote)
                } else {
                    Err(IoToolError::WorkerIo {
                        op,
                        offset,
                        source: std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!("short transfer of {n} of {} bytes", self.buf.len())
                        ),
                    })
                }
            }
            Err(e) => {
                eprintln!("{op} I/O failed, offset {offset}: {e}");
                if self.ignore_errors {
                    Ok(wrote)
                } else {
                    Err(IoToolError::WorkerIo { op, offset, source: e })
                }
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    numio: u64,
    num_writes: u64,
}

/// Hammer `target` per `config` until the limit is reached or shutdown
/// is requested. The config should already be `clamped`; the target must
/// carry one descriptor per worker.
pub fn run(config: &HammerConfig, target: Target, abort: AbortFlag) -> Result<HammerReport> {
    if target.files.len() != config.threads {
        return Err(
            IoToolError::config(
                format!(
                    "target carries {} descriptors for {} workers",
                    target.files.len(),
                    config.threads
                )
            )
        );
    }
    let block_size = config.block_size as usize;
    let file_blocks = target.size / config.block_size;
    if file_blocks == 0 {
        return Err(
            IoToolError::config(
                format!("target of {} bytes holds no {}-byte blocks", target.size, config.block_size)
            )
        );
    }
    let write_lim = (u64::from(config.write_pct) << 10) / 100;

    let workers: Vec<Worker> = target.files
        .into_iter()
        .enumerate()
        .map(|(id, file)| Worker {
            file,
            rng: Lcg::from_clock((id as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)),
            buf: vec![0u8; block_size],
            mode: config.mode,
            write_lim,
            file_blocks,
            ignore_errors: config.ignore_errors,
        })
        .collect();

    debug!(
        threads = config.threads,
        iolimit = config.iolimit,
        file_blocks,
        model = ?config.model,
        "starting hammer"
    );

    let ops = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let status = if config.verbose {
        let ops = Arc::clone(&ops);
        let done = Arc::clone(&done);
        let flag = abort.clone();
        let total = (config.iolimit > 0).then_some(config.iolimit);
        let handle = thread::Builder
            ::new()
            .name("status".into())
            .spawn(move || {
                let mut line = StatusLine::new("IOs", "IO/s", total);
                while !flag.is_set() && !done.load(Ordering::Acquire) {
                    line.update(ops.load(Ordering::Relaxed));
                    thread::sleep(STATUS_UPDATE_TIME);
                }
                line.finish();
            })
            .map_err(|e| IoToolError::setup(format!("failed to spawn status task: {e}")))?;
        Some(handle)
    } else {
        None
    };

    let start = Instant::now();
    let (tally, error) = match config.model {
        DispatchModel::SharedCounter => {
            run_shared_counter(workers, config.iolimit, &abort, &ops)?
        }
        DispatchModel::CreditDispatch => {
            run_credit_dispatch(workers, config.iolimit, &abort, &ops)?
        }
    };
    let elapsed = start.elapsed();

    done.store(true, Ordering::Release);
    if let Some(handle) = status {
        let _ = handle.join();
    }

    Ok(HammerReport {
        numio: tally.numio,
        num_writes: tally.num_writes,
        elapsed,
        aborted: abort.is_set(),
        error,
    })
}

fn run_shared_counter(
    workers: Vec<Worker>,
    iolimit: u64,
    abort: &AbortFlag,
    ops: &Arc<AtomicU64>
) -> Result<(Tally, Option<IoToolError>)> {
    let threads = workers.len() as u64;
    let shared = Arc::new((Mutex::new(Tally::default()), Condvar::new()));
    let first_error = Arc::new(Mutex::new(None::<IoToolError>));

    let mut handles = Vec::with_capacity(workers.len());
    for (id, mut worker) in workers.into_iter().enumerate() {
        let shared = Arc::clone(&shared);
        let first_error = Arc::clone(&first_error);
        let abort = abort.clone();
        let ops = Arc::clone(ops);
        let handle = thread::Builder
            ::new()
            .name(format!("hammer-{id}"))
            .spawn(move || {
                loop {
                    match worker.run_one() {
                        Ok(wrote) => {
                            let (tally, cond) = &*shared;
                            let mut tally = tally.lock();
                            tally.numio += 1;
                            if wrote {
                                tally.num_writes += 1;
                            }
                            ops.store(tally.numio, Ordering::Relaxed);
                            if abort.is_set()
                                || (iolimit > 0 && tally.numio + threads >= iolimit + 1)
                            {
                                cond.notify_all();
                                return;
                            }
                        }
                        Err(e) => {
                            first_error.lock().get_or_insert(e);
                            abort.set();
                            let (_, cond) = &*shared;
                            cond.notify_all();
                            return;
                        }
                    }
                }
            })
            .map_err(|e| IoToolError::setup(format!("failed to spawn worker {id}: {e}")))?;
        handles.push(handle);
    }

    {
        let (tally, cond) = &*shared;
        let mut tally = tally.lock();
        while (iolimit == 0 || tally.numio < iolimit) && !abort.is_set() {
            cond.wait_for(&mut tally, ABORT_POLL_INTERVAL);
        }
    }

    // an aborted run may leave a worker parked in a syscall; leave those
    // to process teardown
    if !abort.is_set() {
        for handle in handles {
            let _ = handle.join();
        }
    }

    let tally = *shared.0.lock();
    let error = first_error.lock().take();
    Ok((tally, error))
}

struct Done {
    id: usize,
    wrote: bool,
    error: Option<IoToolError>,
}

fn run_credit_dispatch(
    workers: Vec<Worker>,
    iolimit: u64,
    abort: &AbortFlag,
    ops: &Arc<AtomicU64>
) -> Result<(Tally, Option<IoToolError>)> {
    let threads = workers.len();
    let (done_tx, done_rx) = bounded::<Done>(threads);
    let mut go_txs = Vec::with_capacity(threads);
    let mut handles = Vec::with_capacity(threads);

    for (id, mut worker) in workers.into_iter().enumerate() {
        let (go_tx, go_rx) = bounded::<bool>(1);
        go_txs.push(go_tx);
        let done_tx = done_tx.clone();
        let abort = abort.clone();
        let handle = thread::Builder
            ::new()
            .name(format!("hammer-{id}"))
            .spawn(move || {
                while let Ok(true) = go_rx.recv() {
                    if abort.is_set() {
                        break;
                    }
                    match worker.run_one() {
                        Ok(wrote) => {
                            if done_tx.send(Done { id, wrote, error: None }).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            abort.set();
                            let _ = done_tx.send(Done { id, wrote: false, error: Some(e) });
                            break;
                        }
                    }
                }
            })
            .map_err(|e| IoToolError::setup(format!("failed to spawn worker {id}: {e}")))?;
        handles.push(handle);
    }
    drop(done_tx);

    let mut tally = Tally::default();
    let mut error = None;
    let mut in_flight: u64 = 0;
    for go_tx in &go_txs {
        let _ = go_tx.send(true);
        in_flight += 1;
    }

    while (iolimit == 0 || tally.numio < iolimit) && !abort.is_set() {
        match done_rx.recv_timeout(DISPATCH_KEEPALIVE) {
            // keepalive expiry is not an abort
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
            Ok(done) => {
                in_flight -= 1;
                if let Some(e) = done.error {
                    error.get_or_insert(e);
                    break;
                }
                tally.numio += 1;
                if done.wrote {
                    tally.num_writes += 1;
                }
                ops.store(tally.numio, Ordering::Relaxed);
                // issue another credit only while the eventual total
                // stays within the limit
                let more = iolimit == 0 || tally.numio + in_flight < iolimit;
                let _ = go_txs[done.id].send(more);
                if more {
                    in_flight += 1;
                }
            }
        }
    }

    // stop tokens for everyone still holding a channel
    drop(go_txs);
    if !abort.is_set() {
        for handle in handles {
            let _ = handle.join();
        }
    }
    Ok((tally, error))
}
