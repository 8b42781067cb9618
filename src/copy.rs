//! Multi-buffer copy pipeline: one reader staging input through a ring of
//! buffers, fanned out to any number of sinks, each draining at its own
//! pace.
//!
//! The reader fills every slot completely before publishing (short reads
//! are retried and counted), records the tail length at EOF, and the ring
//! hands each writer the remainder for its final slot. A short write on
//! any sink is fatal for the whole run.

use std::fs::File;
use std::io::{ ErrorKind, Read, Write };
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use tracing::debug;

use crate::abort::AbortFlag;
use crate::constants::{ MIN_NUM_BUFS, STATUS_UPDATE_TIME };
use crate::error::{ IoToolError, Result };
use crate::pool::BlockPool;
use crate::ring::{ BufferRing, Consume };
use crate::status::StatusLine;

/// Configuration for a copy run
#[derive(Debug, Clone)]
pub struct CopyConfig {
    /// Bytes per staging buffer
    pub buf_size: u64,
    /// Slots in the ring
    pub num_bufs: usize,
    /// Stop after this many full buffers; 0 copies until EOF
    pub max_blocks: u64,
    /// Suppress the closing summary
    pub quiet: bool,
    /// Show the progress line
    pub verbose: bool,
}

/// One output of the fan-out
#[derive(Debug)]
pub struct Sink {
    /// Name shown in the per-destination summary
    pub name: String,
    /// Open descriptor the writer task owns
    pub file: File,
}

/// What a copy run accomplished
#[derive(Debug)]
pub struct CopySummary {
    /// Bytes written per destination, in sink order
    pub per_dest: Vec<(String, u64)>,
    /// Wall time of the transfer
    pub elapsed: Duration,
    /// Reads that returned less than a full buffer
    pub partial_reads: u64,
    /// Mean slots-in-flight sampled at each release
    pub avg_occupancy: f64,
    /// True when the run was cut short by SIGINT or a fatal error
    pub aborted: bool,
    /// The failure that stopped the run, if any
    pub error: Option<IoToolError>,
}

impl CopySummary {
    /// Total bytes delivered across every destination
    pub fn total_written(&self) -> u64 {
        self.per_dest.iter().map(|(_, b)| b).sum()
    }

    /// Render the closing summary block
    pub fn report(&self) -> String {
        let total = self.total_written();
        let secs = self.elapsed.as_secs_f64();
        let rate = if secs > 0.0 { total as f64 / secs / 1024.0 } else { 0.0 };
        let mut lines = vec![
            format!("{total} bytes transferred in {secs:.3} secs ({rate:.3} KiB/sec)")
        ];
        if self.per_dest.len() > 1 {
            for (name, bytes) in &self.per_dest {
                lines.push(format!("  {name}: {bytes} bytes"));
            }
        }
        lines.push(
            format!(
                "{} bytes written to {} destination{}",
                total,
                self.per_dest.len(),
                if self.per_dest.len() == 1 { "" } else { "s" }
            )
        );
        lines.push(
            format!(
                "{} partial read{}, {:.3} average buffers full",
                self.partial_reads,
                if self.partial_reads == 1 { "" } else { "s" },
                self.avg_occupancy
            )
        );
        lines.join("\n")
    }
}

fn reader_task(
    ring: &BufferRing,
    mut input: File,
    buf_size: usize,
    max_blocks: u64
) -> Option<IoToolError> {
    let mut cursor = 0;
    let mut blocks: u64 = 0;
    loop {
        if max_blocks > 0 && blocks == max_blocks {
            // cap reached on a slot boundary; the last buffer is full
            ring.finish(buf_size);
            return None;
        }
        if !ring.acquire_empty() {
            return None;
        }
        // SAFETY: acquire_empty granted the producer this slot
        let slot = unsafe { ring.slot_mut(cursor) };
        let mut filled = 0;
        while filled < buf_size {
            match input.read(&mut slot[filled..]) {
                Ok(0) => {
                    debug!(remainder = filled, "input exhausted");
                    ring.finish_publish(filled);
                    return None;
                }
                Ok(n) => {
                    if n != buf_size {
                        ring.note_partial_read();
                    }
                    filled += n;
                }
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {}
                Err(e) => {
                    eprintln!("Read failed: {e}");
                    ring.abort();
                    return Some(e.into());
                }
            }
        }
        ring.publish();
        blocks += 1;
        cursor = (cursor + 1) % ring.num_slots();
    }
}

fn writer_task(
    ring: &BufferRing,
    c: usize,
    mut file: File,
    total: &AtomicU64
) -> (u64, Option<IoToolError>) {
    let mut cursor = 0;
    let mut written: u64 = 0;
    loop {
        match ring.acquire_full(c) {
            Consume::Ready { len } => {
                // SAFETY: acquire_full granted this consumer the slot
                let slot = unsafe { ring.slot(cursor) };
                match file.write(&slot[..len]) {
                    Ok(n) if n == len => {
                        written += n as u64;
                        total.fetch_add(n as u64, Ordering::Relaxed);
                        ring.release(c);
                        cursor = (cursor + 1) % ring.num_slots();
                    }
                    Ok(n) => {
                        eprintln!("Short write: {n} bytes.");
                        written += n as u64;
                        total.fetch_add(n as u64, Ordering::Relaxed);
                        ring.abort();
                        return (
                            written,
                            Some(IoToolError::ShortWrite {
                                written: n,
                                requested: len,
                            }),
                        );
                    }
                    Err(e) => {
                        eprintln!("Write failed: {e}");
                        ring.abort();
                        return (written, Some(e.into()));
                    }
                }
            }
            Consume::Drained => return (written, None),
            Consume::Aborted => return (written, None),
        }
    }
}

/// Copy `input` to every sink until EOF, the block cap, a fatal error,
/// or shutdown.
pub fn run(
    config: &CopyConfig,
    input: File,
    sinks: Vec<Sink>,
    abort: AbortFlag
) -> Result<CopySummary> {
    let buf_size = usize::try_from(config.buf_size)
        .ok()
        .filter(|&b| b > 0)
        .ok_or_else(|| IoToolError::config("buffer size must be positive"))?;
    if config.num_bufs < MIN_NUM_BUFS {
        return Err(IoToolError::config(format!("buffer count must be at least {MIN_NUM_BUFS}")));
    }
    if sinks.is_empty() {
        return Err(IoToolError::config("at least one destination required"));
    }

    let pool = BlockPool::allocate(config.num_bufs, buf_size)?;
    let ring = Arc::new(BufferRing::new(pool, sinks.len(), abort.clone())?);
    let total = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    debug!(
        buf_size,
        num_bufs = config.num_bufs,
        dests = sinks.len(),
        "starting multi-buffer copy"
    );

    let reader = {
        let ring = Arc::clone(&ring);
        let max_blocks = config.max_blocks;
        thread::Builder
            ::new()
            .name("reader".into())
            .spawn(move || reader_task(&ring, input, buf_size, max_blocks))
            .map_err(|e| IoToolError::setup(format!("failed to spawn reader: {e}")))?
    };

    let mut names = Vec::with_capacity(sinks.len());
    let mut writers = Vec::with_capacity(sinks.len());
    for (c, sink) in sinks.into_iter().enumerate() {
        names.push(sink.name);
        let ring = Arc::clone(&ring);
        let total = Arc::clone(&total);
        let handle = thread::Builder
            ::new()
            .name(format!("writer-{c}"))
            .spawn(move || writer_task(&ring, c, sink.file, &total))
            .map_err(|e| IoToolError::setup(format!("failed to spawn writer {c}: {e}")))?;
        writers.push(handle);
    }

    let status = if config.verbose {
        let total = Arc::clone(&total);
        let done = Arc::clone(&done);
        let flag = abort.clone();
        let cap = (config.max_blocks > 0).then(|| {
            config.max_blocks * config.buf_size * (names.len() as u64) / 1024
        });
        let handle = thread::Builder
            ::new()
            .name("status".into())
            .spawn(move || {
                let mut line = StatusLine::new("KiB", "KiB/s", cap);
                while !flag.is_set() && !done.load(Ordering::Acquire) {
                    line.update(total.load(Ordering::Relaxed) / 1024);
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
    let mut per_dest = Vec::with_capacity(names.len());
    let mut error: Option<IoToolError> = None;
    for (name, handle) in names.into_iter().zip(writers) {
        let (written, writer_err) = handle.join().unwrap_or((0, None));
        if error.is_none() {
            error = writer_err;
        }
        per_dest.push((name, written));
    }
    let reader_err = reader.join().unwrap_or(None);
    if error.is_none() {
        error = reader_err;
    }
    let elapsed = start.elapsed();

    done.store(true, Ordering::Release);
    if let Some(handle) = status {
        let _ = handle.join();
    }

    let stats = ring.stats();
    Ok(CopySummary {
        per_dest,
        elapsed,
        partial_reads: stats.partial_reads,
        avg_occupancy: stats.avg_occupancy,
        aborted: abort.is_set(),
        error,
    })
}
