//! Block generator pipeline: one producer computing blocks, one consumer
//! writing them, double-buffered through a two-slot ring.
//!
//! The producer computes block `i` into slot `i mod 2` while the consumer
//! writes slot `(i-1) mod 2`, so generation and I/O overlap with at most
//! two blocks outstanding.

use std::fs::File;
use std::io::Write;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, Instant };

use tracing::debug;

use crate::abort::AbortFlag;
use crate::constants::STATUS_UPDATE_TIME;
use crate::error::{ IoToolError, Result };
use crate::fill::{ init_block, FillMode, Lcg };
use crate::pool::BlockPool;
use crate::ring::{ BufferRing, Consume };
use crate::status::StatusLine;

/// Configuration for a generator run
#[derive(Debug, Clone)]
pub struct GenConfig {
    /// ASCII or RAND fill
    pub mode: FillMode,
    /// Bytes per block
    pub block_size: u64,
    /// Blocks to write; 0 runs until the sink fails or SIGINT
    pub num_blocks: u64,
    /// Suppress the closing summary
    pub quiet: bool,
    /// Show the progress line
    pub verbose: bool,
}

/// What a generator run accomplished
#[derive(Debug)]
pub struct GenSummary {
    /// Bytes accepted by the sink, including any short-write tail
    pub bytes_written: u64,
    /// Complete blocks written
    pub full_blocks: u64,
    /// Wall time of the write loop
    pub elapsed: Duration,
    /// The I/O failure that stopped the run, if any
    pub error: Option<IoToolError>,
}

impl GenSummary {
    /// Render the closing summary line
    pub fn report(&self) -> String {
        let secs = self.elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            self.bytes_written as f64 / secs / 1024.0
        } else {
            0.0
        };
        format!(
            "{} bytes written in {:.3} secs ({:.3} KiB/sec)",
            self.bytes_written,
            secs,
            rate
        )
    }
}

/// Generate blocks into `sink` until the count is reached, the sink
/// fails, or shutdown is requested.
pub fn run(config: &GenConfig, mut sink: File, abort: AbortFlag) -> Result<GenSummary> {
    let block_size = usize::try_from(config.block_size)
        .ok()
        .filter(|&b| b > 0)
        .ok_or_else(|| IoToolError::config("block size must be positive"))?;

    let pool = BlockPool::allocate(2, block_size)?;
    let ring = Arc::new(BufferRing::new(pool, 1, abort.clone())?);
    let bytes = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    debug!(
        blocks = config.num_blocks,
        block_size,
        mode = ?config.mode,
        "starting block generator"
    );

    let producer = {
        let ring = Arc::clone(&ring);
        let mode = config.mode;
        let num_blocks = config.num_blocks;
        thread::Builder
            ::new()
            .name("blockgen".into())
            .spawn(move || {
                let mut rng = Lcg::from_clock(0);
                let mut i: u64 = 0;
                while num_blocks == 0 || i < num_blocks {
                    if !ring.acquire_empty() {
                        return;
                    }
                    // SAFETY: acquire_empty granted the producer this slot
                    let slot = unsafe { ring.slot_mut((i % 2) as usize) };
                    init_block(slot, mode, i, &mut rng);
                    ring.publish();
                    i += 1;
                }
                ring.finish(block_size);
            })
            .map_err(|e| IoToolError::setup(format!("failed to spawn producer: {e}")))?
    };

    let status = if config.verbose {
        let bytes = Arc::clone(&bytes);
        let done = Arc::clone(&done);
        let flag = abort.clone();
        let total = (config.num_blocks > 0).then(|| config.num_blocks * config.block_size / 1024);
        let handle = thread::Builder
            ::new()
            .name("status".into())
            .spawn(move || {
                let mut line = StatusLine::new("KiB", "KiB/s", total);
                while !flag.is_set() && !done.load(Ordering::Acquire) {
                    line.update(bytes.load(Ordering::Relaxed) / 1024);
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
    let mut cursor = 0;
    let mut total: u64 = 0;
    let mut full_blocks: u64 = 0;
    let mut error = None;
    loop {
        match ring.acquire_full(0) {
            Consume::Ready { len } => {
                // SAFETY: acquire_full granted this consumer the slot
                let slot = unsafe { ring.slot(cursor) };
                match sink.write(&slot[..len]) {
                    Ok(n) if n == len => {
                        total += n as u64;
                        full_blocks += 1;
                        bytes.store(total, Ordering::Relaxed);
                        ring.release(0);
                        cursor = (cursor + 1) % 2;
                    }
                    Ok(n) => {
                        eprintln!("Short write: {n} bytes");
                        total += n as u64;
                        error = Some(IoToolError::ShortWrite {
                            written: n,
                            requested: len,
                        });
                        ring.abort();
                        break;
                    }
                    Err(e) => {
                        eprintln!("Write failed: {e}");
                        error = Some(e.into());
                        ring.abort();
                        break;
                    }
                }
            }
            Consume::Drained => break,
            Consume::Aborted => break,
        }
    }
    let elapsed = start.elapsed();
    if error.is_some() {
        eprintln!("{total} bytes, {full_blocks} full blocks written.");
    }

    done.store(true, Ordering::Release);
    if let Some(handle) = status {
        let _ = handle.join();
    }
    let _ = producer.join();

    Ok(GenSummary {
        bytes_written: total,
        full_blocks,
        elapsed,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{ Read, Seek, SeekFrom };

    fn run_to_temp(config: &GenConfig) -> (GenSummary, Vec<u8>) {
        let mut sink = tempfile::tempfile().unwrap();
        let summary = run(config, sink.try_clone().unwrap(), AbortFlag::new()).unwrap();
        let mut out = Vec::new();
        sink.seek(SeekFrom::Start(0)).unwrap();
        sink.read_to_end(&mut out).unwrap();
        (summary, out)
    }

    #[test]
    fn test_ascii_output_is_periodic_stream() {
        let config = GenConfig {
            mode: FillMode::Ascii,
            block_size: 512,
            num_blocks: 4,
            quiet: true,
            verbose: false,
        };
        let (summary, out) = run_to_temp(&config);
        assert_eq!(summary.bytes_written, 2048);
        assert_eq!(summary.full_blocks, 4);
        assert!(summary.error.is_none());
        assert_eq!(out.len(), 2048);
        let expected: Vec<u8> = (0..2048).map(|i| (i % 95) as u8 + b' ').collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_rand_output_has_exact_length() {
        let config = GenConfig {
            mode: FillMode::Rand,
            block_size: 4096,
            num_blocks: 16,
            quiet: true,
            verbose: false,
        };
        let (summary, out) = run_to_temp(&config);
        assert_eq!(summary.bytes_written, 4096 * 16);
        assert_eq!(out.len(), 4096 * 16);
        // not the ASCII stream
        assert!(out.iter().any(|&b| !(b' '..=b'~').contains(&b)));
    }

    #[test]
    fn test_pre_set_abort_stops_immediately() {
        let abort = AbortFlag::new();
        abort.set();
        let sink = tempfile::tempfile().unwrap();
        let config = GenConfig {
            mode: FillMode::Ascii,
            block_size: 512,
            num_blocks: 0,
            quiet: true,
            verbose: false,
        };
        let summary = run(&config, sink, abort).unwrap();
        assert_eq!(summary.bytes_written, 0);
        assert!(summary.error.is_none());
    }

    #[test]
    fn test_zero_block_size_is_config_error() {
        let config = GenConfig {
            mode: FillMode::Ascii,
            block_size: 0,
            num_blocks: 1,
            quiet: true,
            verbose: false,
        };
        let sink = tempfile::tempfile().unwrap();
        assert!(matches!(
            run(&config, sink, AbortFlag::new()),
            Err(IoToolError::Config { .. })
        ));
    }

    #[test]
    fn test_report_format() {
        let summary = GenSummary {
            bytes_written: 524_288,
            full_blocks: 1024,
            elapsed: Duration::from_secs(2),
            error: None,
        };
        assert_eq!(summary.report(), "524288 bytes written in 2.000 secs (256.000 KiB/sec)");
    }
}
