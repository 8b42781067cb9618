//! Shared constants for the iotools pipelines.

use std::time::Duration;

/// Default block size for fblckgen and iohammer (one sector)
pub const DEFAULT_BLOCK_SIZE: u64 = 512;

/// Default block count for fblckgen (1k blocks)
pub const DEFAULT_BLOCK_COUNT: u64 = 1024;

/// Default staging buffer size for mbdd
pub const DEFAULT_BUF_SIZE: u64 = 64 * 1024;

/// Default number of ring slots for mbdd
pub const DEFAULT_NUM_BUFS: usize = 16;

/// A ring with fewer slots than this cannot overlap read and write
pub const MIN_NUM_BUFS: usize = 2;

/// Default worker count for iohammer
pub const DEFAULT_THREADS: usize = 8;

/// Default target size for iohammer temporary files (1 MiB)
pub const DEFAULT_FILE_SIZE: u64 = 1024 * 1024;

/// Refresh cadence of the progress line
pub const STATUS_UPDATE_TIME: Duration = Duration::from_millis(250);

/// Upper bound on how long a blocking wait may sleep before re-checking
/// the abort flag
pub const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Keepalive timeout of the credit dispatcher's completion wait; expiry
/// does not abort the run
pub const DISPATCH_KEEPALIVE: Duration = Duration::from_secs(10);

/// LCG multiplier. The compression-resistance of RAND fills depends on
/// these exact constants; do not substitute a better generator.
pub const LCG_MUL: u64 = 1_103_515_245;

/// LCG increment
pub const LCG_INC: u64 = 12_345;

/// First byte of the printable-ASCII fill range
pub const ASCII_FIRST: u8 = b' ';

/// Last byte of the printable-ASCII fill range
pub const ASCII_LAST: u8 = b'~';

/// Period of the ASCII fill stream
pub const ASCII_SPAN: usize = (ASCII_LAST - ASCII_FIRST + 1) as usize;

/// Repeats of the period held in the precomputed fill table, sized so
/// bulk copies dominate per-block cost
pub const ASCII_TABLE_REPEATS: usize = 44;

/// Chunk size used to preallocate temporary target files
pub const PREALLOC_CHUNK: usize = 64 * 1024;

/// Mask applied to a RAND sample when deciding read vs write; with the
/// `<< 10 / 100` threshold this gives ~0.1% resolution
pub const WRITE_DECISION_MASK: u64 = 0x3ff;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_span_is_printable_range() {
        assert_eq!(ASCII_SPAN, 95);
    }

    #[test]
    fn test_poll_interval_shorter_than_status_cadence() {
        assert!(ABORT_POLL_INTERVAL < STATUS_UPDATE_TIME);
    }

    #[test]
    fn test_write_decision_resolution() {
        // writePct of 100 must map onto the full mask range
        assert_eq!((100u64 << 10) / 100, WRITE_DECISION_MASK + 1);
    }
}
