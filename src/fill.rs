//! Block fill generation: repeating printable ASCII or fast pseudo-random
//! data.
//!
//! The RAND mode exists to defeat compression on the write path, nothing
//! more. The generator is the classic `s = s * 1103515245 + 12345` LCG;
//! it is nowhere near cryptographic, but gzip and bzip2 get near 0% out
//! of its output, which is the only quality bar.

use std::time::{ SystemTime, UNIX_EPOCH };

use once_cell::sync::Lazy;

use crate::constants::{ ASCII_FIRST, ASCII_SPAN, ASCII_TABLE_REPEATS, LCG_INC, LCG_MUL };

/// What a generated block contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Repeating printable-ASCII stream; consecutive blocks concatenate
    /// into one unbroken periodic sequence
    Ascii,
    /// LCG byte stream, incompressible
    Rand,
}

/// Fast linear-congruential generator
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    /// Create a generator with an explicit seed
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seed from the wall clock, mixed with a caller-supplied salt so
    /// concurrent workers do not share a sequence
    pub fn from_clock(salt: u64) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::new(now.as_secs() ^ u64::from(now.subsec_micros()) ^ salt)
    }

    /// Advance the recurrence and return the new state
    #[inline]
    pub fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
        self.state
    }
}

const ASCII_TABLE_LEN: usize = ASCII_SPAN * ASCII_TABLE_REPEATS;

// Built on first use; block generation then runs on bulk copies, since
// single byte generation is hideously slow on some CPUs.
static ASCII_TABLE: Lazy<[u8; ASCII_TABLE_LEN]> = Lazy::new(|| {
    let mut table = [0u8; ASCII_TABLE_LEN];
    for (i, b) in table.iter_mut().enumerate() {
        *b = (i % ASCII_SPAN) as u8 + ASCII_FIRST;
    }
    table
});

/// Fill `buf` as block number `block_num` of the chosen stream.
///
/// In ASCII mode the result is the slice of the infinite periodic stream
/// starting at byte `block_num * buf.len()`, so the mode is deterministic
/// and position-dependent. In RAND mode bytes are drawn from `rng`; the
/// upper-middle bits of each sample are used, two bytes per step.
pub fn init_block(buf: &mut [u8], mode: FillMode, block_num: u64, rng: &mut Lcg) {
    match mode {
        FillMode::Ascii => {
            let table: &[u8] = &*ASCII_TABLE;
            let mut c = (block_num.wrapping_mul(buf.len() as u64) % (ASCII_TABLE_LEN as u64))
                as usize;
            let mut i = 0;
            while i < buf.len() {
                let len = (buf.len() - i).min(table.len() - c);
                buf[i..i + len].copy_from_slice(&table[c..c + len]);
                i += len;
                c = 0;
            }
        }
        FillMode::Rand => {
            let tail = buf.len() & 1;
            let (pairs, last) = buf.split_at_mut(buf.len() - tail);
            for chunk in pairs.chunks_exact_mut(2) {
                let r = rng.next();
                chunk.copy_from_slice(&((r >> 16) as u16).to_le_bytes());
            }
            if let [b] = last {
                *b = (rng.next() >> 8) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii_stream(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % ASCII_SPAN) as u8 + ASCII_FIRST).collect()
    }

    #[test]
    fn test_lcg_recurrence() {
        let mut rng = Lcg::new(1);
        assert_eq!(rng.next(), 1_103_515_245 + 12_345);
    }

    #[test]
    fn test_lcg_deterministic() {
        let mut a = Lcg::new(42);
        let mut b = Lcg::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_ascii_blocks_concatenate_into_periodic_stream() {
        let mut rng = Lcg::new(0);
        for block_size in [95usize, 512, 7, 13, 4096] {
            let blocks = 8;
            let mut out = Vec::with_capacity(block_size * blocks);
            let mut buf = vec![0u8; block_size];
            for i in 0..blocks as u64 {
                init_block(&mut buf, FillMode::Ascii, i, &mut rng);
                out.extend_from_slice(&buf);
            }
            assert_eq!(out, ascii_stream(block_size * blocks), "block size {block_size}");
        }
    }

    #[test]
    fn test_ascii_first_block_starts_at_space() {
        let mut rng = Lcg::new(0);
        let mut buf = vec![0u8; 190];
        init_block(&mut buf, FillMode::Ascii, 0, &mut rng);
        assert_eq!(buf[0], b' ');
        assert_eq!(buf[94], b'~');
        assert_eq!(buf[95], b' ');
        assert_eq!(&buf[..95], &buf[95..190]);
    }

    #[test]
    fn test_ascii_block_larger_than_table() {
        let mut rng = Lcg::new(0);
        let len = ASCII_TABLE_LEN * 2 + 17;
        let mut buf = vec![0u8; len];
        init_block(&mut buf, FillMode::Ascii, 3, &mut rng);
        let want = {
            let full = ascii_stream(4 * len);
            full[(3 * len) % ASCII_SPAN..].iter().copied().take(len).collect::<Vec<_>>()
        };
        assert_eq!(buf, want);
    }

    #[test]
    fn test_rand_fill_deterministic_per_seed() {
        let mut buf_a = vec![0u8; 4096];
        let mut buf_b = vec![0u8; 4096];
        init_block(&mut buf_a, FillMode::Rand, 0, &mut Lcg::new(7));
        init_block(&mut buf_b, FillMode::Rand, 0, &mut Lcg::new(7));
        assert_eq!(buf_a, buf_b);
        init_block(&mut buf_b, FillMode::Rand, 0, &mut Lcg::new(8));
        assert_ne!(buf_a, buf_b);
    }

    #[test]
    fn test_rand_fill_odd_length() {
        // an odd block gets its trailing byte from a separate draw
        let mut rng = Lcg::new(1234);
        let mut buf = vec![0u8; 513];
        init_block(&mut buf, FillMode::Rand, 0, &mut rng);
        let mut replay = Lcg::new(1234);
        for _ in 0..256 {
            replay.next();
        }
        assert_eq!(buf[512], (replay.next() >> 8) as u8);
    }

    #[test]
    fn test_rand_fill_looks_incompressible() {
        // crude stand-in for the gzip property: a 64 KiB fill should use
        // nearly the whole byte alphabet
        let mut buf = vec![0u8; 64 * 1024];
        init_block(&mut buf, FillMode::Rand, 0, &mut Lcg::from_clock(0));
        let mut seen = [false; 256];
        for &b in &buf {
            seen[b as usize] = true;
        }
        assert!(seen.iter().filter(|&&s| s).count() > 250);
    }
}
