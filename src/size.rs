//! Size parsing with single-letter unit suffixes.

/// Help epilogue shared by the three binaries
pub const SUFFIX_HELP: &str = "Numeric arguments take an optional letter multiplier:
  s:        sectors (x 512)
  k:        kibi (x 1024 or 2^10)
  m:        mebi (x 1048576 or 2^20)
  g:        gibi (x 2^30)
  t:        tebi (x 2^40)
  p:        pebi (x 2^50)
  e:        exbi (x 2^60)";

/// Parse a decimal size with an optional letter multiplier.
///
/// Leading decimal digits accumulate base-10; the byte that follows may be
/// one of `s` (sectors, 512), `k`, `m`, `g`, `t`, `p`, `e` (binary
/// multipliers), case-insensitive. Anything else multiplies by 1. Empty or
/// non-digit input yields 0; there is no error signalling and 64-bit
/// overflow is not defended.
pub fn getnum(s: &str) -> u64 {
    let mut bytes = s.bytes();
    let mut result: u64 = 0;
    let mut suffix = None;
    for b in bytes.by_ref() {
        if b.is_ascii_digit() {
            result = result.wrapping_mul(10).wrapping_add(u64::from(b - b'0'));
        } else {
            suffix = Some(b);
            break;
        }
    }
    let mult: u64 = match suffix.map(|b| b.to_ascii_lowercase()) {
        Some(b's') => 512,
        Some(b'k') => 1 << 10,
        Some(b'm') => 1 << 20,
        Some(b'g') => 1 << 30,
        Some(b't') => 1 << 40,
        Some(b'p') => 1 << 50,
        Some(b'e') => 1 << 60,
        _ => 1,
    };
    result.wrapping_mul(mult)
}
