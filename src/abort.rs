//! Process-wide cooperative abort flag.
//!
//! SIGINT and fatal I/O errors both land here. Setting the flag is
//! advisory: every loop tests it per iteration and every blocking wait is
//! timed, so all tasks observe the flag within one poll interval.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;

/// Shared abort flag, cheap to clone into every task
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    flag: Arc<AtomicBool>,
}

impl AbortFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cooperative shutdown
    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// True once shutdown has been requested
    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Install a SIGINT handler that sets this flag. The handler runs on
    /// a dedicated thread, not in signal context. Installation can fail
    /// only if a handler is already registered, which is fine: the first
    /// one owns the same flag in every binary here.
    pub fn install_sigint_handler(&self) {
        let flag = self.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.set()) {
            tracing::warn!("could not install SIGINT handler: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_starts_clear() {
        let flag = AbortFlag::new();
        assert!(!flag.is_set());
    }

    #[test]
    fn test_set_visible_through_clones() {
        let flag = AbortFlag::new();
        let other = flag.clone();
        flag.set();
        assert!(other.is_set());
    }
}
