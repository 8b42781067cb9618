//! Error types for the iotools library

use thiserror::Error;

/// Result type alias for iotools operations
pub type Result<T> = std::result::Result<T, IoToolError>;

/// Main error type for the iotools library
#[derive(Error, Debug)]
pub enum IoToolError {
    /// I/O errors from read/write/seek syscalls
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration, detected before any I/O is issued
    #[error("Invalid configuration: {message}")]
    Config {
        /// What was wrong with the requested configuration
        message: String,
    },

    /// Setup failures: open, stat, allocation, thread spawn
    #[error("Setup failed: {message}")]
    Setup {
        /// Which setup step failed and why
        message: String,
    },

    /// A write accepted fewer bytes than requested; the sink is full or
    /// the device is misbehaving
    #[error("Short write: {written} of {requested} bytes")]
    ShortWrite {
        /// Bytes the sink actually accepted
        written: usize,
        /// Bytes the write asked for
        requested: usize,
    },

    /// A read or write inside an iohammer worker failed
    #[error("{op} I/O failed, offset {offset}: {source}")]
    WorkerIo {
        /// "read" or "write"
        op: &'static str,
        /// Byte offset of the failed operation
        offset: u64,
        /// Underlying errno
        source: std::io::Error,
    },
}

impl IoToolError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new setup error
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    /// True when the error was raised before any I/O started
    pub fn is_pre_io(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Setup { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = IoToolError::config("threads must be positive");
        assert!(matches!(err, IoToolError::Config { .. }));
        assert!(err.is_pre_io());
    }

    #[test]
    fn test_short_write_display() {
        let err = IoToolError::ShortWrite {
            written: 100,
            requested: 512,
        };
        assert_eq!(err.to_string(), "Short write: 100 of 512 bytes");
        assert!(!err.is_pre_io());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::from_raw_os_error(libc::ENOSPC);
        let err: IoToolError = io.into();
        assert!(matches!(err, IoToolError::Io(_)));
    }
}
