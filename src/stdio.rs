//! Claiming standard descriptors away from buffered stdio.
//!
//! Pipeline data must go through raw descriptors: stdout is dup'd onto a
//! private fd and the original closed so no line-buffering layer can
//! interpose between the writers and the pipe. Summaries and diagnostics
//! use the error stream and are unaffected.

use std::fs::File;
use std::os::fd::FromRawFd;

use crate::error::{ IoToolError, Result };

/// Move standard output onto a private descriptor and close the original
pub fn claim_stdout() -> Result<File> {
    claim_fd(libc::STDOUT_FILENO, "stdout")
}

/// Move standard input onto a private descriptor and close the original
pub fn claim_stdin() -> Result<File> {
    claim_fd(libc::STDIN_FILENO, "stdin")
}

fn claim_fd(fd: libc::c_int, name: &str) -> Result<File> {
    // SAFETY: plain dup of a descriptor this process owns
    let duped = unsafe { libc::dup(fd) };
    if duped < 0 {
        return Err(
            IoToolError::setup(
                format!("dup on {name} failed: {}", std::io::Error::last_os_error())
            )
        );
    }
    // SAFETY: the original is ours to close; the dup keeps the stream open
    unsafe {
        libc::close(fd);
    }
    // SAFETY: duped is fresh and owned by nobody else
    Ok(unsafe { File::from_raw_fd(duped) })
}
