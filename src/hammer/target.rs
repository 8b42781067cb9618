//! Target discovery and sizing for the I/O hammer.
//!
//! A target may be a regular file, a block or character device, or a
//! directory. Directories get a preallocated temporary file that is
//! unlinked while the per-worker descriptors stay open, so an aborted run
//! leaves nothing behind. Every worker gets its own descriptor against
//! the same target, each with an independent seek offset.

use std::fs::{ File, OpenOptions };
use std::io::{ Seek, SeekFrom, Write };
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use tracing::debug;

use crate::constants::PREALLOC_CHUNK;
use crate::error::{ IoToolError, Result };

/// An opened hammer target: one descriptor per worker plus the resolved
/// size in bytes
pub struct Target {
    /// Per-worker descriptors, independent seek offsets
    pub files: Vec<File>,
    /// Usable size of the target
    pub size: u64,
}

impl Target {
    /// Open `path` for `workers` descriptors. `requested_size` of 0 asks
    /// for the target's own size (illegal for directories); `writes`
    /// selects read-write access.
    pub fn open(path: &Path, requested_size: u64, workers: usize, writes: bool) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|_| {
            IoToolError::setup(format!("File/device/directory '{}' not found", path.display()))
        })?;
        let file_type = meta.file_type();

        if file_type.is_dir() {
            return Self::open_temp(path, requested_size, workers, writes);
        }
        if !file_type.is_file() && !file_type.is_block_device() && !file_type.is_char_device() {
            return Err(IoToolError::setup(format!("Unknown file type: {file_type:?}")));
        }

        let mut files = open_descriptors(path, workers, writes)?;
        let mut size = requested_size;
        if size == 0 {
            size = meta.len();
        }
        if size == 0 {
            // devices report a zero stat size; ask the descriptor instead
            size = files[0].seek(SeekFrom::End(0))?;
        }
        if size == 0 {
            return Err(
                IoToolError::setup(format!("Unable to determine size of '{}'", path.display()))
            );
        }
        Ok(Self { files, size })
    }

    fn open_temp(dir: &Path, size: u64, workers: usize, writes: bool) -> Result<Self> {
        if size == 0 {
            return Err(IoToolError::config("Size must be specified for temporary files"));
        }
        let temp = tempfile::Builder
            ::new()
            .prefix("iohammer.")
            .tempfile_in(dir)
            .map_err(|e| {
                IoToolError::setup(format!("Failed to create file in '{}': {e}", dir.display()))
            })?;
        eprintln!("Using temporary file '{}'.", temp.path().display());

        let files = open_descriptors(temp.path(), workers, writes)?;

        // unlink first; the open descriptors keep the blocks alive
        let (mut file, temp_path) = temp.into_parts();
        drop(temp_path);
        preallocate(&mut file, size)?;
        Ok(Self { files, size })
    }
}

fn open_descriptors(path: &Path, workers: usize, writes: bool) -> Result<Vec<File>> {
    let mut files = Vec::with_capacity(workers);
    for i in 0..workers {
        let file = OpenOptions::new()
            .read(true)
            .write(writes)
            .open(path)
            .map_err(|e| {
                IoToolError::setup(
                    format!("Failed to open fd {i} to file/device '{}': {e}", path.display())
                )
            })?;
        files.push(file);
    }
    Ok(files)
}

/// Write zeroes up to `size` so every block is allocated on disk: 64 KiB
/// chunks for speed, then single bytes for the residual tail, then fsync.
fn preallocate(file: &mut File, size: u64) -> Result<()> {
    debug!(size, "preallocating temporary target");
    let chunk = vec![0u8; PREALLOC_CHUNK];
    for _ in 0..size / (PREALLOC_CHUNK as u64) {
        file.write_all(&chunk)?;
    }
    for _ in 0..size % (PREALLOC_CHUNK as u64) {
        file.write_all(&[0])?;
    }
    file.sync_all()?;
    Ok(())
}
