//! Pre-allocated block storage for the pipelines.
//!
//! One contiguous region of `num_blocks * block_size` bytes, allocated at
//! startup and alive until process exit. Two backings: an ordinary heap
//! allocation, and an anonymous memory map (feature `shared-mem`) matching
//! the shared-memory allocator used by the multi-process pipelines. The
//! contract is identical either way: a zeroed, writable region carved into
//! fixed-size blocks.

use crate::constants::MIN_NUM_BUFS;
use crate::error::{ IoToolError, Result };

enum Backing {
    Heap(#[allow(dead_code)] Box<[u8]>),
    #[cfg(feature = "shared-mem")]
    Shared(#[allow(dead_code)] memmap2::MmapMut),
}

/// Fixed-size block storage reused cyclically by the rings
pub struct BlockPool {
    // Keeps the region alive; all access goes through `ptr`
    _backing: Backing,
    ptr: *mut u8,
    block_size: usize,
    num_blocks: usize,
}

impl BlockPool {
    /// Allocate storage for `num_blocks` blocks of `block_size` bytes,
    /// using the backing selected at build time
    pub fn allocate(num_blocks: usize, block_size: usize) -> Result<Self> {
        #[cfg(feature = "shared-mem")]
        {
            Self::shared(num_blocks, block_size)
        }
        #[cfg(not(feature = "shared-mem"))]
        {
            Self::heap(num_blocks, block_size)
        }
    }

    /// Ordinary heap backing
    pub fn heap(num_blocks: usize, block_size: usize) -> Result<Self> {
        let len = Self::region_len(num_blocks, block_size)?;
        let mut region = vec![0u8; len].into_boxed_slice();
        let ptr = region.as_mut_ptr();
        Ok(Self {
            _backing: Backing::Heap(region),
            ptr,
            block_size,
            num_blocks,
        })
    }

    /// Anonymous memory-map backing, page-aligned and zeroed by the kernel
    #[cfg(feature = "shared-mem")]
    pub fn shared(num_blocks: usize, block_size: usize) -> Result<Self> {
        let len = Self::region_len(num_blocks, block_size)?;
        let mut map = memmap2::MmapOptions::new()
            .len(len)
            .map_anon()
            .map_err(|e| IoToolError::setup(format!("mmap for {len} bytes failed: {e}")))?;
        let ptr = map.as_mut_ptr();
        Ok(Self {
            _backing: Backing::Shared(map),
            ptr,
            block_size,
            num_blocks,
        })
    }

    fn region_len(num_blocks: usize, block_size: usize) -> Result<usize> {
        if block_size == 0 {
            return Err(IoToolError::config("block size must be positive"));
        }
        if num_blocks < MIN_NUM_BUFS {
            return Err(
                IoToolError::config(format!("buffer count must be at least {MIN_NUM_BUFS}"))
            );
        }
        num_blocks
            .checked_mul(block_size)
            .ok_or_else(|| IoToolError::config("buffer region size overflows"))
    }

    /// Bytes per block
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks in the pool
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// # Safety: `index` in range; the occupancy protocol must guarantee
    /// no writer holds this slot
    pub unsafe fn block(&self, index: usize) -> &[u8] {
        debug_assert!(index < self.num_blocks);
        std::slice::from_raw_parts(self.ptr.add(index * self.block_size), self.block_size)
    }

    /// # Safety: `index` in range; the occupancy protocol must guarantee
    /// exclusive ownership of this slot
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn block_mut(&self, index: usize) -> &mut [u8] {
        debug_assert!(index < self.num_blocks);
        std::slice::from_raw_parts_mut(self.ptr.add(index * self.block_size), self.block_size)
    }
}

// Access is arbitrated by the ring occupancy counters; the pool itself is
// just storage.
unsafe impl Send for BlockPool {}
unsafe impl Sync for BlockPool {}
