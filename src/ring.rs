//! Bounded ring of pre-allocated buffers with multi-consumer fan-out.
//!
//! One producer fills slots in strict cyclic order; each consumer drains
//! them independently through its own occupancy counter and condition
//! variable. The producer stalls while the slowest consumer still holds
//! every slot, so the slowest sink throttles the whole pipeline while
//! faster sinks are free to race ahead.
//!
//! Slot payloads are handed out as raw slices; exclusivity comes from the
//! occupancy protocol, not the type system. A slot index is owned by the
//! producer from `acquire_empty` until `publish`, and readable by consumer
//! `c` from `acquire_full(c)` until `release(c)`.

use parking_lot::{ Condvar, Mutex };

use crate::abort::AbortFlag;
use crate::constants::ABORT_POLL_INTERVAL;
use crate::error::{ IoToolError, Result };
use crate::pool::BlockPool;

/// Outcome of a consumer's wait for data
#[derive(Debug, PartialEq, Eq)]
pub enum Consume {
    /// A slot is ready at the consumer's cursor; write `len` bytes of it
    Ready {
        /// Bytes valid in the slot: the block size, or the remainder for
        /// the final slot of a finished run
        len: usize,
    },
    /// The producer finished and this consumer has drained every slot
    Drained,
    /// Cooperative shutdown was requested
    Aborted,
}

struct RingState {
    /// Per-consumer count of slots filled but not yet released
    full: Vec<usize>,
    finished: bool,
    /// Valid bytes in the last slot of a finished run; set strictly
    /// before `finished`
    remainder: usize,
    partial_reads: u64,
    occupancy_sum: u64,
    occupancy_samples: u64,
}

/// Counters reported in pipeline summaries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingStats {
    /// Reads that returned fewer bytes than requested
    pub partial_reads: u64,
    /// Mean occupancy observed at each slot release
    pub avg_occupancy: f64,
}

/// Bounded producer/consumer buffer ring
pub struct BufferRing {
    pool: BlockPool,
    state: Mutex<RingState>,
    /// Signalled by consumers when a slot frees
    less: Condvar,
    /// Signalled per consumer when a slot fills
    more: Vec<Condvar>,
    abort: AbortFlag,
}

impl BufferRing {
    /// Build a ring over `pool` serving `consumers` independent readers
    pub fn new(pool: BlockPool, consumers: usize, abort: AbortFlag) -> Result<Self> {
        if consumers == 0 {
            return Err(IoToolError::config("at least one consumer required"));
        }
        Ok(Self {
            state: Mutex::new(RingState {
                full: vec![0; consumers],
                finished: false,
                remainder: 0,
                partial_reads: 0,
                occupancy_sum: 0,
                occupancy_samples: 0,
            }),
            less: Condvar::new(),
            more: (0..consumers).map(|_| Condvar::new()).collect(),
            abort,
            pool,
        })
    }

    /// Slots in the ring
    pub fn num_slots(&self) -> usize {
        self.pool.num_blocks()
    }

    /// Bytes per slot
    pub fn block_size(&self) -> usize {
        self.pool.block_size()
    }

    /// Independent consumers served by this ring
    pub fn consumers(&self) -> usize {
        self.more.len()
    }

    /// The abort flag shared with this ring's tasks
    pub fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    /// Request shutdown and wake every blocked task
    pub fn abort(&self) {
        self.abort.set();
        let _guard = self.state.lock();
        self.less.notify_all();
        for cond in &self.more {
            cond.notify_all();
        }
    }

    /// Block until the slot at the producer's cursor is free on every
    /// consumer. Returns false if shutdown was requested instead.
    pub fn acquire_empty(&self) -> bool {
        let mut st = self.state.lock();
        loop {
            if self.abort.is_set() {
                return false;
            }
            let max_full = st.full.iter().copied().max().unwrap_or(0);
            if max_full < self.pool.num_blocks() {
                return true;
            }
            self.less.wait_for(&mut st, ABORT_POLL_INTERVAL);
        }
    }

    /// Hand the slot at the producer's cursor to every consumer
    pub fn publish(&self) {
        let mut st = self.state.lock();
        for (count, cond) in st.full.iter_mut().zip(&self.more) {
            *count += 1;
            cond.notify_one();
        }
    }

    /// Count a read that returned fewer bytes than requested
    pub fn note_partial_read(&self) {
        self.state.lock().partial_reads += 1;
    }

    /// Mark end of input. `remainder` is the valid length of the final
    /// published slot; pass the block size when the last slot is full.
    /// Must be called before that final `publish`.
    pub fn finish(&self, remainder: usize) {
        let mut st = self.state.lock();
        st.remainder = remainder;
        st.finished = true;
        for cond in &self.more {
            cond.notify_all();
        }
    }

    /// Publish the final slot and mark end of input in one step, so no
    /// consumer can observe `finished` without the slot or the slot
    /// without the remainder. Used when the producer ends mid-slot;
    /// `remainder` may be 0 for an exactly-aligned finish.
    pub fn finish_publish(&self, remainder: usize) {
        let mut st = self.state.lock();
        st.remainder = remainder;
        st.finished = true;
        for (count, cond) in st.full.iter_mut().zip(&self.more) {
            *count += 1;
            cond.notify_all();
        }
    }

    /// Block until consumer `c` has a slot to drain, input is exhausted,
    /// or shutdown is requested
    pub fn acquire_full(&self, c: usize) -> Consume {
        let mut st = self.state.lock();
        loop {
            if self.abort.is_set() {
                return Consume::Aborted;
            }
            if st.full[c] > 0 {
                let len = if st.finished && st.full[c] == 1 {
                    st.remainder
                } else {
                    self.pool.block_size()
                };
                return Consume::Ready { len };
            }
            if st.finished {
                return Consume::Drained;
            }
            self.more[c].wait_for(&mut st, ABORT_POLL_INTERVAL);
        }
    }

    /// Return consumer `c`'s current slot to the producer
    pub fn release(&self, c: usize) {
        let mut st = self.state.lock();
        st.full[c] -= 1;
        st.occupancy_sum += st.full[c] as u64;
        st.occupancy_samples += 1;
        self.less.notify_one();
    }

    /// Summary counters accumulated over the run
    pub fn stats(&self) -> RingStats {
        let st = self.state.lock();
        RingStats {
            partial_reads: st.partial_reads,
            avg_occupancy: if st.occupancy_samples > 0 {
                st.occupancy_sum as f64 / st.occupancy_samples as f64
            } else {
                0.0
            },
        }
    }

    /// # Safety: caller is consumer-side owner of `index` per the
    /// occupancy protocol
    pub unsafe fn slot(&self, index: usize) -> &[u8] {
        self.pool.block(index)
    }

    /// # Safety: caller is the producer and owns `index` exclusively per
    /// the occupancy protocol
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut(&self, index: usize) -> &mut [u8] {
        self.pool.block_mut(index)
    }
}
