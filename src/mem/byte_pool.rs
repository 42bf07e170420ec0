//! # Byte Pool
//!
//! Variable-size allocation from a static arena. The arena is described
//! by a segment table kept outside the arena itself: an ordered list of
//! contiguous segments, each free or allocated, that together cover the
//! usable arena.
//!
//! ## Allocation
//!
//! Requests are rounded up to `BYTE_POOL_ALIGN` bytes and served
//! first-fit from the lowest address. A free segment larger than the
//! request is split when the remainder would be at least
//! `BYTE_POOL_MIN_FRAGMENT` bytes and the segment table has room;
//! otherwise the whole segment is handed out.
//!
//! ## Release
//!
//! A released segment merges with free neighbours on both sides. The
//! pool then serves its waiters in arrival order, stopping at the first
//! request that still does not fit.

use crate::config::{BYTE_POOL_ALIGN, BYTE_POOL_MAX_SEGMENTS, BYTE_POOL_MIN_FRAGMENT};
use crate::error::{Error, Result};
use crate::mem_log;
use crate::table::Handle;
use crate::thread::{Completion, Delivery, Suspension, ThreadState};
use crate::time::Timeout;
use crate::wait::{WaitOrder, WaitQueue};
use crate::Kernel;

pub type BytePoolId = Handle<BytePool>;

/// An allocation from a byte pool: `len` usable bytes at `offset` into
/// the pool's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteBlock {
    pool: BytePoolId,
    offset: u32,
    len: u32,
}

impl ByteBlock {
    pub(crate) fn new(pool: BytePoolId, offset: usize, len: usize) -> Self {
        Self {
            pool,
            offset: offset as u32,
            len: len as u32,
        }
    }

    pub fn pool(&self) -> BytePoolId {
        self.pool
    }

    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` if both blocks share at least one byte of the same arena.
    pub fn overlaps(&self, other: &ByteBlock) -> bool {
        self.pool == other.pool
            && self.offset < other.offset + other.len
            && other.offset < self.offset + self.len
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    offset: usize,
    len: usize,
    allocated: bool,
}

impl Segment {
    const EMPTY: Segment = Segment {
        offset: 0,
        len: 0,
        allocated: false,
    };
}

pub struct BytePool {
    pub name: &'static str,
    arena: &'static mut [u8],
    segments: [Segment; BYTE_POOL_MAX_SEGMENTS],
    segment_count: usize,
    pub(crate) waiters: WaitQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytePoolInfo {
    pub name: &'static str,
    /// Total bytes in free segments.
    pub available: usize,
    /// Number of segments, free and allocated.
    pub fragments: usize,
    pub waiting: usize,
}

const fn round_up(size: usize) -> usize {
    (size + BYTE_POOL_ALIGN - 1) & !(BYTE_POOL_ALIGN - 1)
}

impl BytePool {
    fn new(name: &'static str, arena: &'static mut [u8]) -> Result<Self> {
        // usable area starts and ends on the allocation granularity
        let start = arena.as_ptr().align_offset(BYTE_POOL_ALIGN);
        let len = arena.len().saturating_sub(start) & !(BYTE_POOL_ALIGN - 1);
        if start == usize::MAX || len < BYTE_POOL_MIN_FRAGMENT {
            return Err(Error::InvalidParameter);
        }
        let mut segments = [Segment::EMPTY; BYTE_POOL_MAX_SEGMENTS];
        segments[0] = Segment {
            offset: start,
            len,
            allocated: false,
        };
        Ok(Self {
            name,
            arena,
            segments,
            segment_count: 1,
            waiters: WaitQueue::new(WaitOrder::Fifo),
        })
    }

    fn segments(&self) -> &[Segment] {
        &self.segments[..self.segment_count]
    }

    /// First-fit allocation. Returns `(offset, len)` of the new block.
    fn allocate(&mut self, size: usize) -> Option<(usize, usize)> {
        let size = round_up(size);
        let at = self
            .segments()
            .iter()
            .position(|s| !s.allocated && s.len >= size)?;

        let remainder = self.segments[at].len - size;
        if remainder >= BYTE_POOL_MIN_FRAGMENT && self.segment_count < BYTE_POOL_MAX_SEGMENTS {
            self.segments.copy_within(at + 1..self.segment_count, at + 2);
            self.segments[at + 1] = Segment {
                offset: self.segments[at].offset + size,
                len: remainder,
                allocated: false,
            };
            self.segments[at].len = size;
            self.segment_count += 1;
        }
        self.segments[at].allocated = true;
        Some((self.segments[at].offset, size))
    }

    /// Index of the allocated segment that backs `block`.
    fn find(&self, block: ByteBlock) -> Result<usize> {
        self.segments()
            .iter()
            .position(|s| s.allocated && s.offset == block.offset() && s.len >= block.len())
            .ok_or(Error::InvalidParameter)
    }

    fn release(&mut self, block: ByteBlock) -> Result<()> {
        let at = self.find(block)?;
        self.segments[at].allocated = false;

        if at + 1 < self.segment_count && !self.segments[at + 1].allocated {
            self.segments[at].len += self.segments[at + 1].len;
            self.remove_segment(at + 1);
        }
        if at > 0 && !self.segments[at - 1].allocated {
            self.segments[at - 1].len += self.segments[at].len;
            self.remove_segment(at);
        }
        Ok(())
    }

    fn remove_segment(&mut self, at: usize) {
        self.segments.copy_within(at + 1..self.segment_count, at);
        self.segment_count -= 1;
    }

    /// The bytes behind `block`, which must be a live allocation of this
    /// pool.
    pub fn bytes_mut(&mut self, block: ByteBlock) -> Result<&mut [u8]> {
        self.find(block)?;
        Ok(&mut self.arena[block.offset()..block.offset() + block.len()])
    }

    pub fn available(&self) -> usize {
        self.segments()
            .iter()
            .filter(|s| !s.allocated)
            .map(|s| s.len)
            .sum()
    }
}

impl Kernel {
    /// Create a byte pool managing `arena`. The arena is owned by the
    /// pool for the life of the kernel.
    pub fn byte_pool_create(
        &mut self,
        name: &'static str,
        arena: &'static mut [u8],
    ) -> Result<BytePoolId> {
        let pool = BytePool::new(name, arena)?;
        mem_log!(info, "byte pool {=str} created, {=usize} bytes", name, pool.available());
        self.byte_pools.insert(pool)
    }

    /// Allocate `size` bytes. Suspends the caller while no free segment
    /// is large enough; with no wait the request fails with
    /// [`Error::PoolExhausted`].
    pub fn byte_allocate(
        &mut self,
        id: BytePoolId,
        size: usize,
        timeout: Timeout,
    ) -> Completion<ByteBlock> {
        Completion::flatten(self.byte_allocate_inner(id, size, timeout))
    }

    fn byte_allocate_inner(
        &mut self,
        id: BytePoolId,
        size: usize,
        timeout: Timeout,
    ) -> Result<Completion<ByteBlock>> {
        let pool = self.byte_pools.get_mut(id)?;
        // larger than the whole arena can never be satisfied
        if size == 0 || size > pool.arena.len() {
            return Err(Error::InvalidParameter);
        }
        if let Some((offset, len)) = pool.allocate(size) {
            return Ok(Completion::ok(ByteBlock::new(id, offset, len)));
        }
        if timeout.is_no_wait() {
            mem_log!(debug, "byte pool exhausted for {=usize} bytes", size);
            return Err(Error::PoolExhausted);
        }
        let (caller, priority) = self.block_caller(Suspension::BytePool { pool: id, size }, timeout)?;
        self.byte_pools.get_mut(id)?.waiters.push(caller, priority)?;
        Ok(Completion::Suspended)
    }

    /// Return `block` to its pool and serve waiting allocations.
    pub fn byte_release(&mut self, block: ByteBlock) -> Result<()> {
        let id = block.pool();
        let in_use_as_stack = self
            .threads
            .iter()
            .any(|(_, t)| t.state != ThreadState::Terminated && t.stack.overlaps(&block));
        if in_use_as_stack {
            mem_log!(error, "release of a live thread stack rejected");
            return Err(Error::InvalidParameter);
        }
        let in_use_as_storage = self.queues.iter().any(|(_, q)| q.storage.overlaps(&block))
            || self.block_pools.iter().any(|(_, p)| p.region.overlaps(&block));
        if in_use_as_storage {
            mem_log!(error, "release of live queue or block pool storage rejected");
            return Err(Error::InvalidParameter);
        }
        self.byte_pools.get_mut(id)?.release(block)?;

        loop {
            let pool = self.byte_pools.get_mut(id)?;
            let Some(waiter) = pool.waiters.front() else {
                break;
            };
            let Some(Suspension::BytePool { size, .. }) = self.suspension_of(waiter) else {
                // not waiting on this pool any more; drop the stale entry
                self.byte_pools.get_mut(id)?.waiters.remove(waiter);
                continue;
            };
            let pool = self.byte_pools.get_mut(id)?;
            let Some((offset, len)) = pool.allocate(size) else {
                break;
            };
            pool.waiters.pop_front();
            self.wake(waiter, Ok(Delivery::Bytes(ByteBlock::new(id, offset, len))));
        }
        Ok(())
    }

    pub fn byte_pool_info(&self, id: BytePoolId) -> Result<BytePoolInfo> {
        let pool = self.byte_pools.get(id)?;
        Ok(BytePoolInfo {
            name: pool.name,
            available: pool.available(),
            fragments: pool.segment_count,
            waiting: pool.waiters.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::MessageSize;
    use crate::testing::{kernel_with_pool, spawn};

    fn pool_of(size: usize) -> (Kernel, BytePoolId) {
        let mut k = Kernel::new();
        let arena: &'static mut [u8] =
            Box::leak(vec![0u8; size + BYTE_POOL_ALIGN].into_boxed_slice());
        let start = arena.as_ptr().align_offset(BYTE_POOL_ALIGN);
        let arena = &mut arena[start..start + size];
        let id = k.byte_pool_create("p", arena).unwrap();
        (k, id)
    }

    fn alloc(k: &mut Kernel, id: BytePoolId, size: usize) -> Result<ByteBlock> {
        k.byte_allocate(id, size, Timeout::NoWait).done().unwrap()
    }

    #[test]
    fn test_first_fit_from_lowest_address() {
        let (mut k, id) = pool_of(256);
        let a = alloc(&mut k, id, 10).unwrap();
        let b = alloc(&mut k, id, 32).unwrap();
        assert_eq!(a.len(), 16);
        assert!(b.offset() > a.offset());
        assert!(!a.overlaps(&b));

        k.byte_release(a).unwrap();
        let c = alloc(&mut k, id, 8).unwrap();
        assert_eq!(c.offset(), a.offset());
    }

    #[test]
    fn test_release_coalesces_neighbours() {
        let (mut k, id) = pool_of(256);
        let a = alloc(&mut k, id, 64).unwrap();
        let b = alloc(&mut k, id, 64).unwrap();
        let c = alloc(&mut k, id, 64).unwrap();
        k.byte_release(a).unwrap();
        k.byte_release(c).unwrap();
        k.byte_release(b).unwrap();
        let info = k.byte_pool_info(id).unwrap();
        assert_eq!(info.available, 256);
        assert_eq!(info.fragments, 1);
        assert!(alloc(&mut k, id, 256).is_ok());
    }

    #[test]
    fn test_small_remainder_stays_with_allocation() {
        let (mut k, id) = pool_of(64);
        let a = alloc(&mut k, id, 56).unwrap();
        assert_eq!(k.byte_pool_info(id).unwrap().available, 0);
        assert_eq!(alloc(&mut k, id, 8), Err(Error::PoolExhausted));
        k.byte_release(a).unwrap();
        assert_eq!(k.byte_pool_info(id).unwrap().available, 64);
    }

    #[test]
    fn test_double_release_rejected() {
        let (mut k, id) = pool_of(128);
        let a = alloc(&mut k, id, 32).unwrap();
        k.byte_release(a).unwrap();
        assert_eq!(k.byte_release(a), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_zero_size_rejected() {
        let (mut k, id) = pool_of(128);
        assert_eq!(alloc(&mut k, id, 0), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_bytes_are_reachable_only_while_allocated() {
        let (mut k, id) = pool_of(128);
        let a = alloc(&mut k, id, 16).unwrap();
        let bytes = k.byte_pools.get_mut(id).unwrap().bytes_mut(a).unwrap();
        bytes.fill(0xAB);
        assert_eq!(bytes.len(), 16);
        k.byte_release(a).unwrap();
        assert!(k.byte_pools.get_mut(id).unwrap().bytes_mut(a).is_err());
    }

    #[test]
    fn test_release_serves_waiter() {
        let (mut k, stacks) = kernel_with_pool();
        let arena: &'static mut [u8] = Box::leak(vec![0u8; 72].into_boxed_slice());
        let id = k.byte_pool_create("small", arena).unwrap();
        let whole = alloc(&mut k, id, 64).unwrap();

        let waiter = spawn(&mut k, stacks, 4, 0);
        k.start();
        assert_eq!(k.schedule(), Some(waiter));
        assert!(k.byte_allocate(id, 32, Timeout::Forever).is_suspended());
        assert_eq!(k.byte_pool_info(id).unwrap().waiting, 1);

        k.byte_release(whole).unwrap();
        match k.take_outcome(waiter) {
            Ok(Delivery::Bytes(block)) => assert_eq!(block.len(), 32),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(k.byte_pool_info(id).unwrap().waiting, 0);
    }

    #[test]
    fn test_live_stack_cannot_be_released() {
        let (mut k, stacks) = kernel_with_pool();
        let t = spawn(&mut k, stacks, 4, 0);
        let stack = k.threads.get(t).unwrap().stack;
        assert_eq!(k.byte_release(stack), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_oversized_request_rejected() {
        let (mut k, id) = pool_of(128);
        assert_eq!(alloc(&mut k, id, usize::MAX), Err(Error::InvalidParameter));
        assert_eq!(alloc(&mut k, id, 129), Err(Error::InvalidParameter));
        assert_eq!(
            k.byte_allocate(id, usize::MAX, Timeout::Forever),
            Completion::Done(Err(Error::InvalidParameter))
        );
        assert_eq!(k.byte_pool_info(id).unwrap().available, 128);
    }

    #[test]
    fn test_live_queue_storage_cannot_be_released() {
        let (mut k, id) = pool_of(128);
        let storage = alloc(&mut k, id, 16).unwrap();
        let queue = k.queue_create("q", MessageSize::One, storage).unwrap();
        assert_eq!(k.byte_release(storage), Err(Error::InvalidParameter));

        // the ring is still exclusively the queue's
        let other = alloc(&mut k, id, 16).unwrap();
        assert!(!other.overlaps(&storage));
        assert_eq!(k.queue_send(queue, &[0xDEAD_BEEF], Timeout::NoWait), Completion::Done(Ok(())));
        let bytes = k.byte_pools.get_mut(id).unwrap().bytes_mut(other).unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_live_block_pool_region_cannot_be_released() {
        let (mut k, id) = pool_of(128);
        let region = alloc(&mut k, id, 32).unwrap();
        k.block_pool_create("blocks", 8, region).unwrap();
        assert_eq!(k.byte_release(region), Err(Error::InvalidParameter));
        assert_eq!(k.byte_pool_info(id).unwrap().available, 96);
    }
}
