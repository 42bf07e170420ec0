//! # Block Pool
//!
//! Fixed-size blocks laid out back to back in a byte pool region. Free
//! blocks sit on a LIFO stack of indices, so allocate and release are
//! O(1). Every block carries an in-use tag kept outside the region; a
//! release is checked against it, which catches blocks from another pool,
//! indices out of range, and double releases.

use crate::config::MAX_POOL_BLOCKS;
use crate::error::{Error, Result};
use crate::mem::ByteBlock;
use crate::mem_log;
use crate::table::Handle;
use crate::thread::{Completion, Delivery, Suspension};
use crate::time::Timeout;
use crate::wait::{WaitOrder, WaitQueue};
use crate::Kernel;

pub type BlockPoolId = Handle<BlockPool>;

const WORD: usize = core::mem::size_of::<u32>();

/// One block of a block pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pool: BlockPoolId,
    index: u16,
}

impl Block {
    pub fn pool(&self) -> BlockPoolId {
        self.pool
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

pub struct BlockPool {
    pub name: &'static str,
    pub(crate) region: ByteBlock,
    block_size: usize,
    total: usize,
    free: [u16; MAX_POOL_BLOCKS],
    free_count: usize,
    in_use: [bool; MAX_POOL_BLOCKS],
    pub(crate) waiters: WaitQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPoolInfo {
    pub name: &'static str,
    pub block_size: usize,
    pub available: usize,
    pub total: usize,
    pub waiting: usize,
}

impl BlockPool {
    fn pop(&mut self) -> Option<u16> {
        self.free_count = self.free_count.checked_sub(1)?;
        let index = self.free[self.free_count];
        self.in_use[index as usize] = true;
        Some(index)
    }

    fn push(&mut self, index: u16) {
        self.in_use[index as usize] = false;
        self.free[self.free_count] = index;
        self.free_count += 1;
    }

    fn check(&self, block: Block) -> Result<()> {
        if block.index() >= self.total || !self.in_use[block.index()] {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

impl Kernel {
    /// Create a pool of `block_size`-byte blocks over `region`, a live
    /// byte pool allocation. The block size is rounded up to a whole word.
    pub fn block_pool_create(
        &mut self,
        name: &'static str,
        block_size: usize,
        region: ByteBlock,
    ) -> Result<BlockPoolId> {
        if block_size == 0 {
            return Err(Error::InvalidParameter);
        }
        let block_size = block_size.next_multiple_of(WORD);
        let total = (region.len() / block_size).min(MAX_POOL_BLOCKS);
        if total == 0 {
            return Err(Error::InvalidParameter);
        }
        self.byte_pools.get_mut(region.pool())?.bytes_mut(region)?;

        let mut free = [0u16; MAX_POOL_BLOCKS];
        // lowest block on top of the stack
        for (slot, index) in free[..total].iter_mut().zip((0..total as u16).rev()) {
            *slot = index;
        }
        let id = self.block_pools.insert(BlockPool {
            name,
            region,
            block_size,
            total,
            free,
            free_count: total,
            in_use: [false; MAX_POOL_BLOCKS],
            waiters: WaitQueue::new(WaitOrder::Fifo),
        })?;
        mem_log!(info, "block pool {=str} created, {=usize} blocks", name, total);
        Ok(id)
    }

    /// Take one block. Suspends the caller while the pool is empty; with
    /// no wait the request fails with [`Error::PoolExhausted`].
    pub fn block_allocate(&mut self, id: BlockPoolId, timeout: Timeout) -> Completion<Block> {
        Completion::flatten(self.block_allocate_inner(id, timeout))
    }

    fn block_allocate_inner(
        &mut self,
        id: BlockPoolId,
        timeout: Timeout,
    ) -> Result<Completion<Block>> {
        if let Some(index) = self.block_pools.get_mut(id)?.pop() {
            return Ok(Completion::ok(Block { pool: id, index }));
        }
        if timeout.is_no_wait() {
            return Err(Error::PoolExhausted);
        }
        let (caller, priority) = self.block_caller(Suspension::BlockPool(id), timeout)?;
        self.block_pools.get_mut(id)?.waiters.push(caller, priority)?;
        Ok(Completion::Suspended)
    }

    /// Return a block. If a thread is waiting the block goes straight to
    /// the oldest waiter.
    pub fn block_release(&mut self, block: Block) -> Result<()> {
        let pool = self.block_pools.get_mut(block.pool)?;
        if let Err(e) = pool.check(block) {
            mem_log!(error, "block {=usize} released but not allocated", block.index());
            return Err(e);
        }
        let waiter = pool.waiters.pop_front();
        match waiter {
            Some(waiter) => self.wake(waiter, Ok(Delivery::Block(block))),
            None => pool.push(block.index),
        }
        Ok(())
    }

    /// The bytes of an allocated block.
    pub fn block_bytes_mut(&mut self, block: Block) -> Result<&mut [u8]> {
        let pool = self.block_pools.get(block.pool)?;
        pool.check(block)?;
        let start = block.index() * pool.block_size;
        let end = start + pool.block_size;
        let region = self
            .byte_pools
            .get_mut(pool.region.pool())?
            .bytes_mut(pool.region)?;
        Ok(&mut region[start..end])
    }

    pub fn block_pool_info(&self, id: BlockPoolId) -> Result<BlockPoolInfo> {
        let pool = self.block_pools.get(id)?;
        Ok(BlockPoolInfo {
            name: pool.name,
            block_size: pool.block_size,
            available: pool.free_count,
            total: pool.total,
            waiting: pool.waiters.len(),
        })
    }
}
