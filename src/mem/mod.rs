//! # Memory Pools
//!
//! Deterministic, heap-free memory management:
//!
//! - [`BytePool`]: variable-size allocations carved first-fit out of a
//!   static arena. Thread stacks, queue rings and block pool regions all
//!   come from a byte pool.
//! - [`BlockPool`]: uniform fixed-size blocks over a byte pool region with
//!   O(1) allocate and release.
//!
//! Allocations are addressed by validated handles ([`ByteBlock`],
//! [`Block`]) rather than raw pointers; the bytes behind a handle are
//! reached through the kernel, which checks the handle against the
//! pool's bookkeeping first.

pub mod block_pool;
pub mod byte_pool;

pub use block_pool::{Block, BlockPool, BlockPoolId, BlockPoolInfo};
pub use byte_pool::{ByteBlock, BytePool, BytePoolId, BytePoolInfo};
