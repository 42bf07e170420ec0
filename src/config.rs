//! # rtcore Configuration
//!
//! Compile-time constants governing the kernel and its object tables.
//! All limits are fixed at compile time; there is no dynamic allocation.

/// Maximum number of threads the kernel can manage simultaneously.
/// This bounds the static thread table and every wait queue.
pub const MAX_THREADS: usize = 10;

/// Number of priority levels. Priority `0` is the most urgent,
/// `MAX_PRIORITIES - 1` the least.
pub const MAX_PRIORITIES: u8 = 32;

/// Smallest stack region a thread may be created with. Must hold the
/// initial exception frame (64 bytes) plus a usable call depth.
pub const MIN_STACK_SIZE: usize = 256;

/// Capacity of each object table.
pub const MAX_SEMAPHORES: usize = 4;
pub const MAX_MUTEXES: usize = 4;
pub const MAX_EVENT_FLAGS: usize = 4;
pub const MAX_QUEUES: usize = 4;
pub const MAX_BYTE_POOLS: usize = 2;
pub const MAX_BLOCK_POOLS: usize = 2;

/// Largest message a queue can carry, in 32-bit words.
pub const MAX_MESSAGE_WORDS: usize = 16;

/// Maximum number of segments (free or allocated) a byte pool tracks.
/// When the table is full an allocation takes a whole free segment
/// instead of splitting it.
pub const BYTE_POOL_MAX_SEGMENTS: usize = 32;

/// Byte pool allocation granularity.
pub const BYTE_POOL_ALIGN: usize = 8;

/// A split leaves a new free segment only if the remainder is at least
/// this large; smaller remainders stay with the allocation.
pub const BYTE_POOL_MIN_FRAGMENT: usize = 16;

/// Maximum number of blocks one block pool manages.
pub const MAX_POOL_BLOCKS: usize = 128;

/// SysTick frequency in Hz. One tick is the unit of every timeout,
/// sleep and time slice.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F103 on an 8 MHz HSE, PLL to 24 MHz).
pub const SYSTEM_CLOCK_HZ: u32 = 24_000_000;

/// Stack size of the idle context that runs when no thread is ready.
pub const IDLE_STACK_SIZE: usize = 256;
