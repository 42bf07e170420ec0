//! # Demo Application
//!
//! Eight threads of different priorities exercising every kernel object:
//!
//! | Thread | Priority | Slice | Behavior |
//! |--------|----------|-------|----------|
//! | 0 | 1  | -   | sleeps 100 ticks, then sets event flag `0x1` |
//! | 1 | 16 | 4   | sends a running count to queue 0 |
//! | 2 | 16 | 4   | receives from queue 0 and checks the order |
//! | 3, 4 | 8 | - | compete for semaphore 0, holding it for 2 ticks |
//! | 5 | 4  | -   | waits for event flag `0x1` with clear-on-read |
//! | 6, 7 | 8 | - | take mutex 0 twice, hold it 2 ticks, release twice |
//!
//! A thread whose service call fails leaves its loop and terminates; the
//! others keep running.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;

use crate::console::{Console, PutChar};
use crate::error::{Error, Result};
use crate::kernel;
use crate::mem::{BlockPoolId, ByteBlock, BytePoolId};
use crate::sync::{
    EventFlagsId, FlagsSet, FlagsWait, Inherit, MessageSize, MutexId, QueueId, SemaphoreId,
};
use crate::thread::{Priority, ThreadEntry, ThreadSpec};
use crate::time::Timeout;
use crate::{demo_log, Kernel};

pub const STACK_SIZE: usize = 1024;
pub const BYTE_POOL_SIZE: usize = 9120;
pub const BLOCK_POOL_SIZE: usize = 100;
/// Queue capacity in one-word messages.
pub const QUEUE_SIZE: usize = 100;

pub const EVENT_FLAG: u32 = 0x1;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

pub static THREAD_0_COUNTER: AtomicU32 = AtomicU32::new(0);
pub static THREAD_1_COUNTER: AtomicU32 = AtomicU32::new(0);
pub static THREAD_1_MESSAGES_SENT: AtomicU32 = AtomicU32::new(0);
pub static THREAD_2_COUNTER: AtomicU32 = AtomicU32::new(0);
pub static THREAD_2_MESSAGES_RECEIVED: AtomicU32 = AtomicU32::new(0);
pub static THREAD_3_COUNTER: AtomicU32 = AtomicU32::new(0);
pub static THREAD_4_COUNTER: AtomicU32 = AtomicU32::new(0);
pub static THREAD_5_COUNTER: AtomicU32 = AtomicU32::new(0);
pub static THREAD_6_COUNTER: AtomicU32 = AtomicU32::new(0);
pub static THREAD_7_COUNTER: AtomicU32 = AtomicU32::new(0);

fn bump(counter: &AtomicU32) -> u32 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// Handles of every object the demo threads use.
#[derive(Clone, Copy)]
pub struct Objects {
    pub byte_pool: BytePoolId,
    pub block_pool: BlockPoolId,
    pub queue: QueueId,
    pub semaphore: SemaphoreId,
    pub event_flags: EventFlagsId,
    pub mutex: MutexId,
    pub console: Console,
}

static OBJECTS: Mutex<Cell<Option<Objects>>> = Mutex::new(Cell::new(None));

fn objects() -> Option<Objects> {
    critical_section::with(|cs| OBJECTS.borrow(cs).get())
}

/// `print!`-style output through the demo console.
macro_rules! say {
    ($objects:expr, $($arg:tt)*) => {
        $objects.console.print(format_args!($($arg)*))
    };
}

struct ThreadDef {
    name: &'static str,
    entry: ThreadEntry,
    input: u32,
    priority: Priority,
    time_slice: u32,
}

impl ThreadDef {
    const fn new(
        name: &'static str,
        entry: ThreadEntry,
        input: u32,
        priority: Priority,
        time_slice: u32,
    ) -> Self {
        Self {
            name,
            entry,
            input,
            priority,
            time_slice,
        }
    }
}

const THREADS: [ThreadDef; 8] = [
    ThreadDef::new("thread 0", thread_0_entry, 0, 1, 0),
    ThreadDef::new("thread 1", thread_1_entry, 1, 16, 4),
    ThreadDef::new("thread 2", thread_2_entry, 2, 16, 4),
    ThreadDef::new("thread 3", thread_3_and_4_entry, 3, 8, 0),
    ThreadDef::new("thread 4", thread_3_and_4_entry, 4, 8, 0),
    ThreadDef::new("thread 5", thread_5_entry, 5, 4, 0),
    ThreadDef::new("thread 6", thread_6_and_7_entry, 6, 8, 0),
    ThreadDef::new("thread 7", thread_6_and_7_entry, 7, 8, 0),
];

/// Create the initial system: pools, threads and objects. Publishes the
/// object handles for the thread bodies.
pub fn define(k: &mut Kernel, arena: &'static mut [u8], put_char: PutChar) -> Result<Objects> {
    let byte_pool = k.byte_pool_create("byte pool 0", arena)?;

    for def in &THREADS {
        let stack = allocate(k, byte_pool, STACK_SIZE)?;
        k.thread_create(ThreadSpec {
            name: def.name,
            entry: def.entry,
            input: def.input,
            stack,
            priority: def.priority,
            time_slice: def.time_slice,
            auto_start: true,
        })?;
    }

    let ring = allocate(k, byte_pool, QUEUE_SIZE * core::mem::size_of::<u32>())?;
    let queue = k.queue_create("queue 0", MessageSize::One, ring)?;
    let semaphore = k.semaphore_create("semaphore 0", 1)?;
    let event_flags = k.event_flags_create("event flags 0")?;
    let mutex = k.mutex_create("mutex 0", Inherit::No)?;
    let output = k.mutex_create("mutex output", Inherit::No)?;

    let region = allocate(k, byte_pool, BLOCK_POOL_SIZE)?;
    let block_pool = k.block_pool_create("block pool 0", core::mem::size_of::<u32>(), region)?;

    // allocate a block and give it straight back
    let block = k
        .block_allocate(block_pool, Timeout::NoWait)
        .done()
        .ok_or(Error::WaitError)??;
    k.block_release(block)?;

    let objects = Objects {
        byte_pool,
        block_pool,
        queue,
        semaphore,
        event_flags,
        mutex,
        console: Console::new(output, put_char),
    };
    critical_section::with(|cs| OBJECTS.borrow(cs).set(Some(objects)));
    demo_log!(info, "demo defined");
    Ok(objects)
}

fn allocate(k: &mut Kernel, pool: BytePoolId, size: usize) -> Result<ByteBlock> {
    k.byte_allocate(pool, size, Timeout::NoWait)
        .done()
        .ok_or(Error::WaitError)?
}

// ---------------------------------------------------------------------------
// Thread bodies
// ---------------------------------------------------------------------------

extern "C" fn thread_0_entry(_input: u32) {
    let Some(objects) = objects() else { return };
    // sits in a sleep loop, waking thread 5 each round
    loop {
        let count = bump(&THREAD_0_COUNTER);
        if say!(objects, "thread 0 count= {}\n", count).is_err() {
            break;
        }
        if kernel::sleep(100).is_err() {
            break;
        }
        if kernel::event_flags_set(objects.event_flags, EVENT_FLAG, FlagsSet::Or).is_err() {
            break;
        }
    }
    demo_log!(warn, "thread 0 stopped");
}

extern "C" fn thread_1_entry(_input: u32) {
    let Some(objects) = objects() else { return };
    loop {
        let count = bump(&THREAD_1_COUNTER);
        if say!(objects, "thread 1 count= {}\n", count).is_err() {
            break;
        }
        let sent = THREAD_1_MESSAGES_SENT.load(Ordering::Relaxed);
        if kernel::queue_send(objects.queue, &[sent], Timeout::Forever).is_err() {
            break;
        }
        let sent = bump(&THREAD_1_MESSAGES_SENT);
        if say!(objects, "thread 1 messages sent= {}\n", sent).is_err() {
            break;
        }
    }
    demo_log!(warn, "thread 1 stopped");
}

extern "C" fn thread_2_entry(_input: u32) {
    let Some(objects) = objects() else { return };
    loop {
        bump(&THREAD_2_COUNTER);
        let Ok(message) = kernel::queue_receive(objects.queue, Timeout::Forever) else {
            break;
        };
        // messages must arrive in the order they were sent
        if message.first() != THREAD_2_MESSAGES_RECEIVED.load(Ordering::Relaxed) {
            break;
        }
        let received = bump(&THREAD_2_MESSAGES_RECEIVED);
        if say!(objects, "thread 2 messages received= {}\n", received).is_err() {
            break;
        }
    }
    demo_log!(warn, "thread 2 stopped");
}

extern "C" fn thread_3_and_4_entry(input: u32) {
    let Some(objects) = objects() else { return };
    let counter = if input == 3 { &THREAD_3_COUNTER } else { &THREAD_4_COUNTER };
    loop {
        let count = bump(counter);
        if say!(objects, "thread {} count= {}\n", input, count).is_err() {
            break;
        }
        if kernel::semaphore_get(objects.semaphore, Timeout::Forever).is_err() {
            break;
        }
        // hold the semaphore for two ticks
        if kernel::sleep(2).is_err() {
            break;
        }
        if kernel::semaphore_put(objects.semaphore).is_err() {
            break;
        }
    }
    demo_log!(warn, "thread {=u32} stopped", input);
}

extern "C" fn thread_5_entry(_input: u32) {
    let Some(objects) = objects() else { return };
    loop {
        let count = bump(&THREAD_5_COUNTER);
        if say!(objects, "thread 5 count= {}\n", count).is_err() {
            break;
        }
        let flags = kernel::event_flags_get(
            objects.event_flags,
            EVENT_FLAG,
            FlagsWait::OrClear,
            Timeout::Forever,
        );
        if flags != Ok(EVENT_FLAG) {
            break;
        }
    }
    demo_log!(warn, "thread 5 stopped");
}

extern "C" fn thread_6_and_7_entry(input: u32) {
    let Some(objects) = objects() else { return };
    let counter = if input == 6 { &THREAD_6_COUNTER } else { &THREAD_7_COUNTER };
    loop {
        let count = bump(counter);
        if say!(objects, "thread {} count= {}\n", input, count).is_err() {
            break;
        }
        if mutex_round(objects.mutex).is_err() {
            break;
        }
    }
    demo_log!(warn, "thread {=u32} stopped", input);
}

/// Take the mutex twice, hold it for two ticks, then release it twice.
/// Ownership is only given up by the second release.
fn mutex_round(mutex: MutexId) -> Result<()> {
    kernel::mutex_get(mutex, Timeout::Forever)?;
    kernel::mutex_get(mutex, Timeout::Forever)?;
    kernel::sleep(2)?;
    kernel::mutex_put(mutex)?;
    kernel::mutex_put(mutex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BYTE_POOL_ALIGN;
    use crate::thread::ThreadState;

    fn sink(_: u8) {}

    fn arena() -> &'static mut [u8] {
        let raw: &'static mut [u8] =
            Box::leak(vec![0u8; BYTE_POOL_SIZE + BYTE_POOL_ALIGN].into_boxed_slice());
        let start = raw.as_ptr().align_offset(BYTE_POOL_ALIGN);
        &mut raw[start..start + BYTE_POOL_SIZE]
    }

    #[test]
    fn test_system_definition() {
        let mut k = Kernel::new();
        let objects = define(&mut k, arena(), sink).unwrap();

        // eight stacks, the queue ring and the block pool region
        let pool = k.byte_pool_info(objects.byte_pool).unwrap();
        assert_eq!(pool.available, BYTE_POOL_SIZE - 8 * STACK_SIZE - 400 - 104);

        let queue = k.queue_info(objects.queue).unwrap();
        assert_eq!(queue.capacity, QUEUE_SIZE);
        assert_eq!(k.semaphore_info(objects.semaphore).unwrap().count, 1);

        let blocks = k.block_pool_info(objects.block_pool).unwrap();
        assert_eq!(blocks.available, blocks.total);
        assert_eq!(blocks.block_size, 4);
    }

    #[test]
    fn test_thread_0_runs_first() {
        let mut k = Kernel::new();
        define(&mut k, arena(), sink).unwrap();
        k.start();
        let first = k.schedule().unwrap();
        let info = k.thread_info(first).unwrap();
        assert_eq!(info.name, "thread 0");
        assert_eq!(info.priority, 1);
        assert_eq!(info.state, ThreadState::Running);
    }

    #[test]
    fn test_arena_too_small_fails() {
        let mut k = Kernel::new();
        let small: &'static mut [u8] = Box::leak(vec![0u8; 4 * STACK_SIZE].into_boxed_slice());
        assert_eq!(define(&mut k, small, sink).err(), Some(Error::PoolExhausted));
    }
}
