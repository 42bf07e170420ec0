//! # Thread Control Block
//!
//! Defines the thread model for rtcore. Each thread has a fixed priority
//! (lower numeral = more urgent), an optional round-robin time slice, a
//! private stack region carved from a byte pool, and a saved execution
//! context. Threads are created once during system definition and live
//! in the kernel's thread table.

use crate::config::MAX_PRIORITIES;
use crate::error::{Error, Result};
use crate::mem::{Block, BlockPoolId, ByteBlock, BytePoolId};
use crate::sync::{EventFlagsId, FlagsWait, Message, MutexId, QueueId, SemaphoreId};
use crate::table::Handle;
use crate::time::Tick;

/// Thread priority. `0` is the most urgent level.
pub type Priority = u8;

/// Handle of a thread in the kernel's thread table.
pub type ThreadId = Handle<Thread>;

/// Thread entry routine. Receives the `input` given at creation; a
/// thread whose entry returns is terminated.
pub type ThreadEntry = extern "C" fn(input: u32);

// ---------------------------------------------------------------------------
// Thread state machine
// ---------------------------------------------------------------------------

/// Execution state of a thread in the scheduler's state machine.
///
/// ```text
///   ┌──────────┐     schedule()      ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │ ──► Terminated
///   └──────────┘                     └─────────┘     (entry returned)
///     ▲    ▲         preempt / slice      │
///     │    └──────────────────────────────┤
///     │                                   │ get / send / sleep
///     │          wake / timeout      ┌────▼─────┐
///     └───────────────────────────── │ Blocked  │
///                                    └──────────┘
/// ```
///
/// `Suspended` holds a thread created without auto-start until it is
/// resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThreadState {
    /// Runnable, waiting for the CPU in its priority's ready order.
    Ready,
    /// Currently executing.
    Running,
    /// Waiting on a primitive, a pool, or a sleep deadline.
    Blocked,
    /// Created without auto-start; not schedulable until resumed.
    Suspended,
    /// Entry routine returned or the thread was terminated.
    Terminated,
}

// ---------------------------------------------------------------------------
// Creation parameters
// ---------------------------------------------------------------------------

/// Parameters for [`Kernel::thread_create`](crate::Kernel::thread_create).
#[derive(Debug, Clone, Copy)]
pub struct ThreadSpec {
    pub name: &'static str,
    pub entry: ThreadEntry,
    pub input: u32,
    /// Stack region, exclusively owned by the thread from now on.
    pub stack: ByteBlock,
    pub priority: Priority,
    /// Ticks of CPU before round-robin rotation among equal priorities.
    /// `0` disables slicing.
    pub time_slice: u32,
    /// Enter `Ready` immediately instead of `Suspended`.
    pub auto_start: bool,
}

impl ThreadSpec {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.priority >= MAX_PRIORITIES {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Suspension and wake delivery
// ---------------------------------------------------------------------------

/// What a blocked thread is waiting for. Carries everything needed to
/// complete the request when the thread is woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Suspension {
    Sleep,
    Semaphore(SemaphoreId),
    Mutex(MutexId),
    EventFlags {
        group: EventFlagsId,
        mask: u32,
        option: FlagsWait,
    },
    QueueSend {
        queue: QueueId,
        message: Message,
        front: bool,
    },
    QueueReceive(QueueId),
    BytePool {
        pool: BytePoolId,
        size: usize,
    },
    BlockPool(BlockPoolId),
}

/// Value handed to a thread when its wait is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Semaphore unit, mutex ownership, queue slot, or sleep expiry.
    Granted,
    /// Event flags as they were when the waiter's condition matched.
    Flags(u32),
    Message(Message),
    Bytes(ByteBlock),
    Block(Block),
}

/// Result of a service that may suspend the caller.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion<T> {
    /// Finished without suspending.
    Done(Result<T>),
    /// The caller is now `Blocked`; its result is delivered on wake and
    /// read with [`Kernel::take_outcome`](crate::Kernel::take_outcome).
    Suspended,
}

impl<T> Completion<T> {
    pub(crate) fn ok(value: T) -> Self {
        Completion::Done(Ok(value))
    }

    pub(crate) fn failed(error: Error) -> Self {
        Completion::Done(Err(error))
    }

    /// Collapse an inner service result: errors become `Done(Err(..))`.
    pub(crate) fn flatten(result: Result<Completion<T>>) -> Self {
        result.unwrap_or_else(Completion::failed)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Completion::Suspended)
    }

    /// The immediate result, if the call did not suspend.
    pub fn done(self) -> Option<Result<T>> {
        match self {
            Completion::Done(result) => Some(result),
            Completion::Suspended => None,
        }
    }
}

impl<T> From<Result<T>> for Completion<T> {
    fn from(result: Result<T>) -> Self {
        Completion::Done(result)
    }
}

// ---------------------------------------------------------------------------
// Thread Control Block
// ---------------------------------------------------------------------------

/// Saved execution context: the process stack pointer at the last
/// switch-out. The registers themselves live on the thread's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Context {
    pub sp: usize,
}

/// Thread Control Block (TCB).
pub struct Thread {
    pub name: &'static str,
    /// Argument handed to the entry routine.
    pub(crate) input: u32,

    /// Priority given at creation.
    pub(crate) base_priority: Priority,
    /// Effective priority; above `base_priority` only while inheriting
    /// through a mutex.
    pub(crate) priority: Priority,

    pub(crate) time_slice: u32,
    pub(crate) slice_remaining: u32,

    pub(crate) state: ThreadState,
    /// Position in the ready order of its priority level. Smaller runs
    /// first; a fresh value sends the thread to the back.
    pub(crate) ready_seq: u64,

    pub(crate) stack: ByteBlock,
    pub(crate) context: Context,

    pub(crate) suspension: Option<Suspension>,
    pub(crate) timeout_at: Option<Tick>,
    /// Result of the last wait, set when the thread is woken.
    pub(crate) outcome: Option<Result<Delivery>>,

    /// Number of times the thread has been switched in.
    pub(crate) run_count: u32,
}

impl Thread {
    pub(crate) fn new(spec: &ThreadSpec, context: Context) -> Self {
        Self {
            name: spec.name,
            input: spec.input,
            base_priority: spec.priority,
            priority: spec.priority,
            time_slice: spec.time_slice,
            slice_remaining: spec.time_slice,
            state: ThreadState::Suspended,
            ready_seq: 0,
            stack: spec.stack,
            context,
            suspension: None,
            timeout_at: None,
            outcome: None,
            run_count: 0,
        }
    }

    /// Ready or Running.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        matches!(self.state, ThreadState::Ready | ThreadState::Running)
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn info(&self) -> ThreadInfo {
        ThreadInfo {
            name: self.name,
            input: self.input,
            state: self.state,
            priority: self.priority,
            base_priority: self.base_priority,
            time_slice: self.time_slice,
            run_count: self.run_count,
        }
    }
}

/// Snapshot returned by [`Kernel::thread_info`](crate::Kernel::thread_info).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub name: &'static str,
    pub input: u32,
    pub state: ThreadState,
    pub priority: Priority,
    pub base_priority: Priority,
    pub time_slice: u32,
    pub run_count: u32,
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
