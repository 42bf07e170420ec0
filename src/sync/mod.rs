//! # Synchronization Primitives
//!
//! Semaphores, mutexes, event-flag groups and message queues. Each object
//! lives in a kernel table and owns its own wait queue(s); the services
//! are `impl Kernel` blocks so that waking a thread and updating the
//! object happen in one step, inside the caller's critical section.
//!
//! None of these services lock anything themselves: on target they run
//! under [`kernel::with`](crate::kernel::with), which holds the critical
//! section for the whole call.

pub mod event_flags;
pub mod mutex;
pub mod queue;
pub mod semaphore;

pub use event_flags::{EventFlags, EventFlagsId, EventFlagsInfo, FlagsSet, FlagsWait};
pub use mutex::{Inherit, Mutex, MutexId, MutexInfo};
pub use queue::{Message, MessageSize, Queue, QueueId, QueueInfo};
pub use semaphore::{Semaphore, SemaphoreId, SemaphoreInfo};
