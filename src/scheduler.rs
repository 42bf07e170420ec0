//! # Scheduler
//!
//! The kernel instance and its scheduling core. Implements fully
//! preemptive, priority-ordered scheduling on a single core with optional
//! round-robin time slicing among threads of equal priority.
//!
//! ## Scheduling Rule
//!
//! At every decision point the runnable thread with the numerically
//! lowest priority runs. Within one priority level threads run in ready
//! order (`ready_seq`):
//!
//! - a thread preempted by a more urgent one keeps its place at the head;
//! - a thread that wakes from a wait, relinquishes, or exhausts its time
//!   slice goes to the back.
//!
//! ## Decision Points
//!
//! Services never switch context themselves. They update thread states
//! and raise `needs_reschedule`; the port layer then runs
//! [`Kernel::schedule`] from PendSV. Host tests call `schedule()`
//! directly at the same points.
//!
//! ## Tick Processing
//!
//! At each SysTick interrupt [`Kernel::tick`]:
//! 1. **Advance time**: increment the monotonic tick counter
//! 2. **Expire waits**: wake sleepers whose deadline arrived and fail
//!    timed-out waits with [`Error::Timeout`]
//! 3. **Time slice**: charge the running thread; on expiry rotate it
//!    behind its equal-priority peers
//! 4. **Report**: return whether a context switch is due

use crate::arch;
use crate::config::{
    MAX_BLOCK_POOLS, MAX_BYTE_POOLS, MAX_EVENT_FLAGS, MAX_MUTEXES, MAX_QUEUES, MAX_SEMAPHORES,
    MAX_THREADS, MIN_STACK_SIZE,
};
use crate::error::{Error, Result};
use crate::mem::{BlockPool, BytePool};
use crate::sync::{EventFlags, Mutex, Queue, Semaphore};
use crate::table::Table;
use crate::thread::{
    Completion, Context, Delivery, Priority, Suspension, Thread, ThreadId, ThreadInfo,
    ThreadSpec, ThreadState,
};
use crate::time::{Tick, Timeout};
use crate::{mem_log, sched_log};

// ---------------------------------------------------------------------------
// Kernel struct
// ---------------------------------------------------------------------------

/// The kernel instance: every thread and object, the tick counter and the
/// scheduling state. Built once at startup and never torn down.
///
/// On target the single instance lives in [`crate::kernel`]; host tests
/// construct their own.
pub struct Kernel {
    pub(crate) threads: Table<Thread, MAX_THREADS>,
    pub(crate) semaphores: Table<Semaphore, MAX_SEMAPHORES>,
    pub(crate) mutexes: Table<Mutex, MAX_MUTEXES>,
    pub(crate) event_flags: Table<EventFlags, MAX_EVENT_FLAGS>,
    pub(crate) queues: Table<Queue, MAX_QUEUES>,
    pub(crate) byte_pools: Table<BytePool, MAX_BYTE_POOLS>,
    pub(crate) block_pools: Table<BlockPool, MAX_BLOCK_POOLS>,

    /// Thread that was switched in last. Stays set while that thread
    /// blocks, until the next `schedule()`.
    current: Option<ThreadId>,

    /// Context of the idle loop that runs when no thread is ready.
    idle: Context,

    ticks: Tick,
    next_seq: u64,
    needs_reschedule: bool,
    started: bool,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            threads: Table::new(),
            semaphores: Table::new(),
            mutexes: Table::new(),
            event_flags: Table::new(),
            queues: Table::new(),
            byte_pools: Table::new(),
            block_pools: Table::new(),
            current: None,
            idle: Context { sp: 0 },
            ticks: 0,
            next_seq: 0,
            needs_reschedule: false,
            started: false,
        }
    }

    // -----------------------------------------------------------------------
    // Thread services
    // -----------------------------------------------------------------------

    /// Create a thread on a stack region carved from a byte pool.
    ///
    /// The region must be at least `MIN_STACK_SIZE` bytes, currently
    /// allocated, and not already serving as another thread's stack.
    pub fn thread_create(&mut self, spec: ThreadSpec) -> Result<ThreadId> {
        spec.validate()?;
        if spec.stack.len() < MIN_STACK_SIZE {
            return Err(Error::InvalidParameter);
        }
        if self.threads.iter().any(|(_, t)| t.stack.overlaps(&spec.stack)) {
            mem_log!(error, "stack region already owned by a thread");
            return Err(Error::InvalidParameter);
        }

        let region = self
            .byte_pools
            .get_mut(spec.stack.pool())?
            .bytes_mut(spec.stack)?;
        let sp = arch::init_stack(region, spec.entry, spec.input)?;

        let id = self.threads.insert(Thread::new(&spec, Context { sp }))?;
        sched_log!(
            info,
            "thread {=str} created: prio {=u8} slice {=u32}",
            spec.name,
            spec.priority,
            spec.time_slice
        );
        if spec.auto_start {
            self.make_ready(id);
        }
        Ok(id)
    }

    /// Start a thread that was created without auto-start.
    pub fn thread_resume(&mut self, id: ThreadId) -> Result<()> {
        if self.threads.get(id)?.state != ThreadState::Suspended {
            return Err(Error::InvalidParameter);
        }
        self.make_ready(id);
        Ok(())
    }

    /// Terminate a thread. It leaves any wait queue it is on and every
    /// mutex it owns is released to the next waiter.
    pub fn thread_terminate(&mut self, id: ThreadId) -> Result<()> {
        let thread = self.threads.get_mut(id)?;
        if thread.state == ThreadState::Terminated {
            return Ok(());
        }
        let suspension = thread.suspension.take();
        thread.state = ThreadState::Terminated;
        thread.timeout_at = None;
        sched_log!(info, "thread {=str} terminated", thread.name);

        if let Some(what) = suspension {
            self.detach(id, what);
        }
        self.release_mutexes_of(id);
        self.refresh_preemption();
        Ok(())
    }

    /// Terminate the calling thread. Used when an entry routine returns.
    pub fn thread_exit(&mut self) -> Result<()> {
        let id = self.caller().ok_or(Error::WaitError)?;
        self.thread_terminate(id)
    }

    /// Suspend the calling thread for `ticks` ticks. `0` returns at once.
    pub fn thread_sleep(&mut self, ticks: u32) -> Completion<()> {
        if ticks == 0 {
            return Completion::ok(());
        }
        match self.block_caller(Suspension::Sleep, Timeout::Ticks(ticks)) {
            Ok(_) => Completion::Suspended,
            Err(e) => Completion::failed(e),
        }
    }

    /// Give the CPU to the next ready thread of the same priority, if any.
    pub fn thread_relinquish(&mut self) {
        let Some(id) = self.caller() else { return };
        let Ok(priority) = self.threads.get(id).map(|t| t.priority) else {
            return;
        };
        if self.has_ready_peer(id, priority) {
            let seq = self.next_seq();
            if let Ok(thread) = self.threads.get_mut(id) {
                thread.ready_seq = seq;
            }
            self.refresh_preemption();
        }
    }

    /// The running thread, or `None` before start and while idle.
    pub fn thread_identify(&self) -> Option<ThreadId> {
        self.caller()
    }

    pub fn thread_info(&self, id: ThreadId) -> Result<ThreadInfo> {
        self.threads.get(id).map(Thread::info)
    }

    /// Collect the result a woken thread was handed. Cleared on read.
    pub fn take_outcome(&mut self, id: ThreadId) -> Result<Delivery> {
        self.threads
            .get_mut(id)?
            .outcome
            .take()
            .unwrap_or(Err(Error::WaitError))
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Mark the kernel started and ask for the first switch.
    ///
    /// No thread is switched in here: the first `schedule()` runs in
    /// PendSV, after the idle context has been saved, so the chosen
    /// thread's initial frame is still intact.
    pub fn start(&mut self) {
        self.started = true;
        self.needs_reschedule = true;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Select the thread to run and switch the bookkeeping over to it.
    ///
    /// Called from PendSV on target. Returns `None` when the idle
    /// context should run.
    pub fn schedule(&mut self) -> Option<ThreadId> {
        self.needs_reschedule = false;
        let next = self.best_ready();

        if let Some(prev) = self.current.filter(|&prev| Some(prev) != next) {
            if let Ok(thread) = self.threads.get_mut(prev) {
                if thread.state == ThreadState::Running {
                    // preempted: keeps its ready_seq, so it resumes first
                    thread.state = ThreadState::Ready;
                }
            }
        }

        if let Some(id) = next {
            if let Ok(thread) = self.threads.get_mut(id) {
                if thread.state != ThreadState::Running {
                    thread.state = ThreadState::Running;
                    thread.run_count = thread.run_count.wrapping_add(1);
                    sched_log!(trace, "switch to {=str}", thread.name);
                }
            }
        }

        self.current = next;
        next
    }

    /// Advance the tick counter by one. Returns `true` if a context
    /// switch is due.
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;
        let now = self.ticks;

        // --- Expire sleeps and timed waits ---
        let mut expired = [ThreadId::new(0); MAX_THREADS];
        let mut count = 0;
        for (id, thread) in self.threads.iter() {
            if thread.state == ThreadState::Blocked
                && thread.timeout_at.is_some_and(|at| at <= now)
            {
                expired[count] = id;
                count += 1;
            }
        }
        for &id in &expired[..count] {
            let Ok(thread) = self.threads.get_mut(id) else {
                continue;
            };
            let outcome = match thread.suspension.take() {
                None | Some(Suspension::Sleep) => Ok(Delivery::Granted),
                Some(what) => {
                    self.detach(id, what);
                    Err(Error::Timeout)
                }
            };
            self.wake(id, outcome);
        }

        // --- Time slice of the running thread ---
        if let Some(id) = self.caller() {
            let mut rotate = None;
            if let Ok(thread) = self.threads.get_mut(id) {
                if thread.time_slice > 0 {
                    thread.slice_remaining = thread.slice_remaining.saturating_sub(1);
                    if thread.slice_remaining == 0 {
                        thread.slice_remaining = thread.time_slice;
                        rotate = Some(thread.priority);
                    }
                }
            }
            if let Some(priority) = rotate {
                if self.has_ready_peer(id, priority) {
                    let seq = self.next_seq();
                    if let Ok(thread) = self.threads.get_mut(id) {
                        thread.ready_seq = seq;
                    }
                    sched_log!(trace, "time slice expired, rotating");
                }
            }
        }

        self.refresh_preemption();
        self.needs_reschedule
    }

    pub fn time_get(&self) -> Tick {
        self.ticks
    }

    pub fn time_set(&mut self, ticks: Tick) {
        self.ticks = ticks;
    }

    /// `true` if a context switch is due. Cleared on read.
    pub fn take_reschedule(&mut self) -> bool {
        core::mem::take(&mut self.needs_reschedule)
    }

    pub fn needs_reschedule(&self) -> bool {
        self.needs_reschedule
    }

    // -----------------------------------------------------------------------
    // Port interface
    // -----------------------------------------------------------------------

    /// Store the stack pointer of the context being switched out.
    pub(crate) fn save_context(&mut self, sp: usize) {
        match self.current.and_then(|id| self.threads.get_mut(id).ok()) {
            Some(thread) => thread.context.sp = sp,
            None => self.idle.sp = sp,
        }
    }

    /// Context of the thread selected by the last `schedule()`.
    pub(crate) fn active_context(&self) -> Context {
        self.current
            .and_then(|id| self.threads.get(id).ok())
            .map_or(self.idle, |t| t.context)
    }

    // -----------------------------------------------------------------------
    // Internals shared with the primitives
    // -----------------------------------------------------------------------

    /// The running thread, i.e. the caller of a service.
    pub(crate) fn caller(&self) -> Option<ThreadId> {
        self.current.filter(|&id| {
            self.threads
                .get(id)
                .is_ok_and(|t| t.state == ThreadState::Running)
        })
    }

    /// Move the calling thread to `Blocked` on `what`. Returns its id and
    /// effective priority for the object's wait queue.
    pub(crate) fn block_caller(
        &mut self,
        what: Suspension,
        timeout: Timeout,
    ) -> Result<(ThreadId, Priority)> {
        let id = self.caller().ok_or(Error::WaitError)?;
        let deadline = timeout.deadline(self.ticks);
        let thread = self.threads.get_mut(id)?;
        thread.state = ThreadState::Blocked;
        thread.suspension = Some(what);
        thread.timeout_at = deadline;
        thread.outcome = None;
        sched_log!(trace, "{=str} blocked", thread.name);
        self.needs_reschedule = true;
        Ok((id, thread.priority))
    }

    /// Complete a blocked thread's wait with `outcome` and make it ready.
    pub(crate) fn wake(&mut self, id: ThreadId, outcome: Result<Delivery>) {
        let Ok(thread) = self.threads.get_mut(id) else {
            return;
        };
        if thread.state != ThreadState::Blocked {
            return;
        }
        thread.suspension = None;
        thread.timeout_at = None;
        thread.outcome = Some(outcome);
        self.make_ready(id);
    }

    /// The suspension a blocked thread is waiting on.
    pub(crate) fn suspension_of(&self, id: ThreadId) -> Option<Suspension> {
        self.threads.get(id).ok().and_then(|t| t.suspension)
    }

    pub(crate) fn set_priority(&mut self, id: ThreadId, priority: Priority) {
        if let Ok(thread) = self.threads.get_mut(id) {
            thread.priority = priority;
        }
        self.refresh_preemption();
    }

    /// Take `thread` off the wait queue of the object it waits on.
    pub(crate) fn detach(&mut self, thread: ThreadId, what: Suspension) {
        match what {
            Suspension::Sleep => {}
            Suspension::Semaphore(id) => {
                if let Ok(sem) = self.semaphores.get_mut(id) {
                    sem.waiters.remove(thread);
                }
            }
            Suspension::Mutex(id) => {
                if let Ok(mutex) = self.mutexes.get_mut(id) {
                    mutex.waiters.remove(thread);
                }
            }
            Suspension::EventFlags { group, .. } => {
                if let Ok(flags) = self.event_flags.get_mut(group) {
                    flags.waiters.remove(thread);
                }
            }
            Suspension::QueueSend { queue, .. } => {
                if let Ok(q) = self.queues.get_mut(queue) {
                    q.senders.remove(thread);
                }
            }
            Suspension::QueueReceive(queue) => {
                if let Ok(q) = self.queues.get_mut(queue) {
                    q.receivers.remove(thread);
                }
            }
            Suspension::BytePool { pool, .. } => {
                if let Ok(p) = self.byte_pools.get_mut(pool) {
                    p.waiters.remove(thread);
                }
            }
            Suspension::BlockPool(pool) => {
                if let Ok(p) = self.block_pools.get_mut(pool) {
                    p.waiters.remove(thread);
                }
            }
        }
    }

    fn make_ready(&mut self, id: ThreadId) {
        let seq = self.next_seq();
        if let Ok(thread) = self.threads.get_mut(id) {
            thread.state = ThreadState::Ready;
            thread.ready_seq = seq;
            thread.slice_remaining = thread.time_slice;
        }
        self.refresh_preemption();
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Runnable thread that should hold the CPU right now.
    fn best_ready(&self) -> Option<ThreadId> {
        self.threads
            .iter()
            .filter(|(_, t)| t.is_runnable())
            .min_by_key(|(_, t)| (t.priority, t.ready_seq))
            .map(|(id, _)| id)
    }

    fn has_ready_peer(&self, id: ThreadId, priority: Priority) -> bool {
        self.threads
            .iter()
            .any(|(other, t)| other != id && t.state == ThreadState::Ready && t.priority == priority)
    }

    fn refresh_preemption(&mut self) {
        if self.best_ready() != self.caller() {
            self.needs_reschedule = true;
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{kernel_with_pool, spawn};

    extern "C" fn entry(_: u32) {}

    #[test]
    fn test_highest_priority_runs_first() {
        let (mut k, pool) = kernel_with_pool();
        let low = spawn(&mut k, pool, 16, 0);
        let high = spawn(&mut k, pool, 1, 0);
        k.start();
        assert_eq!(k.schedule(), Some(high));
        assert_eq!(k.thread_info(high).unwrap().state, ThreadState::Running);
        assert_eq!(k.thread_info(low).unwrap().state, ThreadState::Ready);
    }

    #[test]
    fn test_stack_too_small_rejected() {
        let (mut k, pool) = kernel_with_pool();
        let stack = k.byte_allocate(pool, 64, Timeout::NoWait).done().unwrap().unwrap();
        let spec = ThreadSpec {
            name: "tiny",
            entry,
            input: 0,
            stack,
            priority: 3,
            time_slice: 0,
            auto_start: true,
        };
        assert_eq!(k.thread_create(spec), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_stack_cannot_be_shared() {
        let (mut k, pool) = kernel_with_pool();
        let stack = k.byte_allocate(pool, 512, Timeout::NoWait).done().unwrap().unwrap();
        let spec = ThreadSpec {
            name: "a",
            entry,
            input: 0,
            stack,
            priority: 3,
            time_slice: 0,
            auto_start: true,
        };
        k.thread_create(spec).unwrap();
        assert_eq!(k.thread_create(spec), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_suspended_thread_waits_for_resume() {
        let (mut k, pool) = kernel_with_pool();
        let stack = k.byte_allocate(pool, 512, Timeout::NoWait).done().unwrap().unwrap();
        let id = k
            .thread_create(ThreadSpec {
                name: "later",
                entry,
                input: 0,
                stack,
                priority: 5,
                time_slice: 0,
                auto_start: false,
            })
            .unwrap();
        k.start();
        assert_eq!(k.schedule(), None);
        k.thread_resume(id).unwrap();
        assert!(k.take_reschedule());
        assert_eq!(k.schedule(), Some(id));
        assert_eq!(k.thread_resume(id), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_sleep_outside_thread_is_wait_error() {
        let mut k = Kernel::new();
        assert_eq!(k.thread_sleep(5), Completion::Done(Err(Error::WaitError)));
        assert_eq!(k.thread_sleep(0), Completion::Done(Ok(())));
    }

    #[test]
    fn test_idle_context_saved_when_nothing_runs() {
        let mut k = Kernel::new();
        k.start();
        assert_eq!(k.schedule(), None);
        k.save_context(0x2000_0100);
        assert_eq!(k.active_context().sp, 0x2000_0100);
    }

    #[test]
    fn test_first_switch_runs_thread_from_its_initial_frame() {
        let (mut k, pool) = kernel_with_pool();
        let id = spawn(&mut k, pool, 1, 0);
        let initial_sp = k.threads.get(id).unwrap().context.sp;

        k.start();
        assert_eq!(k.thread_identify(), None);
        assert!(k.take_reschedule());

        // first PendSV: the outgoing context is the idle loop
        k.save_context(0x2000_0100);
        assert_eq!(k.schedule(), Some(id));
        assert_eq!(k.active_context().sp, initial_sp);
        assert_eq!(k.idle.sp, 0x2000_0100);
    }
}
