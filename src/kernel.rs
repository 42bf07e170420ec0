//! # Kernel
//!
//! The global kernel instance and the blocking API threads call.
//!
//! The instance lives in a `critical_section::Mutex<RefCell<_>>`. Every
//! service runs entirely inside one critical section; if it leaves a
//! context switch due, PendSV is pended and fires as soon as the section
//! ends. A service that suspended its caller resumes right after that
//! point, once the thread is switched back in, and collects the result it
//! was handed on wake.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset (cortex-m-rt)
//!   └─► main()
//!         └─► kernel::enter(cp, define)   ← no return
//!               ├─► define(&mut Kernel)    ← create pools, objects, threads
//!               ├─► Configure SysTick, PendSV/SysTick priorities
//!               ├─► Kernel::start()        ← mark started, request the first switch
//!               └─► Launch idle context    ← PendSV switches to the first thread
//! ```
//!
//! ## Interrupt Context
//!
//! Handlers may call the non-suspending services (`semaphore_put`,
//! `event_flags_set`, sends and receives with [`Timeout::NoWait`], pool
//! releases). Any request that could suspend fails with
//! [`Error::WaitError`] there, as do mutex services, which need an owner.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::arch;
use crate::error::{Error, Result};
use crate::mem::{Block, BlockPoolId, ByteBlock, BytePoolId};
use crate::scheduler::Kernel;
use crate::sync::{EventFlagsId, FlagsSet, FlagsWait, Message, MutexId, QueueId, SemaphoreId};
use crate::thread::{Completion, Delivery, ThreadId};
use crate::time::{Tick, Timeout};

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

static KERNEL: Mutex<RefCell<Kernel>> = Mutex::new(RefCell::new(Kernel::new()));

/// Run `f` on the global kernel inside a critical section.
pub fn with<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    critical_section::with(|cs| f(&mut KERNEL.borrow_ref_mut(cs)))
}

/// Run a service and complete it, suspending the caller if the service
/// asks for it. `unpack` extracts the service's value from the delivery
/// handed over on wake.
fn call<T>(
    service: impl FnOnce(&mut Kernel) -> Completion<T>,
    unpack: impl FnOnce(Delivery) -> Option<T>,
) -> Result<T> {
    let (caller, completion, switch) = with(|k| {
        let caller = k.thread_identify();
        let completion = service(k);
        (caller, completion, k.take_reschedule())
    });
    if switch {
        arch::request_context_switch();
    }
    match completion {
        Completion::Done(result) => result,
        Completion::Suspended => {
            // back here once woken and switched in again
            let caller = caller.ok_or(Error::WaitError)?;
            let delivery = with(|k| k.take_outcome(caller))?;
            unpack(delivery).ok_or(Error::WaitError)
        }
    }
}

/// Run a service that never suspends.
fn run<T>(service: impl FnOnce(&mut Kernel) -> T) -> T {
    let (value, switch) = with(|k| {
        let value = service(k);
        (value, k.take_reschedule())
    });
    if switch {
        arch::request_context_switch();
    }
    value
}

/// Reject waits that would suspend an interrupt handler.
fn wait_allowed(timeout: Timeout) -> Result<()> {
    if arch::in_interrupt() && !timeout.is_no_wait() {
        return Err(Error::WaitError);
    }
    Ok(())
}

fn granted(delivery: Delivery) -> Option<()> {
    matches!(delivery, Delivery::Granted).then_some(())
}

// ---------------------------------------------------------------------------
// Threads and time
// ---------------------------------------------------------------------------

/// Suspend the calling thread for `ticks` ticks.
pub fn sleep(ticks: u32) -> Result<()> {
    if arch::in_interrupt() {
        return Err(Error::WaitError);
    }
    call(|k| k.thread_sleep(ticks), granted)
}

/// Let the next ready thread of equal priority run.
pub fn relinquish() {
    run(Kernel::thread_relinquish)
}

pub fn thread_identify() -> Option<ThreadId> {
    if arch::in_interrupt() {
        return None;
    }
    with(|k| k.thread_identify())
}

pub fn time_get() -> Tick {
    with(|k| k.time_get())
}

/// Terminate the calling thread. Reached when an entry routine returns.
pub fn thread_exit() -> ! {
    let _ = run(Kernel::thread_exit);
    loop {
        arch::wait_for_interrupt();
    }
}

/// Tick handler body. Call from the SysTick exception.
pub fn tick_interrupt() {
    if with(Kernel::tick) {
        arch::request_context_switch();
    }
}

// ---------------------------------------------------------------------------
// Synchronization
// ---------------------------------------------------------------------------

pub fn semaphore_get(id: SemaphoreId, timeout: Timeout) -> Result<()> {
    wait_allowed(timeout)?;
    call(|k| k.semaphore_get(id, timeout), granted)
}

pub fn semaphore_put(id: SemaphoreId) -> Result<()> {
    run(|k| k.semaphore_put(id))
}

pub fn mutex_get(id: MutexId, timeout: Timeout) -> Result<()> {
    if arch::in_interrupt() {
        return Err(Error::WaitError);
    }
    call(|k| k.mutex_get(id, timeout), granted)
}

pub fn mutex_put(id: MutexId) -> Result<()> {
    if arch::in_interrupt() {
        return Err(Error::WaitError);
    }
    run(|k| k.mutex_put(id))
}

pub fn event_flags_get(
    id: EventFlagsId,
    mask: u32,
    option: FlagsWait,
    timeout: Timeout,
) -> Result<u32> {
    wait_allowed(timeout)?;
    call(
        |k| k.event_flags_get(id, mask, option, timeout),
        |delivery| match delivery {
            Delivery::Flags(flags) => Some(flags),
            _ => None,
        },
    )
}

pub fn event_flags_set(id: EventFlagsId, mask: u32, op: FlagsSet) -> Result<()> {
    run(|k| k.event_flags_set(id, mask, op))
}

pub fn queue_send(id: QueueId, message: &[u32], timeout: Timeout) -> Result<()> {
    wait_allowed(timeout)?;
    call(|k| k.queue_send(id, message, timeout), granted)
}

pub fn queue_send_front(id: QueueId, message: &[u32], timeout: Timeout) -> Result<()> {
    wait_allowed(timeout)?;
    call(|k| k.queue_send_front(id, message, timeout), granted)
}

pub fn queue_receive(id: QueueId, timeout: Timeout) -> Result<Message> {
    wait_allowed(timeout)?;
    call(
        |k| k.queue_receive(id, timeout),
        |delivery| match delivery {
            Delivery::Message(message) => Some(message),
            _ => None,
        },
    )
}

// ---------------------------------------------------------------------------
// Memory pools
// ---------------------------------------------------------------------------

pub fn byte_allocate(pool: BytePoolId, size: usize, timeout: Timeout) -> Result<ByteBlock> {
    wait_allowed(timeout)?;
    call(
        |k| k.byte_allocate(pool, size, timeout),
        |delivery| match delivery {
            Delivery::Bytes(block) => Some(block),
            _ => None,
        },
    )
}

pub fn byte_release(block: ByteBlock) -> Result<()> {
    run(|k| k.byte_release(block))
}

pub fn block_allocate(pool: BlockPoolId, timeout: Timeout) -> Result<Block> {
    wait_allowed(timeout)?;
    call(
        |k| k.block_allocate(pool, timeout),
        |delivery| match delivery {
            Delivery::Block(block) => Some(block),
            _ => None,
        },
    )
}

pub fn block_release(block: Block) -> Result<()> {
    run(|k| k.block_release(block))
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// Define the application on the global kernel, start the tick and
/// switch to the first thread. **Does not return.**
///
/// If `define` fails the system halts without starting.
#[cfg(target_arch = "arm")]
pub fn enter(
    mut cp: cortex_m::Peripherals,
    define: impl FnOnce(&mut Kernel) -> Result<()>,
) -> ! {
    use crate::arch::cortex_m3;
    use crate::config::IDLE_STACK_SIZE;
    use crate::sched_log;

    cortex_m::interrupt::disable();

    let defined = with(|k| {
        define(k)?;
        k.start();
        Ok::<(), Error>(())
    });
    let idle = cortex_m::singleton!(: [u64; IDLE_STACK_SIZE / 8] = [0; IDLE_STACK_SIZE / 8]);
    let (Ok(()), Some(idle)) = (defined, idle) else {
        sched_log!(error, "system definition failed");
        loop {
            cortex_m::asm::wfi();
        }
    };

    cortex_m3::configure_systick(&mut cp.SYST);
    cortex_m3::set_interrupt_priorities(&mut cp.SCB);
    cortex_m3::trigger_pendsv();

    let idle_top = idle.as_ptr_range().end as usize;
    sched_log!(info, "kernel started");
    // SAFETY: single call from Thread mode on MSP, onto a static stack.
    unsafe { cortex_m3::launch_idle(idle_top) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_wait_services_complete_without_a_thread() {
        let sem = with(|k| k.semaphore_create("global", 1)).unwrap();
        assert_eq!(semaphore_get(sem, Timeout::NoWait), Ok(()));
        assert_eq!(semaphore_get(sem, Timeout::NoWait), Err(Error::Unavailable));
        assert_eq!(semaphore_put(sem), Ok(()));
        assert_eq!(semaphore_get(sem, Timeout::Forever), Ok(()));
        assert_eq!(semaphore_get(sem, Timeout::Forever), Err(Error::WaitError));
        assert_eq!(thread_identify(), None);
    }
}
