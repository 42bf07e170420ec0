//! # Counting Semaphore
//!
//! `get` takes one unit or suspends the caller; `put` adds one unit, or
//! hands it straight to the most urgent waiter (FIFO among equal
//! priorities). The count is unbounded above and can never go negative.

use crate::error::{Error, Result};
use crate::sync_log;
use crate::table::Handle;
use crate::thread::{Completion, Delivery, Suspension};
use crate::time::Timeout;
use crate::wait::{WaitOrder, WaitQueue};
use crate::Kernel;

pub type SemaphoreId = Handle<Semaphore>;

pub struct Semaphore {
    pub name: &'static str,
    pub(crate) count: u32,
    pub(crate) waiters: WaitQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreInfo {
    pub name: &'static str,
    pub count: u32,
    pub waiting: usize,
}

impl Kernel {
    pub fn semaphore_create(&mut self, name: &'static str, initial: u32) -> Result<SemaphoreId> {
        let id = self.semaphores.insert(Semaphore {
            name,
            count: initial,
            waiters: WaitQueue::new(WaitOrder::Priority),
        })?;
        sync_log!(debug, "semaphore {=str} created, count {=u32}", name, initial);
        Ok(id)
    }

    /// Take one unit. Suspends the caller while the count is zero.
    pub fn semaphore_get(&mut self, id: SemaphoreId, timeout: Timeout) -> Completion<()> {
        Completion::flatten(self.semaphore_get_inner(id, timeout))
    }

    fn semaphore_get_inner(&mut self, id: SemaphoreId, timeout: Timeout) -> Result<Completion<()>> {
        let sem = self.semaphores.get_mut(id)?;
        if sem.count > 0 {
            sem.count -= 1;
            return Ok(Completion::ok(()));
        }
        if timeout.is_no_wait() {
            return Err(Error::Unavailable);
        }
        let (caller, priority) = self.block_caller(Suspension::Semaphore(id), timeout)?;
        self.semaphores.get_mut(id)?.waiters.push(caller, priority)?;
        Ok(Completion::Suspended)
    }

    /// Release one unit. Callable from interrupt handlers.
    pub fn semaphore_put(&mut self, id: SemaphoreId) -> Result<()> {
        let waiter = self.semaphores.get_mut(id)?.waiters.pop_front();
        match waiter {
            // the unit goes straight to the waiter; the count is untouched
            Some(waiter) => self.wake(waiter, Ok(Delivery::Granted)),
            None => {
                let sem = self.semaphores.get_mut(id)?;
                sem.count = sem.count.checked_add(1).ok_or(Error::InvalidParameter)?;
            }
        }
        Ok(())
    }

    pub fn semaphore_info(&self, id: SemaphoreId) -> Result<SemaphoreInfo> {
        let sem = self.semaphores.get(id)?;
        Ok(SemaphoreInfo {
            name: sem.name,
            count: sem.count,
            waiting: sem.waiters.len(),
        })
    }
}
