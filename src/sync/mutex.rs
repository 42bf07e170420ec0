//! # Recursive Mutex
//!
//! A mutex has at most one owner. The owner may take it again without
//! blocking; each `get` must be matched by a `put` before ownership is
//! released. On release the most urgent waiter becomes the new owner
//! with a nesting count of one.
//!
//! ## Priority Inheritance
//!
//! Chosen per mutex at creation. With [`Inherit::Yes`], a thread that
//! blocks on the mutex lends its priority to a less urgent owner until
//! the owner releases it. With [`Inherit::No`] the owner keeps its own
//! priority, so a medium-priority thread may run while a high-priority
//! waiter is stuck behind a low-priority owner (priority inversion).

use crate::config::MAX_MUTEXES;
use crate::error::{Error, Result};
use crate::sync_log;
use crate::table::Handle;
use crate::thread::{Completion, Delivery, Suspension, ThreadId};
use crate::time::Timeout;
use crate::wait::{WaitOrder, WaitQueue};
use crate::Kernel;

pub type MutexId = Handle<Mutex>;

/// Priority inheritance option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Inherit {
    No,
    Yes,
}

pub struct Mutex {
    pub name: &'static str,
    pub(crate) owner: Option<ThreadId>,
    /// Nesting depth of the owner's acquisitions. Zero iff unowned.
    pub(crate) count: u32,
    pub(crate) inherit: Inherit,
    pub(crate) waiters: WaitQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexInfo {
    pub name: &'static str,
    pub owner: Option<ThreadId>,
    pub count: u32,
    pub waiting: usize,
}

impl Kernel {
    pub fn mutex_create(&mut self, name: &'static str, inherit: Inherit) -> Result<MutexId> {
        let id = self.mutexes.insert(Mutex {
            name,
            owner: None,
            count: 0,
            inherit,
            waiters: WaitQueue::new(WaitOrder::Priority),
        })?;
        sync_log!(debug, "mutex {=str} created", name);
        Ok(id)
    }

    /// Acquire the mutex. Recursive acquisition by the owner never blocks.
    pub fn mutex_get(&mut self, id: MutexId, timeout: Timeout) -> Completion<()> {
        Completion::flatten(self.mutex_get_inner(id, timeout))
    }

    fn mutex_get_inner(&mut self, id: MutexId, timeout: Timeout) -> Result<Completion<()>> {
        let caller = self.caller().ok_or(Error::WaitError)?;
        let mutex = self.mutexes.get_mut(id)?;
        let owner = match mutex.owner {
            None => {
                mutex.owner = Some(caller);
                mutex.count = 1;
                return Ok(Completion::ok(()));
            }
            Some(owner) if owner == caller => {
                mutex.count = mutex.count.checked_add(1).ok_or(Error::InvalidParameter)?;
                return Ok(Completion::ok(()));
            }
            Some(owner) => owner,
        };
        if timeout.is_no_wait() {
            return Err(Error::Unavailable);
        }
        let inherit = mutex.inherit;

        let (caller, priority) = self.block_caller(Suspension::Mutex(id), timeout)?;
        self.mutexes.get_mut(id)?.waiters.push(caller, priority)?;

        if inherit == Inherit::Yes {
            let owner_priority = self.threads.get(owner)?.priority;
            if priority < owner_priority {
                sync_log!(debug, "owner inherits priority {=u8}", priority);
                self.set_priority(owner, priority);
            }
        }
        Ok(Completion::Suspended)
    }

    /// Release one level of ownership. Only the owner may call this.
    pub fn mutex_put(&mut self, id: MutexId) -> Result<()> {
        let caller = self.caller();
        let mutex = self.mutexes.get_mut(id)?;
        if mutex.owner.is_none() || mutex.owner != caller {
            return Err(Error::NotOwner);
        }
        mutex.count -= 1;
        if mutex.count == 0 {
            self.mutex_hand_off(id)?;
        }
        Ok(())
    }

    pub fn mutex_info(&self, id: MutexId) -> Result<MutexInfo> {
        let mutex = self.mutexes.get(id)?;
        Ok(MutexInfo {
            name: mutex.name,
            owner: mutex.owner,
            count: mutex.count,
            waiting: mutex.waiters.len(),
        })
    }

    /// Release every mutex `thread` owns, whatever its nesting count.
    pub(crate) fn release_mutexes_of(&mut self, thread: ThreadId) {
        let mut owned = [MutexId::new(0); MAX_MUTEXES];
        let mut count = 0;
        for (id, mutex) in self.mutexes.iter() {
            if mutex.owner == Some(thread) {
                owned[count] = id;
                count += 1;
            }
        }
        for &id in &owned[..count] {
            let _ = self.mutex_hand_off(id);
        }
    }

    /// Clear ownership and pass the mutex to the most urgent waiter.
    fn mutex_hand_off(&mut self, id: MutexId) -> Result<()> {
        let mutex = self.mutexes.get_mut(id)?;
        let previous = mutex.owner.take();
        mutex.count = 0;
        let inherit = mutex.inherit;
        let next = mutex.waiters.pop_front();
        if let Some(next) = next {
            mutex.owner = Some(next);
            mutex.count = 1;
        }
        let boost = mutex.waiters.highest_priority();

        if inherit == Inherit::Yes {
            if let Some(previous) = previous {
                let base = self.threads.get(previous)?.base_priority;
                self.set_priority(previous, base);
            }
        }
        if let Some(next) = next {
            sync_log!(trace, "mutex handed to next waiter");
            if inherit == Inherit::Yes {
                // the new owner now blocks the remaining waiters
                let own = self.threads.get(next)?.priority;
                if let Some(waiter_priority) = boost.filter(|&p| p < own) {
                    self.set_priority(next, waiter_priority);
                }
            }
            self.wake(next, Ok(Delivery::Granted));
        }
        Ok(())
    }
}
