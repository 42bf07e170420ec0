//! # Event Flags
//!
//! A group of 32 independent flag bits. Threads wait for any (`Or`) or all
//! (`And`) bits of a mask, optionally clearing the bits they asked for
//! once satisfied. Setting flags may satisfy several waiters at once;
//! waiters are evaluated in arrival order, and bits cleared by one waiter
//! are gone for the ones after it.

use crate::error::{Error, Result};
use crate::sync_log;
use crate::table::Handle;
use crate::thread::{Completion, Delivery, Suspension};
use crate::time::Timeout;
use crate::wait::{WaitOrder, WaitQueue};
use crate::Kernel;

pub type EventFlagsId = Handle<EventFlags>;

/// Condition a waiter asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlagsWait {
    /// Any bit of the mask.
    Or,
    /// Any bit of the mask; clear the mask bits on success.
    OrClear,
    /// Every bit of the mask.
    And,
    /// Every bit of the mask; clear the mask bits on success.
    AndClear,
}

impl FlagsWait {
    pub const fn is_satisfied(self, current: u32, mask: u32) -> bool {
        match self {
            FlagsWait::Or | FlagsWait::OrClear => current & mask != 0,
            FlagsWait::And | FlagsWait::AndClear => current & mask == mask,
        }
    }

    pub const fn clears(self) -> bool {
        matches!(self, FlagsWait::OrClear | FlagsWait::AndClear)
    }
}

/// How `event_flags_set` combines the mask with the current flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlagsSet {
    Or,
    /// `current &= mask`, so zero bits in the mask clear flags.
    And,
}

pub struct EventFlags {
    pub name: &'static str,
    pub(crate) current: u32,
    pub(crate) waiters: WaitQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFlagsInfo {
    pub name: &'static str,
    pub current: u32,
    pub waiting: usize,
}

impl Kernel {
    pub fn event_flags_create(&mut self, name: &'static str) -> Result<EventFlagsId> {
        let id = self.event_flags.insert(EventFlags {
            name,
            current: 0,
            waiters: WaitQueue::new(WaitOrder::Fifo),
        })?;
        sync_log!(debug, "event flags {=str} created", name);
        Ok(id)
    }

    /// Combine `mask` into the group and release every waiter whose
    /// condition now holds. Callable from interrupt handlers.
    pub fn event_flags_set(&mut self, id: EventFlagsId, mask: u32, op: FlagsSet) -> Result<()> {
        let group = self.event_flags.get_mut(id)?;
        group.current = match op {
            FlagsSet::Or => group.current | mask,
            FlagsSet::And => group.current & mask,
        };
        let (waiters, count) = group.waiters.snapshot();

        for &waiter in &waiters[..count] {
            let Some(Suspension::EventFlags { mask, option, .. }) = self.suspension_of(waiter) else {
                continue;
            };
            let group = self.event_flags.get_mut(id)?;
            let current = group.current;
            if !option.is_satisfied(current, mask) {
                continue;
            }
            group.waiters.remove(waiter);
            if option.clears() {
                group.current &= !mask;
            }
            sync_log!(trace, "flags {=u32:#x} satisfy a waiter", current);
            self.wake(waiter, Ok(Delivery::Flags(current)));
        }
        Ok(())
    }

    /// Wait for `mask` under `option`. Yields the flags as they were when
    /// the condition matched, before any clearing.
    pub fn event_flags_get(
        &mut self,
        id: EventFlagsId,
        mask: u32,
        option: FlagsWait,
        timeout: Timeout,
    ) -> Completion<u32> {
        Completion::flatten(self.event_flags_get_inner(id, mask, option, timeout))
    }

    fn event_flags_get_inner(
        &mut self,
        id: EventFlagsId,
        mask: u32,
        option: FlagsWait,
        timeout: Timeout,
    ) -> Result<Completion<u32>> {
        if mask == 0 {
            return Err(Error::InvalidParameter);
        }
        let group = self.event_flags.get_mut(id)?;
        let current = group.current;
        if option.is_satisfied(current, mask) {
            if option.clears() {
                group.current &= !mask;
            }
            return Ok(Completion::ok(current));
        }
        if timeout.is_no_wait() {
            return Err(Error::Unavailable);
        }
        let what = Suspension::EventFlags {
            group: id,
            mask,
            option,
        };
        let (caller, priority) = self.block_caller(what, timeout)?;
        self.event_flags.get_mut(id)?.waiters.push(caller, priority)?;
        Ok(Completion::Suspended)
    }

    pub fn event_flags_info(&self, id: EventFlagsId) -> Result<EventFlagsInfo> {
        let group = self.event_flags.get(id)?;
        Ok(EventFlagsInfo {
            name: group.name,
            current: group.current,
            waiting: group.waiters.len(),
        })
    }
}
