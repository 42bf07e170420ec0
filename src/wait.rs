//! # Wait Queues
//!
//! Every blocking object keeps its suspended threads in a [`WaitQueue`].
//! The queue is a small fixed array of thread ids, kept in wake order:
//!
//! - [`WaitOrder::Priority`]: most urgent priority first, FIFO among
//!   threads of equal priority.
//! - [`WaitOrder::Fifo`]: strict arrival order.
//!
//! A thread appears in at most one wait queue at a time, so `MAX_THREADS`
//! entries always suffice.

use crate::config::MAX_THREADS;
use crate::error::{Error, Result};
use crate::thread::{Priority, ThreadId};

/// Wake ordering policy of a [`WaitQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOrder {
    Priority,
    Fifo,
}

#[derive(Clone, Copy)]
struct Waiter {
    thread: ThreadId,
    priority: Priority,
}

/// Ordered list of threads suspended on one object.
#[derive(Clone)]
pub struct WaitQueue {
    order: WaitOrder,
    entries: [Waiter; MAX_THREADS],
    len: usize,
}

impl WaitQueue {
    pub const fn new(order: WaitOrder) -> Self {
        Self {
            order,
            entries: [Waiter {
                thread: ThreadId::new(0),
                priority: 0,
            }; MAX_THREADS],
            len: 0,
        }
    }

    /// Enqueue `thread` at its wake position.
    pub fn push(&mut self, thread: ThreadId, priority: Priority) -> Result<()> {
        if self.len == MAX_THREADS || self.contains(thread) {
            return Err(Error::InvalidParameter);
        }
        let at = match self.order {
            WaitOrder::Fifo => self.len,
            // behind every waiter of equal or more urgent priority
            WaitOrder::Priority => self.entries[..self.len]
                .iter()
                .position(|w| w.priority > priority)
                .unwrap_or(self.len),
        };
        self.entries.copy_within(at..self.len, at + 1);
        self.entries[at] = Waiter { thread, priority };
        self.len += 1;
        Ok(())
    }

    /// Next thread to wake, without removing it.
    pub fn front(&self) -> Option<ThreadId> {
        self.entries[..self.len].first().map(|w| w.thread)
    }

    pub fn pop_front(&mut self) -> Option<ThreadId> {
        let first = self.front()?;
        self.entries.copy_within(1..self.len, 0);
        self.len -= 1;
        Some(first)
    }

    /// Remove `thread` wherever it is queued. Returns `false` if absent.
    pub fn remove(&mut self, thread: ThreadId) -> bool {
        match self.entries[..self.len].iter().position(|w| w.thread == thread) {
            Some(at) => {
                self.entries.copy_within(at + 1..self.len, at);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, thread: ThreadId) -> bool {
        self.iter().any(|t| t == thread)
    }

    /// Waiters in wake order.
    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.entries[..self.len].iter().map(|w| w.thread)
    }

    /// Copy of the current waiters, for walks that remove entries as
    /// they go.
    pub fn snapshot(&self) -> ([ThreadId; MAX_THREADS], usize) {
        let mut ids = [ThreadId::new(0); MAX_THREADS];
        for (slot, w) in ids.iter_mut().zip(&self.entries[..self.len]) {
            *slot = w.thread;
        }
        (ids, self.len)
    }

    /// Most urgent priority among the waiters.
    pub fn highest_priority(&self) -> Option<Priority> {
        self.entries[..self.len].iter().map(|w| w.priority).min()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(i: usize) -> ThreadId {
        ThreadId::new(i)
    }

    fn order(q: &WaitQueue) -> [usize; 4] {
        let mut out = [usize::MAX; 4];
        for (slot, id) in out.iter_mut().zip(q.iter()) {
            *slot = id.index();
        }
        out
    }

    #[test]
    fn test_priority_queue_orders_by_priority_then_arrival() {
        let mut q = WaitQueue::new(WaitOrder::Priority);
        q.push(t(0), 8).unwrap();
        q.push(t(1), 4).unwrap();
        q.push(t(2), 8).unwrap();
        q.push(t(3), 4).unwrap();
        assert_eq!(order(&q), [1, 3, 0, 2]);
        assert_eq!(q.highest_priority(), Some(4));
        assert_eq!(q.pop_front(), Some(t(1)));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_fifo_queue_ignores_priority() {
        let mut q = WaitQueue::new(WaitOrder::Fifo);
        q.push(t(0), 16).unwrap();
        q.push(t(1), 1).unwrap();
        q.push(t(2), 8).unwrap();
        assert_eq!(order(&q)[..3], [0, 1, 2]);
    }

    #[test]
    fn test_remove_from_middle_keeps_order() {
        let mut q = WaitQueue::new(WaitOrder::Fifo);
        for i in 0..4 {
            q.push(t(i), 0).unwrap();
        }
        assert!(q.remove(t(1)));
        assert!(!q.remove(t(1)));
        assert_eq!(order(&q), [0, 2, 3, usize::MAX]);
    }

    #[test]
    fn test_thread_cannot_wait_twice() {
        let mut q = WaitQueue::new(WaitOrder::Priority);
        q.push(t(5), 3).unwrap();
        assert_eq!(q.push(t(5), 3), Err(Error::InvalidParameter));
    }
}
