//! # Message Queue
//!
//! A bounded FIFO of fixed-size messages stored in a ring inside a byte
//! pool allocation. Senders block while the ring is full, receivers while
//! it is empty; both wait queues are priority ordered.
//!
//! A message sent while a receiver is waiting bypasses the ring and is
//! handed to that receiver directly. A blocked sender keeps its message
//! in its thread control block until a slot frees up, so FIFO order holds
//! across blocking: the Nth successful receive returns the Nth message
//! accepted by the queue.

use crate::config::MAX_MESSAGE_WORDS;
use crate::error::{Error, Result};
use crate::mem::ByteBlock;
use crate::sync_log;
use crate::table::Handle;
use crate::thread::{Completion, Delivery, Suspension};
use crate::time::Timeout;
use crate::wait::{WaitOrder, WaitQueue};
use crate::Kernel;

pub type QueueId = Handle<Queue>;

const WORD: usize = core::mem::size_of::<u32>();

/// Message size of a queue, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageSize {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
    Sixteen = 16,
}

impl MessageSize {
    pub const fn words(self) -> usize {
        self as usize
    }
}

/// One queue message: up to `MAX_MESSAGE_WORDS` words, copied by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    words: [u32; MAX_MESSAGE_WORDS],
    len: u8,
}

impl Message {
    pub fn new(words: &[u32]) -> Result<Self> {
        if words.is_empty() || words.len() > MAX_MESSAGE_WORDS {
            return Err(Error::InvalidParameter);
        }
        let mut message = Message {
            words: [0; MAX_MESSAGE_WORDS],
            len: words.len() as u8,
        };
        message.words[..words.len()].copy_from_slice(words);
        Ok(message)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.words[..self.len as usize]
    }

    /// First word; the whole message for one-word queues.
    pub fn first(&self) -> u32 {
        self.words[0]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl From<u32> for Message {
    fn from(word: u32) -> Self {
        let mut words = [0; MAX_MESSAGE_WORDS];
        words[0] = word;
        Message { words, len: 1 }
    }
}

pub struct Queue {
    pub name: &'static str,
    pub(crate) storage: ByteBlock,
    pub(crate) message_words: usize,
    pub(crate) capacity: usize,
    /// Slot of the oldest message.
    pub(crate) head: usize,
    pub(crate) count: usize,
    pub(crate) senders: WaitQueue,
    pub(crate) receivers: WaitQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: &'static str,
    pub enqueued: usize,
    pub available: usize,
    pub capacity: usize,
    pub senders_waiting: usize,
    pub receivers_waiting: usize,
}

impl Queue {
    fn slot_bytes(&self) -> usize {
        self.message_words * WORD
    }

    fn write_slot(&self, ring: &mut [u8], slot: usize, message: &Message) {
        let start = slot * self.slot_bytes();
        let slot = &mut ring[start..start + self.slot_bytes()];
        for (chunk, word) in slot.chunks_exact_mut(WORD).zip(&message.words) {
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
    }

    fn read_slot(&self, ring: &[u8], slot: usize) -> Message {
        let start = slot * self.slot_bytes();
        let mut message = Message {
            words: [0; MAX_MESSAGE_WORDS],
            len: self.message_words as u8,
        };
        for (word, chunk) in message
            .words
            .iter_mut()
            .zip(ring[start..start + self.slot_bytes()].chunks_exact(WORD))
        {
            let mut raw = [0u8; WORD];
            raw.copy_from_slice(chunk);
            *word = u32::from_ne_bytes(raw);
        }
        message
    }

    fn push_back(&mut self, ring: &mut [u8], message: &Message) {
        let tail = (self.head + self.count) % self.capacity;
        self.write_slot(ring, tail, message);
        self.count += 1;
    }

    fn push_front(&mut self, ring: &mut [u8], message: &Message) {
        self.head = (self.head + self.capacity - 1) % self.capacity;
        self.write_slot(ring, self.head, message);
        self.count += 1;
    }

    fn pop_front(&mut self, ring: &[u8]) -> Message {
        let message = self.read_slot(ring, self.head);
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        message
    }
}

impl Kernel {
    /// Create a queue whose ring occupies `storage`. Capacity is the
    /// number of whole messages that fit in the block.
    pub fn queue_create(
        &mut self,
        name: &'static str,
        size: MessageSize,
        storage: ByteBlock,
    ) -> Result<QueueId> {
        let slot_bytes = size.words() * WORD;
        let capacity = storage.len() / slot_bytes;
        if capacity == 0 {
            return Err(Error::InvalidParameter);
        }
        // storage must be a live allocation
        self.byte_pools.get_mut(storage.pool())?.bytes_mut(storage)?;

        let id = self.queues.insert(Queue {
            name,
            storage,
            message_words: size.words(),
            capacity,
            head: 0,
            count: 0,
            senders: WaitQueue::new(WaitOrder::Priority),
            receivers: WaitQueue::new(WaitOrder::Priority),
        })?;
        sync_log!(debug, "queue {=str} created, {=usize} messages", name, capacity);
        Ok(id)
    }

    /// Append a message. Suspends the caller while the queue is full.
    pub fn queue_send(&mut self, id: QueueId, message: &[u32], timeout: Timeout) -> Completion<()> {
        Completion::flatten(self.queue_send_inner(id, message, timeout, false))
    }

    /// Place a message at the head, ahead of everything already queued.
    pub fn queue_send_front(
        &mut self,
        id: QueueId,
        message: &[u32],
        timeout: Timeout,
    ) -> Completion<()> {
        Completion::flatten(self.queue_send_inner(id, message, timeout, true))
    }

    fn queue_send_inner(
        &mut self,
        id: QueueId,
        words: &[u32],
        timeout: Timeout,
        front: bool,
    ) -> Result<Completion<()>> {
        let message = Message::new(words)?;
        let queue = self.queues.get_mut(id)?;
        if words.len() != queue.message_words {
            return Err(Error::InvalidParameter);
        }

        let receiver = queue.receivers.pop_front();
        if let Some(receiver) = receiver {
            self.wake(receiver, Ok(Delivery::Message(message)));
            return Ok(Completion::ok(()));
        }

        if queue.count < queue.capacity {
            let (queue, ring) = self.queue_ring(id)?;
            if front {
                queue.push_front(ring, &message);
            } else {
                queue.push_back(ring, &message);
            }
            return Ok(Completion::ok(()));
        }

        if timeout.is_no_wait() {
            return Err(Error::Unavailable);
        }
        let what = Suspension::QueueSend {
            queue: id,
            message,
            front,
        };
        let (caller, priority) = self.block_caller(what, timeout)?;
        self.queues.get_mut(id)?.senders.push(caller, priority)?;
        sync_log!(trace, "queue full, sender blocked");
        Ok(Completion::Suspended)
    }

    /// Take the oldest message. Suspends the caller while the queue is
    /// empty.
    pub fn queue_receive(&mut self, id: QueueId, timeout: Timeout) -> Completion<Message> {
        Completion::flatten(self.queue_receive_inner(id, timeout))
    }

    fn queue_receive_inner(&mut self, id: QueueId, timeout: Timeout) -> Result<Completion<Message>> {
        let queue = self.queues.get_mut(id)?;
        if queue.count > 0 {
            let (queue, ring) = self.queue_ring(id)?;
            let message = queue.pop_front(ring);
            let sender = queue.senders.pop_front();

            // the freed slot goes to the most urgent blocked sender
            if let Some(sender) = sender {
                if let Some(Suspension::QueueSend {
                    message: pending,
                    front,
                    ..
                }) = self.suspension_of(sender)
                {
                    let (queue, ring) = self.queue_ring(id)?;
                    if front {
                        queue.push_front(ring, &pending);
                    } else {
                        queue.push_back(ring, &pending);
                    }
                }
                self.wake(sender, Ok(Delivery::Granted));
            }
            return Ok(Completion::ok(message));
        }

        if timeout.is_no_wait() {
            return Err(Error::Unavailable);
        }
        let (caller, priority) = self.block_caller(Suspension::QueueReceive(id), timeout)?;
        self.queues.get_mut(id)?.receivers.push(caller, priority)?;
        Ok(Completion::Suspended)
    }

    pub fn queue_info(&self, id: QueueId) -> Result<QueueInfo> {
        let queue = self.queues.get(id)?;
        Ok(QueueInfo {
            name: queue.name,
            enqueued: queue.count,
            available: queue.capacity - queue.count,
            capacity: queue.capacity,
            senders_waiting: queue.senders.len(),
            receivers_waiting: queue.receivers.len(),
        })
    }

    /// The queue together with the bytes of its ring.
    fn queue_ring(&mut self, id: QueueId) -> Result<(&mut Queue, &mut [u8])> {
        let queue = self.queues.get_mut(id)?;
        let ring = self
            .byte_pools
            .get_mut(queue.storage.pool())?
            .bytes_mut(queue.storage)?;
        Ok((queue, ring))
    }
}
