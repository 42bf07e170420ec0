//! Multi-thread scenarios driven through the public kernel API.
//!
//! There is no CPU here: each test plays the part of whichever thread
//! the kernel says is running, and calls `schedule()` wherever PendSV
//! would fire on target.

use rtcore::mem::BytePoolId;
use rtcore::sync::{FlagsSet, FlagsWait, Inherit, MessageSize};
use rtcore::{Completion, Delivery, Error, Kernel, ThreadId, ThreadSpec, ThreadState, Timeout};

extern "C" fn entry(_: u32) {}

fn kernel() -> (Kernel, BytePoolId) {
    let mut k = Kernel::new();
    let arena: &'static mut [u8] = Box::leak(vec![0u8; 16 * 1024].into_boxed_slice());
    let pool = k.byte_pool_create("system", arena).unwrap();
    (k, pool)
}

fn spawn(k: &mut Kernel, pool: BytePoolId, name: &'static str, priority: u8, slice: u32) -> ThreadId {
    let stack = k.byte_allocate(pool, 512, Timeout::NoWait).done().unwrap().unwrap();
    k.thread_create(ThreadSpec {
        name,
        entry,
        input: 0,
        stack,
        priority,
        time_slice: slice,
        auto_start: true,
    })
    .unwrap()
}

fn state(k: &Kernel, id: ThreadId) -> ThreadState {
    k.thread_info(id).unwrap().state
}

#[test]
fn test_higher_priority_wake_preempts() {
    let (mut k, pool) = kernel();
    let high = spawn(&mut k, pool, "high", 2, 0);
    let low = spawn(&mut k, pool, "low", 20, 0);
    let sem = k.semaphore_create("sem", 0).unwrap();

    k.start();
    assert_eq!(k.schedule(), Some(high));
    assert!(k.semaphore_get(sem, Timeout::Forever).is_suspended());
    assert_eq!(k.schedule(), Some(low));

    k.semaphore_put(sem).unwrap();
    assert!(k.take_reschedule());
    assert_eq!(k.schedule(), Some(high));
    assert_eq!(k.take_outcome(high), Ok(Delivery::Granted));
    assert_eq!(state(&k, low), ThreadState::Ready);
}

#[test]
fn test_sleep_wakes_on_the_deadline_tick() {
    let (mut k, pool) = kernel();
    let t = spawn(&mut k, pool, "sleeper", 10, 0);
    k.start();
    k.schedule();

    assert!(k.thread_sleep(5).is_suspended());
    assert_eq!(k.schedule(), None);
    for _ in 0..4 {
        assert!(!k.tick());
    }
    assert_eq!(state(&k, t), ThreadState::Blocked);
    assert!(k.tick());
    assert_eq!(k.schedule(), Some(t));
    assert_eq!(k.time_get(), 5);
}

#[test]
fn test_timed_wait_expires_with_timeout() {
    let (mut k, pool) = kernel();
    let t = spawn(&mut k, pool, "waiter", 5, 0);
    let sem = k.semaphore_create("sem", 0).unwrap();
    k.start();
    k.schedule();

    assert!(k.semaphore_get(sem, Timeout::Ticks(3)).is_suspended());
    assert_eq!(k.schedule(), None);
    assert!(!k.tick());
    assert!(!k.tick());
    assert!(k.tick());
    assert_eq!(k.schedule(), Some(t));
    assert_eq!(k.take_outcome(t), Err(Error::Timeout));
    assert_eq!(k.semaphore_info(sem).unwrap().waiting, 0);

    // a put after the timeout is kept for the next getter
    k.semaphore_put(sem).unwrap();
    assert_eq!(k.semaphore_info(sem).unwrap().count, 1);
}

#[test]
fn test_equal_priorities_rotate_on_time_slice() {
    let (mut k, pool) = kernel();
    let first = spawn(&mut k, pool, "thread 1", 16, 4);
    let second = spawn(&mut k, pool, "thread 2", 16, 4);

    k.start();
    assert_eq!(k.schedule(), Some(first));
    for _ in 0..3 {
        assert!(!k.tick());
    }
    assert!(k.tick());
    assert_eq!(k.schedule(), Some(second));
    assert_eq!(state(&k, first), ThreadState::Ready);

    for _ in 0..3 {
        assert!(!k.tick());
    }
    assert!(k.tick());
    assert_eq!(k.schedule(), Some(first));
}

#[test]
fn test_semaphore_pair_takes_turns() {
    let (mut k, pool) = kernel();
    let t3 = spawn(&mut k, pool, "thread 3", 8, 0);
    let t4 = spawn(&mut k, pool, "thread 4", 8, 0);
    let sem = k.semaphore_create("semaphore 0", 1).unwrap();

    k.start();
    assert_eq!(k.schedule(), Some(t3));
    assert_eq!(k.semaphore_get(sem, Timeout::Forever), Completion::Done(Ok(())));
    assert!(k.thread_sleep(2).is_suspended());
    assert_eq!(k.schedule(), Some(t4));

    // held by thread 3 across its sleep
    assert!(k.semaphore_get(sem, Timeout::Forever).is_suspended());
    assert_eq!(k.schedule(), None);
    k.tick();
    assert!(k.tick());
    assert_eq!(k.schedule(), Some(t3));

    k.semaphore_put(sem).unwrap();
    assert_eq!(state(&k, t4), ThreadState::Ready);
    assert_eq!(k.semaphore_info(sem).unwrap().count, 0);

    // thread 3 comes around again and now waits behind thread 4
    assert!(k.semaphore_get(sem, Timeout::Forever).is_suspended());
    assert_eq!(k.schedule(), Some(t4));
    assert_eq!(k.take_outcome(t4), Ok(Delivery::Granted));
    k.semaphore_put(sem).unwrap();
    assert_eq!(state(&k, t3), ThreadState::Ready);
}

#[test]
fn test_event_flag_wakes_waiter_and_clears_on_read() {
    let (mut k, pool) = kernel();
    let t0 = spawn(&mut k, pool, "thread 0", 1, 0);
    let t5 = spawn(&mut k, pool, "thread 5", 4, 0);
    let flags = k.event_flags_create("event flags 0").unwrap();

    k.start();
    assert_eq!(k.schedule(), Some(t0));
    assert!(k.thread_sleep(100).is_suspended());
    assert_eq!(k.schedule(), Some(t5));
    assert!(k
        .event_flags_get(flags, 0x1, FlagsWait::OrClear, Timeout::Forever)
        .is_suspended());
    assert_eq!(k.schedule(), None);

    for _ in 0..99 {
        assert!(!k.tick());
    }
    assert!(k.tick());
    assert_eq!(k.schedule(), Some(t0));
    k.event_flags_set(flags, 0x1, FlagsSet::Or).unwrap();
    assert_eq!(state(&k, t5), ThreadState::Ready);
    assert_eq!(k.event_flags_info(flags).unwrap().current, 0);

    assert!(k.thread_sleep(100).is_suspended());
    assert_eq!(k.schedule(), Some(t5));
    assert_eq!(k.take_outcome(t5), Ok(Delivery::Flags(0x1)));
}

#[test]
fn test_clear_on_read_leaves_unrelated_bits() {
    let (mut k, pool) = kernel();
    spawn(&mut k, pool, "reader", 4, 0);
    let flags = k.event_flags_create("flags").unwrap();
    k.start();
    k.schedule();

    k.event_flags_set(flags, 0b1011, FlagsSet::Or).unwrap();
    assert_eq!(
        k.event_flags_get(flags, 0b0011, FlagsWait::AndClear, Timeout::NoWait),
        Completion::Done(Ok(0b1011))
    );
    assert_eq!(k.event_flags_info(flags).unwrap().current, 0b1000);
}

#[test]
fn test_full_queue_blocks_sender_until_a_receive() {
    let (mut k, pool) = kernel();
    let sender = spawn(&mut k, pool, "thread 1", 16, 0);
    let receiver = spawn(&mut k, pool, "thread 2", 20, 0);
    let storage = k.byte_allocate(pool, 400, Timeout::NoWait).done().unwrap().unwrap();
    let queue = k.queue_create("queue 0", MessageSize::One, storage).unwrap();

    k.start();
    assert_eq!(k.schedule(), Some(sender));
    for n in 1..=100 {
        assert_eq!(k.queue_send(queue, &[n], Timeout::Forever), Completion::Done(Ok(())));
    }
    assert_eq!(
        k.queue_send(queue, &[0], Timeout::NoWait),
        Completion::Done(Err(Error::Unavailable))
    );
    assert!(k.queue_send(queue, &[101], Timeout::Forever).is_suspended());
    assert_eq!(k.schedule(), Some(receiver));

    let first = k.queue_receive(queue, Timeout::Forever).done().unwrap().unwrap();
    assert_eq!(first.first(), 1);
    let info = k.queue_info(queue).unwrap();
    assert_eq!(info.enqueued, 100);
    assert_eq!(info.senders_waiting, 0);

    // the woken sender is more urgent than the receiver
    assert!(k.take_reschedule());
    assert_eq!(k.schedule(), Some(sender));
    assert_eq!(k.take_outcome(sender), Ok(Delivery::Granted));
    assert!(k.queue_send(queue, &[102], Timeout::Forever).is_suspended());
    assert_eq!(k.schedule(), Some(receiver));

    let mut received = Vec::new();
    while let Completion::Done(Ok(message)) = k.queue_receive(queue, Timeout::NoWait) {
        received.push(message.first());
    }
    assert_eq!(received, (2..=102).collect::<Vec<u32>>());
    assert_eq!(k.queue_info(queue).unwrap().enqueued, 0);
}

#[test]
fn test_recursive_mutex_pair_never_shares_ownership() {
    let (mut k, pool) = kernel();
    let t6 = spawn(&mut k, pool, "thread 6", 8, 0);
    let t7 = spawn(&mut k, pool, "thread 7", 8, 0);
    let mutex = k.mutex_create("mutex 0", Inherit::No).unwrap();

    k.start();
    assert_eq!(k.schedule(), Some(t6));
    assert_eq!(k.mutex_get(mutex, Timeout::Forever), Completion::Done(Ok(())));
    assert_eq!(k.mutex_get(mutex, Timeout::Forever), Completion::Done(Ok(())));
    k.thread_relinquish();
    assert_eq!(k.schedule(), Some(t7));

    assert!(k.mutex_get(mutex, Timeout::Forever).is_suspended());
    assert_eq!(k.schedule(), Some(t6));

    k.mutex_put(mutex).unwrap();
    let info = k.mutex_info(mutex).unwrap();
    assert_eq!((info.owner, info.count), (Some(t6), 1));
    k.mutex_put(mutex).unwrap();
    let info = k.mutex_info(mutex).unwrap();
    assert_eq!((info.owner, info.count), (Some(t7), 1));
    assert_eq!(k.mutex_put(mutex), Err(Error::NotOwner));

    assert!(k.mutex_get(mutex, Timeout::Forever).is_suspended());
    assert_eq!(k.schedule(), Some(t7));
    assert_eq!(k.take_outcome(t7), Ok(Delivery::Granted));
    assert_eq!(k.mutex_get(mutex, Timeout::Forever), Completion::Done(Ok(())));
    k.mutex_put(mutex).unwrap();
    k.mutex_put(mutex).unwrap();
    assert_eq!(k.mutex_info(mutex).unwrap().owner, Some(t6));
}

#[test]
fn test_preempted_thread_resumes_ahead_of_its_peer() {
    let (mut k, pool) = kernel();
    let high = spawn(&mut k, pool, "high", 2, 0);
    let a = spawn(&mut k, pool, "a", 10, 0);
    let b = spawn(&mut k, pool, "b", 10, 0);

    k.start();
    assert_eq!(k.schedule(), Some(high));
    assert!(k.thread_sleep(3).is_suspended());
    assert_eq!(k.schedule(), Some(a));

    k.tick();
    k.tick();
    assert!(k.tick());
    assert_eq!(k.schedule(), Some(high));
    assert_eq!(state(&k, a), ThreadState::Ready);

    // a was only preempted, so it is still first in line
    assert!(k.thread_sleep(3).is_suspended());
    assert_eq!(k.schedule(), Some(a));
    assert_eq!(state(&k, b), ThreadState::Ready);
}

#[test]
fn test_expired_slice_sends_thread_behind_its_peer() {
    let (mut k, pool) = kernel();
    let high = spawn(&mut k, pool, "high", 2, 0);
    let a = spawn(&mut k, pool, "a", 10, 2);
    let b = spawn(&mut k, pool, "b", 10, 2);

    k.start();
    assert_eq!(k.schedule(), Some(high));
    assert!(k.thread_sleep(2).is_suspended());
    assert_eq!(k.schedule(), Some(a));

    // the wake of high and the end of a's slice land on the same tick
    assert!(!k.tick());
    assert!(k.tick());
    assert_eq!(k.schedule(), Some(high));

    assert!(k.thread_sleep(2).is_suspended());
    assert_eq!(k.schedule(), Some(b));
    assert_eq!(state(&k, a), ThreadState::Ready);
}
