//! Fixtures shared by the in-crate unit tests.

use crate::mem::BytePoolId;
use crate::thread::{Priority, ThreadId, ThreadSpec};
use crate::time::Timeout;
use crate::Kernel;

extern "C" fn entry(_: u32) {}

/// A kernel with one 16 KiB byte pool for stacks and object storage.
pub(crate) fn kernel_with_pool() -> (Kernel, BytePoolId) {
    let mut k = Kernel::new();
    let arena: &'static mut [u8] = Box::leak(vec![0u8; 16 * 1024].into_boxed_slice());
    let pool = k.byte_pool_create("pool", arena).unwrap();
    (k, pool)
}

/// Create an auto-started thread on a fresh 512-byte stack.
pub(crate) fn spawn(k: &mut Kernel, pool: BytePoolId, priority: Priority, slice: u32) -> ThreadId {
    let stack = k.byte_allocate(pool, 512, Timeout::NoWait).done().unwrap().unwrap();
    k.thread_create(ThreadSpec {
        name: "t",
        entry,
        input: 0,
        stack,
        priority,
        time_slice: slice,
        auto_start: true,
    })
    .unwrap()
}
