//! # Architecture Abstraction Layer
//!
//! Provides the hardware boundary for the scheduler. Initial stack frames
//! are built portably so the kernel core can be exercised on the host;
//! everything that touches the processor lives in [`cortex_m3`] and is
//! compiled only for ARM targets. On other targets the port hooks are
//! no-ops.

#[cfg(target_arch = "arm")]
pub mod cortex_m3;

use crate::error::{Error, Result};
use crate::thread::ThreadEntry;

/// Words in the initial frame: R4–R11 saved by PendSV, then R0–R3, R12,
/// LR, PC and xPSR as stacked by the hardware on exception entry.
const FRAME_WORDS: usize = 16;

/// xPSR with only the Thumb bit set.
const INITIAL_XPSR: u32 = 0x0100_0000;

/// Build the initial context of a thread at the top of `region`.
///
/// Stack layout after initialization (addresses decrease downward):
/// ```text
/// [8-byte aligned top of region]
///   xPSR  (0x01000000, Thumb bit)
///   PC    (entry)
///   LR    (thread_return, reached if the entry returns)
///   R12, R3, R2, R1  (0)
///   R0    (input)
/// [Software saved context]
///   R11 .. R4  (0)         <- returned stack pointer
/// ```
///
/// Returns the stack pointer to store in the thread's context.
pub(crate) fn init_stack(region: &mut [u8], entry: ThreadEntry, input: u32) -> Result<usize> {
    let base = region.as_ptr() as usize;
    // AAPCS requires an 8-byte aligned stack at public interfaces
    let top = (base + region.len()) & !0x07;
    let frame_bytes = FRAME_WORDS * 4;
    if top < base + frame_bytes {
        return Err(Error::InvalidParameter);
    }
    let sp = top - frame_bytes;

    let mut frame = [0u32; FRAME_WORDS];
    frame[8] = input;
    frame[13] = thread_return as usize as u32;
    frame[14] = (entry as usize as u32) & !1;
    frame[15] = INITIAL_XPSR;

    let start = sp - base;
    for (chunk, word) in region[start..start + frame_bytes]
        .chunks_exact_mut(4)
        .zip(frame)
    {
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    Ok(sp)
}

/// Landing point of a thread whose entry routine returns.
extern "C" fn thread_return() -> ! {
    crate::kernel::thread_exit()
}

/// Ask for a context switch at the next opportunity.
#[inline]
pub fn request_context_switch() {
    #[cfg(target_arch = "arm")]
    cortex_m3::trigger_pendsv();
}

/// `true` while executing an exception or interrupt handler.
#[inline]
pub fn in_interrupt() -> bool {
    #[cfg(target_arch = "arm")]
    {
        cortex_m3::in_interrupt()
    }
    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}

/// Idle the processor until the next interrupt.
#[inline]
pub fn wait_for_interrupt() {
    #[cfg(target_arch = "arm")]
    cortex_m::asm::wfi();
    #[cfg(not(target_arch = "arm"))]
    core::hint::spin_loop();
}
