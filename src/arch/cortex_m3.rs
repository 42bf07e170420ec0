//! # Cortex-M3 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M3 (STM32F103). Implements
//! context switching via PendSV, SysTick configuration and the launch of
//! the idle context.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M3 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by exception handlers
//! - **PSP** (Process Stack Pointer): used by threads and the idle loop
//!   in Thread mode
//!
//! On exception entry the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! the process stack. PendSV saves and restores R4–R11, completing the
//! context. The kernel only ever sees the resulting stack pointer.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both run at the lowest priority (0xFF), so a context
//! switch never preempts an application interrupt handler.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::{SystemHandler, VectActive};
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::sched_log;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set PendSV and SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    // SAFETY: called once before interrupts are enabled; lowering these
    // priorities cannot break a priority-based critical section.
    unsafe {
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend PendSV. The switch happens once no other handler is active and
/// interrupts are unmasked.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

#[inline]
pub fn in_interrupt() -> bool {
    SCB::vect_active() != VectActive::ThreadMode
}

// ---------------------------------------------------------------------------
// Idle launch
// ---------------------------------------------------------------------------

/// Move Thread mode onto the idle stack and unmask interrupts.
///
/// PendSV must already be pending: it fires as soon as interrupts are
/// enabled, saves the idle context and switches to the first thread.
///
/// # Safety
/// Must be called once, from Thread mode on the main stack, with
/// `idle_top` pointing at the 8-byte aligned top of a static stack.
pub unsafe fn launch_idle(idle_top: usize) -> ! {
    sched_log!(info, "launching idle context");
    unsafe {
        asm!(
            "msr psp, r0",
            // CONTROL.SPSEL = 1: Thread mode uses PSP
            "movs r0, #2",
            "msr control, r0",
            "isb",
            "cpsie i",
            "b {idle}",
            in("r0") idle_top,
            idle = sym idle_loop,
            options(noreturn)
        );
    }
}

extern "C" fn idle_loop() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler: performs the context switch.
///
/// ## Sequence
/// 1. Save R4–R11 onto the outgoing stack (PSP)
/// 2. Hand the outgoing stack pointer to the kernel, which stores it,
///    runs the scheduler and returns the incoming stack pointer
/// 3. Restore R4–R11 from the incoming stack
/// 4. Return to Thread mode on PSP (hardware restores the rest)
///
/// Naked, so the compiler never touches R4–R11 before they are saved.
#[unsafe(no_mangle)]
#[unsafe(naked)]
unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        // EXC_RETURN: Thread mode, process stack
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        switch = sym switch_context,
    );
}

/// Store the outgoing context, pick the next one and return its stack
/// pointer. Called from PendSV only.
extern "C" fn switch_context(sp: usize) -> usize {
    crate::kernel::with(|k| {
        k.save_context(sp);
        k.schedule();
        k.active_context().sp
    })
}
