//! # rtcore: a small preemptive RTOS kernel
//!
//! A priority-preemptive real-time kernel for ARM Cortex-M3
//! microcontrollers (STM32F103), with the classic set of kernel objects:
//! threads, counting semaphores, recursive mutexes, event flags, message
//! queues, and byte and block memory pools.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │              Application (demo.rs, console.rs)          │
//! ├────────────────────────────────────────────────────────┤
//! │           Global instance + blocking API (kernel.rs)    │
//! │     sleep · semaphore_get · queue_send · mutex_put ...  │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │  Sync Primitives   │   Memory Pools    │
//! │  scheduler.rs│  sync/             │   mem/            │
//! │  ─ schedule()│  ─ semaphore       │   ─ byte_pool     │
//! │  ─ tick()    │  ─ mutex           │   ─ block_pool    │
//! │  ─ threads   │  ─ event_flags     │                   │
//! │              │  ─ queue           │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │      Thread model (thread.rs) · Wait queues (wait.rs)   │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m3.rs)                │
//! │    PendSV · SysTick · Context Switch · Stack Init      │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M3 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Execution Model
//!
//! The kernel core ([`Kernel`]) is a plain state machine: services update
//! thread states and object queues and report whether a context switch is
//! due. On target, [`kernel`] owns the single instance, runs every service
//! inside a critical section and lets PendSV perform the switch. Host tests
//! drive a `Kernel` value directly, calling [`Kernel::schedule`] where
//! PendSV would run.
//!
//! ## Memory Model
//!
//! - **No heap**: every object lives in a fixed-capacity table
//! - **Handles, not pointers**: objects are named by typed table indices
//! - **Stacks and buffers from byte pools**: carved out of a static arena
//!   at system definition
//! - **Critical sections**: `critical_section::with` around all shared state

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;

pub mod arch;
pub mod config;
pub mod console;
pub mod demo;
pub mod error;
pub mod kernel;
pub mod mem;
pub mod scheduler;
pub mod sync;
pub mod table;
pub mod thread;
pub mod time;
pub mod wait;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use scheduler::Kernel;
pub use thread::{Completion, Delivery, Priority, ThreadId, ThreadInfo, ThreadSpec, ThreadState};
pub use time::{Tick, Timeout};
