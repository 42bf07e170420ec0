//! # Kernel Status Codes
//!
//! Every kernel service reports its outcome as a [`Result`]. Success is
//! `Ok`; each failure is one [`Error`] variant. No service panics on
//! caller error.

use thiserror::Error;

/// Failure outcome of a kernel service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The wait expired before the condition was met.
    #[error("wait timed out")]
    Timeout,

    /// No storage is available in the pool and no wait was requested.
    #[error("memory pool exhausted")]
    PoolExhausted,

    /// A mutex was released by a thread that does not own it.
    #[error("caller does not own the mutex")]
    NotOwner,

    /// Malformed size, priority, option or handle.
    #[error("invalid parameter")]
    InvalidParameter,

    /// A no-wait request on a semaphore, mutex, event-flags group or
    /// queue could not be satisfied immediately.
    #[error("resource unavailable")]
    Unavailable,

    /// Suspension was requested outside thread context (during system
    /// definition or from an interrupt handler).
    #[error("cannot suspend outside thread context")]
    WaitError,

    /// The object table for this kind of object is full.
    #[error("object table full")]
    NoFreeSlot,
}

/// Kernel service result.
pub type Result<T> = core::result::Result<T, Error>;
