//! Logging macros for the kernel.
//!
//! Each category forwards to `defmt` when its feature is enabled
//! (`log-sched`, `log-sync`, `log-mem`, `log-demo`) and expands to
//! nothing otherwise, so disabled categories cost neither code size
//! nor cycles.

// Scheduler logging macros
#[cfg(feature = "log-sched")]
#[macro_export]
macro_rules! sched_log {
    ($level:ident, $($args:tt)*) => { defmt::$level!($($args)*) };
}

#[cfg(not(feature = "log-sched"))]
#[macro_export]
macro_rules! sched_log {
    ($level:ident, $($args:tt)*) => {};
}

// Synchronization primitive logging macros
#[cfg(feature = "log-sync")]
#[macro_export]
macro_rules! sync_log {
    ($level:ident, $($args:tt)*) => { defmt::$level!($($args)*) };
}

#[cfg(not(feature = "log-sync"))]
#[macro_export]
macro_rules! sync_log {
    ($level:ident, $($args:tt)*) => {};
}

// Memory pool logging macros
#[cfg(feature = "log-mem")]
#[macro_export]
macro_rules! mem_log {
    ($level:ident, $($args:tt)*) => { defmt::$level!($($args)*) };
}

#[cfg(not(feature = "log-mem"))]
#[macro_export]
macro_rules! mem_log {
    ($level:ident, $($args:tt)*) => {};
}

// Demo application logging macros
#[cfg(feature = "log-demo")]
#[macro_export]
macro_rules! demo_log {
    ($level:ident, $($args:tt)*) => { defmt::$level!($($args)*) };
}

#[cfg(not(feature = "log-demo"))]
#[macro_export]
macro_rules! demo_log {
    ($level:ident, $($args:tt)*) => {};
}
