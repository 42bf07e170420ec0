//! # Console Output
//!
//! Formatted text output shared by all threads. Each `print` holds the
//! output mutex for the whole message, so lines from different threads
//! never interleave. The character sink itself is supplied by the board
//! as a plain [`PutChar`] function.

use core::fmt;

use crate::error::{Error, Result};
use crate::kernel;
use crate::sync::MutexId;
use crate::time::Timeout;

/// Writes one byte to the output device, blocking until it is accepted.
pub type PutChar = fn(u8);

/// `fmt::Write` adapter in "cooked" mode: `\n` goes out as `\r\n`.
struct Cooked(PutChar);

impl fmt::Write for Cooked {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                (self.0)(b'\r');
            }
            (self.0)(byte);
        }
        Ok(())
    }
}

/// Format `args` straight to `put`, without locking.
pub fn write_cooked(put: PutChar, args: fmt::Arguments<'_>) -> fmt::Result {
    fmt::write(&mut Cooked(put), args)
}

/// Mutex-guarded formatted output.
#[derive(Clone, Copy)]
pub struct Console {
    mutex: MutexId,
    put_char: PutChar,
}

impl Console {
    pub const fn new(mutex: MutexId, put_char: PutChar) -> Self {
        Self { mutex, put_char }
    }

    /// Print `args` while holding the output mutex. Thread context only.
    pub fn print(&self, args: fmt::Arguments<'_>) -> Result<()> {
        kernel::mutex_get(self.mutex, Timeout::Forever)?;
        let written = write_cooked(self.put_char, args);
        kernel::mutex_put(self.mutex)?;
        written.map_err(|_| Error::InvalidParameter)
    }
}
