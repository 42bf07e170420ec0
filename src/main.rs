//! # rtcore Demo Firmware
//!
//! Runs the eight-thread kernel demo on an STM32F103. Console output goes
//! to the debug host over semihosting; kernel logging, when enabled, goes
//! over RTT.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use cortex_m_semihosting::hio;
use defmt_rtt as _;
use panic_halt as _;

use rtcore::config::SYSTEM_CLOCK_HZ;
use rtcore::{demo, kernel};

/// Blocking single-byte output to the host console.
fn put_char(byte: u8) {
    if let Ok(mut out) = hio::hstdout() {
        let _ = out.write_all(&[byte]);
    }
}

#[entry]
fn main() -> ! {
    let Some(cp) = cortex_m::Peripherals::take() else {
        loop {
            cortex_m::asm::wfi();
        }
    };
    let Some(arena) = cortex_m::singleton!(: [u8; demo::BYTE_POOL_SIZE] = [0; demo::BYTE_POOL_SIZE])
    else {
        loop {
            cortex_m::asm::wfi();
        }
    };
    defmt::info!("rtcore demo, core clock {=u32} Hz", SYSTEM_CLOCK_HZ);

    kernel::enter(cp, |k| demo::define(k, arena, put_char).map(|_| ()))
}

#[exception]
fn SysTick() {
    kernel::tick_interrupt();
}
