// SPDX-License-Identifier: Apache-2.0
#![no_std]
#![no_main]

use cortex_m_semihosting::hprintln;
use tickmux::{cortex_m_ha::CortexMSysTick, Scheduler, Timer, TimerType};

// Millisecond resolution on an 8 MHz clock.
static SCHEDULER: Scheduler<CortexMSysTick> = Scheduler::new(CortexMSysTick::new(8_000));

static BLINK: Timer = Timer::new();
static TIMEOUT: Timer = Timer::new();

fn on_blink(_ctx: *mut ()) {
    hprintln!("blink");
}

fn on_timeout(_ctx: *mut ()) {
    hprintln!("done, exiting");
    cortex_m_semihosting::debug::exit(cortex_m_semihosting::debug::EXIT_SUCCESS);
}

#[cortex_m_rt::entry]
fn main() -> ! {
    hprintln!("initializing ..");
    SCHEDULER.init().expect("hardware init failed");

    SCHEDULER
        .create(&BLINK, on_blink, TimerType::Repeating)
        .unwrap();
    SCHEDULER.start(&BLINK, 100, core::ptr::null_mut()).unwrap();

    SCHEDULER
        .create(&TIMEOUT, on_timeout, TimerType::SingleShot)
        .unwrap();
    SCHEDULER
        .start(&TIMEOUT, 1_000, core::ptr::null_mut())
        .unwrap();

    loop {
        cortex_m::asm::wfi();
    }
}

#[cortex_m_rt::exception]
fn SysTick() {
    SCHEDULER.target_count_reached();
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
