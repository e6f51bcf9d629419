// SPDX-License-Identifier: Apache-2.0
#![no_std]
#![no_main]

use cortex_m_semihosting::hprintln;
use embassy_executor::Spawner;
use embassy_time::Timer as EmbassyTimer;
use tickmux::cortex_m_ha::CortexMSysTick;
use tickmux::embassy_driver::EmbassyDriver;
use tickmux::Scheduler;

// Microsecond resolution on an 8 MHz clock, matching `embassy_time_driver::TICK_HZ`.
static SCHEDULER: Scheduler<CortexMSysTick> = Scheduler::new(CortexMSysTick::new(8));
static DRIVER: EmbassyDriver<CortexMSysTick> = EmbassyDriver::new(&SCHEDULER);

embassy_time_driver::time_driver_impl!(static TIME_DRIVER: EmbassyDriver<CortexMSysTick> = DRIVER);

#[embassy_executor::task]
async fn blink() {
    loop {
        hprintln!("blink");
        EmbassyTimer::after_millis(100).await;
    }
}

#[embassy_executor::task]
async fn timeout(spawner: Spawner) {
    let _ = spawner;
    EmbassyTimer::after_millis(1_000).await;
    hprintln!("done, exiting");
    cortex_m_semihosting::debug::exit(cortex_m_semihosting::debug::EXIT_SUCCESS);
}

#[cortex_m_rt::entry]
fn main() -> ! {
    hprintln!("initializing ..");
    SCHEDULER.init().expect("hardware init failed");

    let executor = embassy_executor::Executor::new();
    let executor: &'static mut _ = {
        static mut EXECUTOR: Option<embassy_executor::Executor> = None;
        unsafe {
            EXECUTOR = Some(executor);
            EXECUTOR.as_mut().unwrap()
        }
    };

    executor.run(|spawner| {
        spawner.spawn(blink()).unwrap();
        spawner.spawn(timeout(spawner)).unwrap();
    })
}

#[cortex_m_rt::exception]
fn SysTick() {
    SCHEDULER.target_count_reached();
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
