// SPDX-License-Identifier: Apache-2.0

//! Reference [`HardwareTimer`] adapter for the Cortex-M SysTick counter.
//!
//! SysTick is a 24-bit down-counter: it runs from `reload` to `0` and then
//! reloads, raising `SysTick` on the reload edge. `CortexMSysTick` exposes it
//! to [`crate::Scheduler`] as an up-counting `u32` by reporting ticks elapsed
//! since the last reprogram.
//!
//! SysTick is accessed through `SYST::PTR` rather than an owned `SYST`
//! instance, so the adapter (and the `Scheduler` built around it) can live
//! in a `static` and be constructed in a `const fn`, without requiring the
//! caller to thread `cortex_m::Peripherals::take().SYST` through first.

use cortex_m::peripheral::SYST;

use crate::hal::{HardwareTimer, StatusToken};

/// SysTick's hardware ceiling: a 24-bit counter.
pub const MAX_RELOAD: u32 = (1 << 24) - 1;

const CSR_ENABLE: u32 = 1 << 0;
const CSR_TICKINT: u32 = 1 << 1;
const CSR_CLKSOURCE: u32 = 1 << 2;

/// Adapts the Cortex-M SysTick peripheral to [`HardwareTimer`].
///
/// `ticks_per_unit` converts the caller's duration unit (typically
/// milliseconds) to SysTick cycles; pick it so `ticks_per_unit * max
/// expected duration` fits comfortably under [`MAX_RELOAD`] ticks between
/// reprograms, since the scheduler always clamps a single `set_target` to
/// `max_count()`.
pub struct CortexMSysTick {
    ticks_per_unit: u64,
    elapsed: u32,
    reload: u32,
}

impl CortexMSysTick {
    pub const fn new(ticks_per_unit: u64) -> Self {
        CortexMSysTick {
            ticks_per_unit,
            elapsed: 0,
            reload: 0,
        }
    }

    /// Call from the `SysTick` interrupt handler, before
    /// [`crate::Scheduler::target_count_reached`].
    pub fn on_interrupt(&mut self) {
        self.elapsed = self.elapsed.wrapping_add(self.reload);
    }
}

impl HardwareTimer for CortexMSysTick {
    fn init(&mut self) -> bool {
        // Safety: register read-modify-write on a peripheral with no other
        // concurrent writer while the scheduler hasn't started it yet.
        unsafe {
            let csr = (*SYST::PTR).csr.read();
            (*SYST::PTR).csr.write(csr | CSR_CLKSOURCE);
        }
        true
    }

    fn units_to_ticks(&self, duration: u64) -> u64 {
        duration.saturating_mul(self.ticks_per_unit)
    }

    fn read(&self) -> u32 {
        // SysTick counts down; ticks elapsed in the current period is
        // `reload - CVR`, folded into the running total from prior periods.
        let cvr = unsafe { (*SYST::PTR).cvr.read() };
        self.elapsed.wrapping_add(self.reload.wrapping_sub(cvr))
    }

    fn set_target(&mut self, counts: u32) {
        let reload = counts.clamp(1, MAX_RELOAD);
        self.reload = reload;
        self.elapsed = 0;
        // Safety: paired register writes under the scheduler's critical
        // section; writing CVR with RVR already set clears the count.
        unsafe {
            (*SYST::PTR).rvr.write(reload);
            (*SYST::PTR).cvr.write(0);
        }
    }

    fn set_running(&mut self, on: bool) {
        unsafe {
            let csr = (*SYST::PTR).csr.read();
            let next = if on {
                csr | CSR_ENABLE | CSR_TICKINT
            } else {
                csr & !(CSR_ENABLE | CSR_TICKINT)
            };
            (*SYST::PTR).csr.write(next);
        }
    }

    fn set_interrupts(&mut self, on: bool, token: &mut StatusToken) {
        if on {
            // Restore the PRIMASK state `token` captured on the paired
            // `disable` call.
            if token.0 != 0 {
                // Safety: re-enabling interrupts that were masked by us.
                unsafe { cortex_m::interrupt::enable() };
            }
        } else {
            token.0 = cortex_m::register::primask::read().is_active() as u32;
            cortex_m::interrupt::disable();
        }
    }

    fn max_count(&self) -> u32 {
        MAX_RELOAD
    }
}
