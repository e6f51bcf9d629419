// SPDX-License-Identifier: Apache-2.0

//! Adapter exposing a [`crate::Scheduler`] as an `embassy_time_driver::Driver`.
//!
//! Embassy's executor calls [`Driver::schedule_wake`] with an arbitrary
//! number of outstanding wake times; this multiplexes all of them onto a
//! small fixed pool of [`Timer`] records, each driven by the same scheduler
//! that drives every other logical timer in the program. A matching waker
//! already queued has its deadline updated in place rather than taking a
//! second slot.

use core::task::Waker;

use critical_section::Mutex;
use embassy_time_driver::Driver;

use crate::hal::HardwareTimer;
use crate::record::{Timer, TimerType};
use crate::scheduler::Scheduler;

/// Number of outstanding `schedule_wake` deadlines this adapter can track at
/// once. Embassy calls `schedule_wake` again (replacing the prior deadline
/// for that waker) far more often than it holds many distinct wakers live,
/// so a small fixed pool is the common sizing for this kind of adapter.
const QUEUE_SIZE: usize = 16;

#[repr(C)]
struct Slot {
    timer: Timer,
    waker: Option<Waker>,
}

/// Wraps a `&'static Scheduler<H>` as an `embassy_time_driver::Driver`.
///
/// Build one with [`EmbassyDriver::new`] in a `static`, and register it with
/// `embassy_time_driver::time_driver_impl!` in the embedding program (that
/// macro needs a concrete static item in the caller's crate, so it cannot be
/// invoked from here).
pub struct EmbassyDriver<H: 'static> {
    scheduler: &'static Scheduler<H>,
    slots: Mutex<core::cell::RefCell<[Slot; QUEUE_SIZE]>>,
}

impl<H: HardwareTimer + 'static> EmbassyDriver<H> {
    pub const fn new(scheduler: &'static Scheduler<H>) -> Self {
        const EMPTY: Slot = Slot {
            timer: Timer::new(),
            waker: None,
        };
        EmbassyDriver {
            scheduler,
            slots: Mutex::new(core::cell::RefCell::new([EMPTY; QUEUE_SIZE])),
        }
    }

    /// Embassy's tick is always expressed in `embassy_time_driver::TICK_HZ`
    /// units; `now()` reports the scheduler's running clock directly since
    /// embedding programs are expected to size their HA's `units_to_ticks`
    /// to match that frequency when this feature is enabled.
    pub fn now(&self) -> u64 {
        self.scheduler.stats().running_clock
    }

    /// Schedules `waker` to be woken at or after tick `at`. If `waker` (by
    /// `Waker::will_wake`) already holds a slot, its deadline is replaced;
    /// otherwise a free slot is claimed, or the pool's first slot if none
    /// are free.
    pub fn schedule_wake(&self, at: u64, waker: &Waker) {
        critical_section::with(|cs| {
            let slots = self.slots.borrow(cs);
            let mut slots = slots.borrow_mut();

            let now = self.now();
            let matching = slots
                .iter()
                .position(|slot| matches!(&slot.waker, Some(w) if w.will_wake(waker)));
            let free = slots.iter().position(|slot| slot.waker.is_none());
            let (reuse, reuse_is_free) = match (matching, free) {
                (Some(i), _) => (i, false),
                (None, Some(i)) => (i, true),
                // Pool exhausted: evict slot 0.
                (None, None) => (0, false),
            };

            let slot = &mut slots[reuse];
            if !reuse_is_free {
                let _ = self.scheduler.stop(unsafe { timer_ref(&slot.timer) });
            }
            slot.waker = Some(waker.clone());

            let duration = at.saturating_sub(now).max(1);
            let ctx = &slot.timer as *const Timer as *mut ();
            let _ = self.scheduler.create(
                unsafe { timer_ref(&slot.timer) },
                wake_slot,
                TimerType::SingleShot,
            );
            let _ = self
                .scheduler
                .start(unsafe { timer_ref(&slot.timer) }, duration, ctx);
        });
    }
}

impl<H: HardwareTimer + 'static> Driver for EmbassyDriver<H> {
    fn now(&self) -> u64 {
        EmbassyDriver::now(self)
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        EmbassyDriver::schedule_wake(self, at, waker)
    }
}

/// # Safety
/// Every `Slot` lives inside a `&'static EmbassyDriver`, so its `Timer`
/// genuinely has `'static` lifetime; this only re-asserts what the borrow
/// checker can't see through the `Mutex<RefCell<_>>` indirection.
unsafe fn timer_ref(timer: &Timer) -> &'static Timer {
    unsafe { &*(timer as *const Timer) }
}

/// Handler registered for every slot. Recovers the enclosing `Slot` from
/// the `Timer` pointer the scheduler hands back (the only context a
/// `fn(*mut ())` handler can carry, per [`crate::record::HandlerFn`]).
fn wake_slot(ctx: *mut ()) {
    // Safety: `Timer` is `Slot`'s first field, so the `Timer` address is
    // also the `Slot` address.
    let timer = ctx as *const Timer;
    let slot = timer as *const Slot;
    let waker = unsafe { (*slot).waker.clone() };
    if let Some(waker) = waker {
        waker.wake();
    }
}
