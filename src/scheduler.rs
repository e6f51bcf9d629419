// SPDX-License-Identifier: Apache-2.0

use core::cell::Cell;
use core::cmp::min;
use core::ptr::NonNull;

use crate::error::SchedulerError;
use crate::hal::{HardwareTimer, StatusToken};
use crate::list::List;
use crate::record::{HandlerFn, Timer, TimerState, TimerType};
use crate::stats::{Counters, Stats};

/// Multiplexes any number of [`Timer`] records onto a single `H: HardwareTimer`.
///
/// Construct one `Scheduler` per hardware counter (usually as a `static`),
/// call [`Scheduler::init`] once, route the counter's interrupt to
/// [`Scheduler::target_count_reached`], and use [`Scheduler::create`] /
/// [`Scheduler::start`] / [`Scheduler::stop`] / [`Scheduler::is_active`] from
/// anywhere (caller context or the interrupt itself).
///
/// # Safety
///
/// `Scheduler` is `Sync` so it can live in a `static`, but every field is a
/// plain `Cell`/`UnsafeCell`, not an atomic. Soundness relies on every
/// mutation path running under the HA's critical section, exactly as
/// documented on [`Timer`]. This is the standard shape for a bare-metal
/// singleton scheduler; it is not safe to use two `&Scheduler` handles to
/// the same instance from genuinely parallel (multi-core) contexts without
/// an HA whose `set_interrupts` also excludes the other core.
pub struct Scheduler<H> {
    hw: core::cell::UnsafeCell<H>,
    active: List,
    /// The dispatcher's pending-dispatch chain, built by [`Self::target_count_reached`]
    /// and drained by the same call.
    pending: List,
    running_clock: Cell<u64>,
    last_programmed_period: Cell<u32>,
    counts_after_last_start: Cell<u32>,
    inside_dispatcher: Cell<bool>,
    initialized: Cell<bool>,
    counters: Cell<Counters>,
}

// Safety: see the type-level doc comment above.
unsafe impl<H> Sync for Scheduler<H> {}

impl<H: HardwareTimer> Scheduler<H> {
    /// Builds a scheduler around `hw`. Does not touch the hardware; call
    /// [`Self::init`] before starting any timer.
    pub const fn new(hw: H) -> Self {
        Scheduler {
            hw: core::cell::UnsafeCell::new(hw),
            active: List::new(),
            pending: List::new(),
            running_clock: Cell::new(0),
            last_programmed_period: Cell::new(0),
            counts_after_last_start: Cell::new(0),
            inside_dispatcher: Cell::new(false),
            initialized: Cell::new(false),
            counters: Cell::new(Counters {
                active_count: 0,
                high_watermark: 0,
                expiry_overflows: 0,
            }),
        }
    }

    /// Runs `f` with exclusive access to the hardware abstraction.
    ///
    /// # Safety
    /// Every call site must already be inside the critical section that
    /// makes this access exclusive (or be the narrow, documented exception
    /// of the handler re-check race window, which never touches `hw`).
    #[inline(always)]
    fn with_hw<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        // Safety: see above; upheld by every call site in this module.
        f(unsafe { &mut *self.hw.get() })
    }

    fn with_counters<R>(&self, f: impl FnOnce(&mut Counters) -> R) -> R {
        let mut c = self.counters.get();
        let r = f(&mut c);
        self.counters.set(c);
        r
    }

    /// Validates and initializes the hardware abstraction. Idempotent: a
    /// second call returns `Ok(())` without touching the hardware again.
    pub fn init(&self) -> Result<(), SchedulerError> {
        if self.initialized.get() {
            return Ok(());
        }

        if self.with_hw(|hw| hw.max_count()) == 0 {
            return Err(SchedulerError::InvalidParam);
        }

        if !self.with_hw(|hw| hw.init()) {
            return Err(SchedulerError::Error);
        }

        self.with_hw(|hw| hw.set_running(false));
        let mut token = StatusToken::default();
        self.with_hw(|hw| hw.set_interrupts(true, &mut token));
        self.initialized.set(true);
        Ok(())
    }

    fn require_initialized(&self) -> Result<(), SchedulerError> {
        if self.initialized.get() {
            Ok(())
        } else {
            Err(SchedulerError::InvalidState)
        }
    }

    /// Current running-clock value: `running_clock + (hw.read() -
    /// counts_after_last_start)`, wrapping. Only meaningful while the Active
    /// List is non-empty; callers never observe it otherwise since it is
    /// reset to zero whenever the list drains.
    fn now(&self) -> u64 {
        let elapsed = self
            .with_hw(|hw| hw.read())
            .wrapping_sub(self.counts_after_last_start.get());
        self.running_clock.get().wrapping_add(elapsed as u64)
    }

    /// (Re)initializes `timer` to `Stopped` with the given `handler`/`type`.
    ///
    /// Legal to call repeatedly on the same record while it is `Stopped`,
    /// to change its handler or type. If `timer` is currently `Active` or
    /// `Expired`, it is stopped first.
    pub fn create(
        &self,
        timer: &'static Timer,
        handler: HandlerFn,
        kind: TimerType,
    ) -> Result<(), SchedulerError> {
        self.require_initialized()?;

        if timer.state.get() != TimerState::Stopped {
            self.stop(timer)?;
        }

        timer.handler.set(Some(handler));
        timer.kind.set(kind);
        timer.start_counts.set(0);
        timer.total_counts.set(0);
        Ok(())
    }

    /// Starts `timer` to expire after `duration` (HA-defined units,
    /// converted via [`HardwareTimer::units_to_ticks`]), passing `context`
    /// through to the handler.
    ///
    /// A no-op, returning `Ok(())`, if `timer` is already `Active`
    /// (restarting requires an explicit [`Self::stop`] first).
    pub fn start(
        &self,
        timer: &'static Timer,
        duration: u64,
        context: *mut (),
    ) -> Result<(), SchedulerError> {
        self.require_initialized()?;
        if duration == 0 {
            return Err(SchedulerError::InvalidParam);
        }
        if timer.state.get() == TimerState::Active {
            return Ok(());
        }

        let total_counts = self.with_hw(|hw| hw.units_to_ticks(duration));
        let ptr = NonNull::from(timer);

        let mut token = StatusToken::default();
        self.with_hw(|hw| hw.set_interrupts(false, &mut token));

        // Unlink from the pending-dispatch chain before relinking into active.
        if timer.state.get() == TimerState::Expired {
            unsafe { self.pending.remove(ptr) };
        }

        timer.context.set(context);
        timer.total_counts.set(total_counts);

        let only_timer = self.active.is_empty();
        timer.start_counts.set(if only_timer && !self.inside_dispatcher.get() {
            0
        } else {
            self.now()
        });

        unsafe { self.active.insert_sorted(ptr, timer.start_counts.get()) };
        timer.state.set(TimerState::Active);
        self.with_counters(|c| c.on_link());

        if self.active.head() == Some(ptr) && !self.inside_dispatcher.get() {
            if !only_timer {
                let elapsed = self
                    .with_hw(|hw| hw.read())
                    .wrapping_sub(self.counts_after_last_start.get());
                self.running_clock
                    .set(self.running_clock.get().wrapping_add(elapsed as u64));
            }

            let max_count = self.with_hw(|hw| hw.max_count());
            let program = min(total_counts, max_count as u64) as u32;
            self.with_hw(|hw| {
                hw.set_running(false);
                hw.set_target(program);
                hw.set_running(true);
            });
            self.last_programmed_period.set(program);
            self.counts_after_last_start
                .set(self.with_hw(|hw| hw.read()));
        }

        self.with_hw(|hw| hw.set_interrupts(true, &mut token));
        Ok(())
    }

    /// Cancels `timer`. A no-op if it is already `Stopped`.
    ///
    /// Legal from inside a handler, including the timer's own handler (this
    /// suppresses automatic repeat re-insertion) or a peer's (this is the
    /// mechanism by which a not-yet-dispatched timer in the same batch can
    /// be canceled before its handler runs).
    pub fn stop(&self, timer: &'static Timer) -> Result<(), SchedulerError> {
        self.require_initialized()?;

        let was = timer.state.get();
        if was == TimerState::Stopped {
            return Ok(());
        }

        let ptr = NonNull::from(timer);
        let mut token = StatusToken::default();
        self.with_hw(|hw| hw.set_interrupts(false, &mut token));

        let was_head = was == TimerState::Active && self.active.head() == Some(ptr);
        if was == TimerState::Active {
            unsafe { self.active.remove(ptr) };
        } else {
            // `Expired`: linked into the pending-dispatch chain, not `active`.
            unsafe { self.pending.remove(ptr) };
        }
        timer.state.set(TimerState::Stopped);
        if was == TimerState::Active {
            self.with_counters(|c| c.on_unlink());
        }

        if was == TimerState::Active && !self.inside_dispatcher.get() {
            if self.active.is_empty() {
                self.with_hw(|hw| hw.set_running(false));
                self.running_clock.set(0);
            } else if was_head {
                let elapsed = self
                    .with_hw(|hw| hw.read())
                    .wrapping_sub(self.counts_after_last_start.get());
                self.running_clock
                    .set(self.running_clock.get().wrapping_add(elapsed as u64));

                let now = self.running_clock.get();
                let head = self.active.head().expect("checked non-empty above");
                let remaining = unsafe { head.as_ref() }.remaining(now);
                let max_count = self.with_hw(|hw| hw.max_count());
                let program = min(remaining, max_count as u64) as u32;

                self.with_hw(|hw| {
                    hw.set_running(false);
                    hw.set_target(program);
                    hw.set_running(true);
                });
                self.last_programmed_period.set(program);
                self.counts_after_last_start
                    .set(self.with_hw(|hw| hw.read()));
            }
        }

        self.with_hw(|hw| hw.set_interrupts(true, &mut token));
        Ok(())
    }

    /// `true` iff `timer`'s state is `Active`. See [`Timer::is_active`].
    pub fn is_active(&self, timer: &'static Timer) -> bool {
        timer.is_active()
    }

    /// A snapshot of scheduler-wide counters (see [`Stats`]).
    pub fn stats(&self) -> Stats {
        let c = self.counters.get();
        Stats {
            active_count: c.active_count,
            high_watermark: c.high_watermark,
            expiry_overflows: c.expiry_overflows,
            head: self.active.head(),
            running_clock: self.running_clock.get(),
            inside_dispatcher: self.inside_dispatcher.get(),
        }
    }

    /// The dispatcher: call exactly once per hardware "counter reached
    /// target" event, from whatever context the HA adapter's interrupt
    /// fires in.
    ///
    /// Detaches every currently-due timer in Active-List order, runs its
    /// handler with interrupts unmasked, re-arms repeating timers, and
    /// reprograms the hardware from whatever is left at the head.
    pub fn target_count_reached(&self) {
        if self.active.is_empty() {
            // A spurious event with nothing scheduled is a no-op, not a bug
            // to report.
            return;
        }

        self.inside_dispatcher.set(true);
        let mut token = StatusToken::default();
        self.with_hw(|hw| hw.set_interrupts(false, &mut token));

        let expiry_now = self
            .running_clock
            .get()
            .wrapping_add(self.last_programmed_period.get() as u64);
        self.running_clock.set(expiry_now);

        // Time the dispatcher itself: reprogram for the widest possible
        // window before running any handler.
        let max_count = self.with_hw(|hw| hw.max_count());
        self.with_hw(|hw| {
            hw.set_running(false);
            hw.set_target(max_count);
            hw.set_running(true);
        });
        self.last_programmed_period.set(max_count);
        self.counts_after_last_start
            .set(self.with_hw(|hw| hw.read()));

        // Phase 1: detach every currently-due head into the FIFO
        // pending-dispatch chain, in Active-List order, before running any
        // handler. `self.pending` is always empty on entry: the previous
        // dispatch's Phase 2 drains it completely before returning.
        while let Some(head) = self.active.head() {
            if unsafe { head.as_ref() }.remaining(expiry_now) != 0 {
                break;
            }
            unsafe { self.active.remove(head) };
            self.with_counters(|c| c.on_unlink());
            unsafe { head.as_ref() }.state.set(TimerState::Expired);
            unsafe { self.pending.push_back(head) };
        }

        // Phase 2: run handlers in order, re-checking state immediately
        // before each call so a peer handler's `stop` (or `start`) on a
        // still-pending timer takes effect; both unlink from `self.pending`
        // (not `self.active`) since that's the chain the timer is on here.
        while let Some(node) = self.pending.pop_front() {
            let node_ref = unsafe { node.as_ref() };
            if node_ref.state.get() != TimerState::Expired {
                continue;
            }

            if let Some(handler) = node_ref.handler.get() {
                let ctx = node_ref.context.get();
                self.with_hw(|hw| hw.set_interrupts(true, &mut token));
                handler(ctx);
                self.with_hw(|hw| hw.set_interrupts(false, &mut token));
            }

            if node_ref.state.get() == TimerState::Expired {
                if node_ref.kind.get() == TimerType::Repeating {
                    node_ref.start_counts.set(expiry_now);
                    node_ref.state.set(TimerState::Active);
                    unsafe { self.active.insert_sorted(node, expiry_now) };
                    self.with_counters(|c| c.on_link());
                } else {
                    node_ref.state.set(TimerState::Stopped);
                }
            }
            // Otherwise the handler already called `start` (now `Active`,
            // already linked) or `stop` (now `Stopped`, untouched further).
        }

        // Tail: fold the dispatcher's own elapsed ticks back in and
        // reprogram HA from the final Active List.
        let elapsed = self
            .with_hw(|hw| hw.read())
            .wrapping_sub(self.counts_after_last_start.get());
        self.running_clock
            .set(self.running_clock.get().wrapping_add(elapsed as u64));
        self.with_hw(|hw| hw.set_running(false));

        match self.active.head() {
            None => {
                self.running_clock.set(0);
            }
            Some(head) => {
                let now = self.running_clock.get();
                let remaining = unsafe { head.as_ref() }.remaining(now);
                let program = if remaining == 0 {
                    self.with_counters(|c| c.expiry_overflows += 1);
                    1
                } else {
                    min(remaining, max_count as u64) as u32 as u64
                };
                let program = min(program, max_count as u64) as u32;

                self.with_hw(|hw| {
                    hw.set_target(program);
                    hw.set_running(true);
                });
                self.last_programmed_period.set(program);
                self.counts_after_last_start
                    .set(self.with_hw(|hw| hw.read()));
            }
        }

        self.with_hw(|hw| hw.set_interrupts(true, &mut token));
        self.inside_dispatcher.set(false);
    }
}
